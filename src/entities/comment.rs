use chrono::{DateTime, Utc};

/// A single comment. Media and owner links are fixed at construction; the
/// registry never rebinds them on a repeat lookup.
#[derive(Debug)]
pub struct Comment {
    pub id: String,
    /// Shortcode of the commented media.
    pub media: String,
    /// Username of the comment author.
    pub owner: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn new(
        id: String,
        media: String,
        owner: String,
        text: String,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            media,
            owner,
            text,
            created_at,
        }
    }
}

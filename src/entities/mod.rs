//! Typed records for the objects the web surface exposes, plus the
//! session-scoped registry that guarantees one live instance per
//! (type, primary key).

use serde_json::Value;

use crate::paging::PageError;

mod account;
mod comment;
mod location;
mod media;
mod registry;
mod story;
mod tag;

pub use account::Account;
pub(crate) use media::timestamp;
pub use comment::Comment;
pub use location::Location;
pub use media::Media;
pub use registry::{
    AccountHandle, CommentHandle, LocationHandle, MediaHandle, Registry, Shared, StoryHandle,
    TagHandle,
};
pub use story::Story;
pub use tag::Tag;

/// An entity with a canonical page of its own: it can be hydrated from the
/// embedded entry-data blob of that page.
pub trait Updatable {
    /// JSON pointer into the shared-data `entry_data` tree.
    const ENTRY_DATA_POINTER: &'static str;
    /// URL path segment prefixed to the primary key to form the page address.
    const BASE_URL: &'static str;

    fn key(&self) -> &str;

    /// Maps named fields out of a full-detail payload into the record.
    /// Idempotent; later calls overwrite scalars but leave accumulated
    /// relationship sets alone unless the payload re-specifies them.
    fn set_data(&mut self, data: &Value, registry: &Registry) -> Result<(), PageError>;
}

/// Capability of owning a paginated `media` connection. Only Account, Tag
/// and Location carry it.
pub trait HasMedia: Updatable {
    /// JSON pointer to the media connection inside a GraphQL `data` tree.
    const MEDIA_POINTER: &'static str;
    /// Opaque query identifier for the paginated variant of the connection.
    const MEDIA_QUERY_HASH: &'static str;

    /// Name/value of the key variable for the paginated query. `None` when
    /// the value is not known yet (e.g. an account's numeric id before the
    /// first profile fetch).
    fn media_variable(&self) -> Option<(&'static str, String)>;

    fn media_count(&self) -> Option<u64>;

    fn add_media(&mut self, code: &str);

    /// Per-type adjustments on a freshly hydrated media node. An account's
    /// timeline reports the like count under a preview sub-field and owns
    /// every child; other connections report a bare liked-by count.
    fn decorate_media(&self, media: &mut Media, node: &Value) {
        media.likes_count = node
            .get("edge_liked_by")
            .and_then(|v| v.get("count"))
            .and_then(Value::as_u64);
    }
}

use std::collections::BTreeSet;

use serde_json::Value;

use crate::paging::{field, opt_str, u64_field, PageError};

use super::{HasMedia, Registry, Updatable};

#[derive(Debug)]
pub struct Tag {
    pub name: String,
    pub media_count: Option<u64>,

    /// Shortcodes of media tagged with this hashtag.
    pub media: BTreeSet<String>,
    /// Shortcodes of the tag page's top posts.
    pub top_posts: BTreeSet<String>,
}

impl Tag {
    pub fn new(name: String) -> Self {
        Self {
            name,
            media_count: None,
            media: BTreeSet::new(),
            top_posts: BTreeSet::new(),
        }
    }
}

impl Updatable for Tag {
    const ENTRY_DATA_POINTER: &'static str = "/TagPage/0/graphql/hashtag";
    const BASE_URL: &'static str = "explore/tags/";

    fn key(&self) -> &str {
        &self.name
    }

    fn set_data(&mut self, data: &Value, registry: &Registry) -> Result<(), PageError> {
        if let Some(name) = opt_str(data, "name") {
            self.name = name;
        }
        self.media_count = Some(u64_field(field(data, "edge_hashtag_to_media")?, "count")?);
        let top = field(data, "edge_hashtag_to_top_posts")?;
        for edge in field(top, "edges")?.as_array().into_iter().flatten() {
            if let Some(code) = edge.get("node").and_then(|n| opt_str(n, "shortcode")) {
                registry.media(&code);
                self.top_posts.insert(code);
            }
        }
        Ok(())
    }
}

impl HasMedia for Tag {
    const MEDIA_POINTER: &'static str = "/hashtag/edge_hashtag_to_media";
    const MEDIA_QUERY_HASH: &'static str = "ded47faa9a1aaded10161a2ff32abb6b";

    fn media_variable(&self) -> Option<(&'static str, String)> {
        Some(("tag_name", self.name.clone()))
    }

    fn media_count(&self) -> Option<u64> {
        self.media_count
    }

    fn add_media(&mut self, code: &str) {
        self.media.insert(code.to_string());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_set_data_collects_top_posts() {
        let registry = Registry::new();
        let mut tag = Tag::new("sunset".into());
        let payload = json!({
            "name": "sunset",
            "edge_hashtag_to_media": {"count": 1000},
            "edge_hashtag_to_top_posts": {
                "edges": [
                    {"node": {"shortcode": "top1"}},
                    {"node": {"shortcode": "top2"}},
                ],
            },
        });
        tag.set_data(&payload, &registry).unwrap();
        assert_eq!(tag.media_count, Some(1000));
        assert_eq!(tag.top_posts.len(), 2);

        // same payload again: still a true set
        tag.set_data(&payload, &registry).unwrap();
        assert_eq!(tag.top_posts.len(), 2);
    }
}

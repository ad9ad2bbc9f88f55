use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::paging::{field, opt_bool, opt_str, u64_field, PageError};

use super::{Registry, Updatable};

#[derive(Debug)]
pub struct Media {
    /// Shortcode, the primary key.
    pub code: String,
    pub id: Option<String>,
    pub caption: Option<String>,
    /// Owning account's username.
    pub owner: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
    /// Location id, when the post is geotagged.
    pub location: Option<String>,
    pub likes_count: Option<u64>,
    pub comments_count: Option<u64>,
    pub comments_disabled: Option<bool>,
    pub is_video: Option<bool>,
    pub video_url: Option<String>,
    pub is_ad: Option<bool>,
    pub is_album: Option<bool>,
    pub display_url: Option<String>,
    pub resources: Vec<String>,

    /// Shortcodes of carousel siblings.
    pub album: BTreeSet<String>,
    /// Usernames that liked this media.
    pub likes: BTreeSet<String>,
    /// Comment ids.
    pub comments: BTreeSet<String>,
}

impl Media {
    pub fn new(code: String) -> Self {
        Self {
            code,
            id: None,
            caption: None,
            owner: None,
            taken_at: None,
            location: None,
            likes_count: None,
            comments_count: None,
            comments_disabled: None,
            is_video: None,
            video_url: None,
            is_ad: None,
            is_album: None,
            display_url: None,
            resources: Vec::new(),
            album: BTreeSet::new(),
            likes: BTreeSet::new(),
            comments: BTreeSet::new(),
        }
    }
}

pub(crate) fn timestamp(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    value
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

impl Updatable for Media {
    const ENTRY_DATA_POINTER: &'static str = "/PostPage/0/graphql/shortcode_media";
    const BASE_URL: &'static str = "p/";

    fn key(&self) -> &str {
        &self.code
    }

    fn set_data(&mut self, data: &Value, registry: &Registry) -> Result<(), PageError> {
        self.id = opt_str(data, "id");
        if let Some(code) = opt_str(data, "shortcode") {
            self.code = code;
        }

        let caption_edges = field(field(data, "edge_media_to_caption")?, "edges")?;
        self.caption = caption_edges
            .get(0)
            .and_then(|edge| edge.get("node"))
            .and_then(|node| node.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(username) = data.get("owner").and_then(|o| opt_str(o, "username")) {
            registry.account(&username);
            self.owner = Some(username);
        }

        self.taken_at = timestamp(data, "taken_at_timestamp");

        if let Some(id) = data.get("location").and_then(|l| opt_str(l, "id")) {
            registry.location(&id);
            self.location = Some(id);
        }

        self.likes_count = Some(u64_field(field(data, "edge_media_preview_like")?, "count")?);

        // top-level posts report the comment connection under one name,
        // reply threads under another
        let comments = data
            .get("edge_media_to_comment")
            .or_else(|| data.get("edge_media_to_parent_comment"))
            .ok_or(PageError::Missing("edge_media_to_comment"))?;
        self.comments_count = Some(u64_field(comments, "count")?);

        self.comments_disabled = opt_bool(data, "comments_disabled");
        self.is_video = opt_bool(data, "is_video");
        if self.is_video == Some(true) {
            if let Some(url) = opt_str(data, "video_url") {
                self.video_url = Some(url);
            }
        }
        if let Some(is_ad) = opt_bool(data, "is_ad") {
            self.is_ad = Some(is_ad);
        }
        self.display_url = opt_str(data, "display_url");

        let resources = data
            .get("display_resources")
            .or_else(|| data.get("thumbnail_resources"))
            .ok_or(PageError::Missing("display_resources"))?
            .as_array()
            .ok_or(PageError::WrongType {
                field: "display_resources",
            })?;
        self.resources = resources
            .iter()
            .filter_map(|resource| opt_str(resource, "src"))
            .collect();

        self.is_album = Some(opt_str(data, "__typename").as_deref() == Some("GraphSidecar"));
        if let Some(children) = data.get("edge_sidecar_to_children") {
            // the payload re-specifies the album, so rebuild it
            self.album.clear();
            for edge in field(children, "edges")?.as_array().into_iter().flatten() {
                if let Some(code) = edge.get("node").and_then(|n| opt_str(n, "shortcode")) {
                    if code != self.code {
                        registry.media(&code);
                        self.album.insert(code);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn post_payload() -> Value {
        json!({
            "id": "999",
            "shortcode": "abc",
            "__typename": "GraphSidecar",
            "edge_media_to_caption": {"edges": [{"node": {"text": "caption text"}}]},
            "owner": {"username": "alice"},
            "taken_at_timestamp": 1_500_000_000,
            "edge_media_preview_like": {"count": 42},
            "edge_media_to_comment": {"count": 7},
            "comments_disabled": false,
            "is_video": false,
            "display_url": "https://cdn.example/abc.jpg",
            "display_resources": [
                {"src": "https://cdn.example/abc_small.jpg"},
                {"src": "https://cdn.example/abc_large.jpg"},
            ],
            "edge_sidecar_to_children": {
                "edges": [
                    {"node": {"shortcode": "abc"}},
                    {"node": {"shortcode": "sibling1"}},
                ],
            },
        })
    }

    #[test]
    fn test_set_data_maps_post_fields() {
        let registry = Registry::new();
        let mut media = Media::new("abc".into());
        media.set_data(&post_payload(), &registry).unwrap();

        assert_eq!(media.id.as_deref(), Some("999"));
        assert_eq!(media.caption.as_deref(), Some("caption text"));
        assert_eq!(media.owner.as_deref(), Some("alice"));
        assert_eq!(media.likes_count, Some(42));
        assert_eq!(media.comments_count, Some(7));
        assert_eq!(media.is_album, Some(true));
        assert_eq!(media.resources.len(), 2);
        // the owner landed in the registry as a side effect
        assert_eq!(registry.account("alice").read().username, "alice");
    }

    #[test]
    fn test_album_excludes_self_shortcode() {
        let registry = Registry::new();
        let mut media = Media::new("abc".into());
        media.set_data(&post_payload(), &registry).unwrap();
        assert_eq!(media.album.len(), 1);
        assert!(media.album.contains("sibling1"));
    }

    #[test]
    fn test_set_data_twice_does_not_duplicate_album() {
        let registry = Registry::new();
        let mut media = Media::new("abc".into());
        media.set_data(&post_payload(), &registry).unwrap();
        media.set_data(&post_payload(), &registry).unwrap();
        assert_eq!(media.album.len(), 1);
    }

    #[test]
    fn test_alternate_comment_connection_name() {
        let registry = Registry::new();
        let mut payload = post_payload();
        let map = payload.as_object_mut().unwrap();
        let comments = map.remove("edge_media_to_comment").unwrap();
        map.insert("edge_media_to_parent_comment".into(), comments);

        let mut media = Media::new("abc".into());
        media.set_data(&payload, &registry).unwrap();
        assert_eq!(media.comments_count, Some(7));
    }

    #[test]
    fn test_missing_caption_container_is_hard_failure() {
        let registry = Registry::new();
        let mut payload = post_payload();
        payload.as_object_mut().unwrap().remove("edge_media_to_caption");

        let mut media = Media::new("abc".into());
        let error = media.set_data(&payload, &registry).unwrap_err();
        assert!(matches!(error, PageError::Missing("edge_media_to_caption")));
    }

    #[test]
    fn test_thumbnail_resources_fallback() {
        let registry = Registry::new();
        let mut payload = post_payload();
        let map = payload.as_object_mut().unwrap();
        map.remove("display_resources");
        map.insert(
            "thumbnail_resources".into(),
            json!([{"src": "https://cdn.example/thumb.jpg"}]),
        );

        let mut media = Media::new("abc".into());
        media.set_data(&payload, &registry).unwrap();
        assert_eq!(media.resources, vec!["https://cdn.example/thumb.jpg"]);
    }

    #[test]
    fn test_empty_caption_edges_maps_to_none() {
        let registry = Registry::new();
        let mut payload = post_payload();
        payload.as_object_mut().unwrap().insert(
            "edge_media_to_caption".into(),
            json!({"edges": []}),
        );

        let mut media = Media::new("abc".into());
        media.set_data(&payload, &registry).unwrap();
        assert_eq!(media.caption, None);
    }
}

use std::collections::BTreeSet;

use serde_json::Value;

use crate::paging::{field, opt_bool, opt_str, u64_field, PageError};

use super::{HasMedia, Media, Registry, Updatable};

#[derive(Debug)]
pub struct Account {
    pub username: String,
    pub id: Option<String>,
    pub full_name: Option<String>,
    pub profile_pic_url: Option<String>,
    pub profile_pic_url_hd: Option<String>,
    pub fb_page: Option<String>,
    pub biography: Option<String>,
    pub follows_count: Option<u64>,
    pub followers_count: Option<u64>,
    pub media_count: Option<u64>,
    pub is_private: Option<bool>,
    pub is_verified: Option<bool>,
    pub country_block: Option<bool>,

    /// Shortcodes of this account's media.
    pub media: BTreeSet<String>,
    /// Usernames this account follows.
    pub follows: BTreeSet<String>,
    /// Usernames following this account.
    pub followers: BTreeSet<String>,
}

impl Account {
    pub fn new(username: String) -> Self {
        Self {
            username,
            id: None,
            full_name: None,
            profile_pic_url: None,
            profile_pic_url_hd: None,
            fb_page: None,
            biography: None,
            follows_count: None,
            followers_count: None,
            media_count: None,
            is_private: None,
            is_verified: None,
            country_block: None,
            media: BTreeSet::new(),
            follows: BTreeSet::new(),
            followers: BTreeSet::new(),
        }
    }
}

impl Updatable for Account {
    const ENTRY_DATA_POINTER: &'static str = "/ProfilePage/0/graphql/user";
    const BASE_URL: &'static str = "";

    fn key(&self) -> &str {
        &self.username
    }

    fn set_data(&mut self, data: &Value, _registry: &Registry) -> Result<(), PageError> {
        self.id = opt_str(data, "id");
        self.full_name = opt_str(data, "full_name");
        self.profile_pic_url = opt_str(data, "profile_pic_url");
        self.profile_pic_url_hd = opt_str(data, "profile_pic_url_hd");
        self.fb_page = opt_str(data, "connected_fb_page");
        self.biography = opt_str(data, "biography");
        self.follows_count = Some(u64_field(field(data, "edge_follow")?, "count")?);
        self.followers_count = Some(u64_field(field(data, "edge_followed_by")?, "count")?);
        self.media_count = Some(u64_field(
            field(data, "edge_owner_to_timeline_media")?,
            "count",
        )?);
        self.is_private = opt_bool(data, "is_private");
        self.is_verified = opt_bool(data, "is_verified");
        self.country_block = opt_bool(data, "country_block");
        Ok(())
    }
}

impl HasMedia for Account {
    const MEDIA_POINTER: &'static str = "/user/edge_owner_to_timeline_media";
    const MEDIA_QUERY_HASH: &'static str = "c6809c9c025875ac6f02619eae97a80e";

    fn media_variable(&self) -> Option<(&'static str, String)> {
        self.id.as_ref().map(|id| ("id", id.clone()))
    }

    fn media_count(&self) -> Option<u64> {
        self.media_count
    }

    fn add_media(&mut self, code: &str) {
        self.media.insert(code.to_string());
    }

    fn decorate_media(&self, media: &mut Media, node: &Value) {
        // a timeline node nests the like count under the preview sub-field
        media.likes_count = node
            .get("edge_media_preview_like")
            .and_then(|v| v.get("count"))
            .and_then(Value::as_u64);
        media.owner = Some(self.username.clone());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn profile_payload() -> Value {
        json!({
            "id": "12345",
            "full_name": "Test User",
            "profile_pic_url": "https://cdn.example/pic.jpg",
            "biography": "hello",
            "edge_follow": {"count": 10},
            "edge_followed_by": {"count": 20},
            "edge_owner_to_timeline_media": {"count": 5},
            "is_private": false,
            "is_verified": true,
        })
    }

    #[test]
    fn test_set_data_maps_profile_fields() {
        let registry = Registry::new();
        let mut account = Account::new("test".into());
        account.set_data(&profile_payload(), &registry).unwrap();

        assert_eq!(account.id.as_deref(), Some("12345"));
        assert_eq!(account.follows_count, Some(10));
        assert_eq!(account.followers_count, Some(20));
        assert_eq!(account.media_count, Some(5));
        assert_eq!(account.is_verified, Some(true));
        // absent optional field stays unknown
        assert_eq!(account.profile_pic_url_hd, None);
    }

    #[test]
    fn test_set_data_preserves_relationship_sets() {
        let registry = Registry::new();
        let mut account = Account::new("test".into());
        account.media.insert("abc".into());
        account.followers.insert("bob".into());

        account.set_data(&profile_payload(), &registry).unwrap();
        assert!(account.media.contains("abc"));
        assert!(account.followers.contains("bob"));
    }

    #[test]
    fn test_set_data_requires_count_containers() {
        let registry = Registry::new();
        let mut account = Account::new("test".into());
        let error = account
            .set_data(&json!({"id": "12345"}), &registry)
            .unwrap_err();
        assert!(matches!(error, PageError::Missing("edge_follow")));
    }

    #[test]
    fn test_set_data_is_idempotent() {
        let registry = Registry::new();
        let mut account = Account::new("test".into());
        account.set_data(&profile_payload(), &registry).unwrap();
        let follows = account.follows_count;
        account.set_data(&profile_payload(), &registry).unwrap();
        assert_eq!(account.follows_count, follows);
    }
}

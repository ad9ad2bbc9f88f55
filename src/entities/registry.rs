use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{Account, Comment, Location, Media, Story, Tag};

pub type Shared<T> = Arc<RwLock<T>>;

pub type AccountHandle = Shared<Account>;
pub type MediaHandle = Shared<Media>;
pub type CommentHandle = Shared<Comment>;
pub type TagHandle = Shared<Tag>;
pub type LocationHandle = Shared<Location>;
pub type StoryHandle = Shared<Story>;

/// Session-scoped identity map: one live instance per (type, primary key).
///
/// Looking an entity up by key returns the cached instance when present,
/// else stores a blank record under the stringified key. This is a
/// correctness aid (structural identity and dedup), not a capacity-bounded
/// cache; entries live until explicitly evicted.
#[derive(Default)]
pub struct Registry {
    accounts: RwLock<HashMap<String, AccountHandle>>,
    media: RwLock<HashMap<String, MediaHandle>>,
    comments: RwLock<HashMap<String, CommentHandle>>,
    tags: RwLock<HashMap<String, TagHandle>>,
    locations: RwLock<HashMap<String, LocationHandle>>,
    stories: RwLock<HashMap<String, StoryHandle>>,
}

fn get_or_create<T>(
    map: &RwLock<HashMap<String, Shared<T>>>,
    key: &str,
    make: impl FnOnce(String) -> T,
) -> Shared<T> {
    let mut map = map.write();
    map.entry(key.to_string())
        .or_insert_with(|| Arc::new(RwLock::new(make(key.to_string()))))
        .clone()
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, username: &str) -> AccountHandle {
        get_or_create(&self.accounts, username, Account::new)
    }

    pub fn media(&self, code: &str) -> MediaHandle {
        get_or_create(&self.media, code, Media::new)
    }

    pub fn tag(&self, name: &str) -> TagHandle {
        get_or_create(&self.tags, name, Tag::new)
    }

    pub fn location(&self, id: &str) -> LocationHandle {
        get_or_create(&self.locations, id, Location::new)
    }

    pub fn story(&self, id: &str) -> StoryHandle {
        get_or_create(&self.stories, id, Story::new)
    }

    /// Comments carry their media/owner links from construction; a second
    /// construction with the same id returns the cached instance and leaves
    /// the original links untouched.
    pub fn comment(
        &self,
        id: &str,
        media: &str,
        owner: &str,
        text: &str,
        created_at: Option<DateTime<Utc>>,
    ) -> CommentHandle {
        get_or_create(&self.comments, id, |id| {
            Comment::new(id, media.to_string(), owner.to_string(), text.to_string(), created_at)
        })
    }

    pub fn evict_comment(&self, id: &str) {
        self.comments.write().remove(id);
    }

    pub fn clear_accounts(&self) {
        self.accounts.write().clear();
    }

    pub fn clear_media(&self) {
        self.media.write().clear();
    }

    pub fn clear_comments(&self) {
        self.comments.write().clear();
    }

    pub fn clear_tags(&self) {
        self.tags.write().clear();
    }

    pub fn clear_locations(&self) {
        self.locations.write().clear();
    }

    pub fn clear_stories(&self) {
        self.stories.write().clear();
    }

    pub fn clear_all(&self) {
        self.clear_accounts();
        self.clear_media();
        self.clear_comments();
        self.clear_tags();
        self.clear_locations();
        self.clear_stories();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::distributions::Alphanumeric;
    use rand::{thread_rng, Rng};

    use super::*;

    fn random_key() -> String {
        let length = thread_rng().gen_range(1..=50);
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }

    #[test]
    fn test_same_key_yields_same_instance() {
        let registry = Registry::new();
        for _ in 0..3 {
            let key = random_key();
            let first = registry.account(&key);
            let second = registry.account(&key);
            assert!(Arc::ptr_eq(&first, &second));
        }
    }

    #[test]
    fn test_eviction_yields_fresh_blank_instance() {
        let registry = Registry::new();
        let media = registry.media("abc");
        media.write().likes_count = Some(10);

        registry.clear_media();
        let fresh = registry.media("abc");
        assert!(!Arc::ptr_eq(&media, &fresh));
        assert_eq!(fresh.read().likes_count, None);
    }

    #[test]
    fn test_clearing_one_type_leaves_others_live() {
        let registry = Registry::new();
        let account = registry.account("owner");
        let media = registry.media("abc");
        let comment = registry.comment("1", "abc", "owner", "hi", None);

        registry.clear_comments();
        assert!(Arc::ptr_eq(&account, &registry.account("owner")));
        assert!(Arc::ptr_eq(&media, &registry.media("abc")));
        assert!(!Arc::ptr_eq(&comment, &registry.comment("1", "abc", "owner", "hi", None)));
    }

    #[test]
    fn test_comment_links_are_first_writer_wins() {
        let registry = Registry::new();
        let first = registry.comment("7", "abc", "alice", "hello", None);
        let again = registry.comment("7", "xyz", "bob", "other", None);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.read().media, "abc");
        assert_eq!(again.read().owner, "alice");
        assert_eq!(again.read().text, "hello");
    }
}

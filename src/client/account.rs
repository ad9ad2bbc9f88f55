//! Authenticated surface: session login, the checkpoint/challenge flow,
//! follows/followers/feed/stories listings and the action endpoints.

use std::cmp::min;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use log::{error, info};
use serde_json::{json, Value};

use crate::entities::{timestamp, AccountHandle, CommentHandle, MediaHandle, StoryHandle, Updatable};
use crate::errors::{Error, Result, VerificationMethod};
use crate::paging::{decode_page, field, opt_bool, opt_str, str_field, Listing};

use super::{connection_variables, shared_data, WebClient};

const IG_APP_ID: &str = "936619743392459";
const FOLLOWS_QUERY_HASH: &str = "58712303d941c6855d4e888c5f0cd22f";
const FOLLOWERS_QUERY_HASH: &str = "37479f2b8209594dde7facb0d904896a";
const FEED_QUERY_HASH: &str = "485c25657308f08317c1e4b967356828";
const STORIES_QUERY_HASH: &str = "60b755363b5c230111347a7a4e242001";

/// Parsed checkpoint page: forward/replay links plus the verification
/// methods the user can choose from.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub navigation: HashMap<String, String>,
    pub types: Vec<VerificationMethod>,
}

#[derive(Clone, Copy)]
enum FollowEdge {
    Follows,
    Followers,
}

impl FollowEdge {
    fn label(self) -> &'static str {
        match self {
            FollowEdge::Follows => "follows",
            FollowEdge::Followers => "followers",
        }
    }

    fn query_hash(self) -> &'static str {
        match self {
            FollowEdge::Follows => FOLLOWS_QUERY_HASH,
            FollowEdge::Followers => FOLLOWERS_QUERY_HASH,
        }
    }

    fn pointer(self) -> &'static str {
        match self {
            FollowEdge::Follows => "/data/user/edge_follow",
            FollowEdge::Followers => "/data/user/edge_followed_by",
        }
    }
}

/// A `WebClient` bound to one account. Construction only registers the
/// account in the registry; `auth` establishes the session.
pub struct AccountClient {
    client: WebClient,
    account: AccountHandle,
}

impl AccountClient {
    pub fn new(client: WebClient, username: &str) -> Self {
        let account = client.registry.account(username);
        Self { client, account }
    }

    pub fn client(&self) -> &WebClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut WebClient {
        &mut self.client
    }

    pub fn account(&self) -> AccountHandle {
        Arc::clone(&self.account)
    }

    fn username(&self) -> String {
        self.account.read().username.clone()
    }

    pub fn auth(&mut self, password: &str) -> Result<()> {
        let recovery = Rc::clone(&self.client.recovery);
        let result = recovery.run(|| self.auth_once(password));
        if let Err(e) = &result {
            error!("Auth was unsuccessful: {}", e);
        }
        result
    }

    fn auth_once(&mut self, password: &str) -> Result<()> {
        info!("Auth started");
        self.client.refresh()?;
        let username = self.username();
        let url = format!("{}/accounts/login/ajax/", self.client.config.base_url);
        let request = self
            .client
            .http
            .post(&url)
            .header("X-IG-App-ID", IG_APP_ID)
            .header(
                "X-CSRFToken",
                self.client.csrf_token.clone().unwrap_or_default(),
            )
            .header("Referer", format!("{}/", self.client.config.base_url))
            .form(&[("username", username.as_str()), ("password", password)]);
        // rejected credentials come back as JSON on a failure status
        let response = self.client.send_lenient(request, &url)?;
        let data: Value = response.json().map_err(|e| Error::unexpected(&url, e))?;

        if data.get("authenticated").and_then(Value::as_bool) == Some(false) {
            return Err(Error::Auth {
                username,
                message: "credentials rejected".to_string(),
            });
        }
        if data.get("message").and_then(Value::as_str) == Some("checkpoint_required") {
            let path = str_field(&data, "checkpoint_url").map_err(|e| Error::unexpected(&url, e))?;
            let checkpoint_url = format!("{}{}", self.client.config.base_url, path);
            let challenge = self.checkpoint_handle(&checkpoint_url)?;
            return Err(Error::Checkpoint {
                username,
                checkpoint_url,
                navigation: challenge.navigation,
                types: challenge.types,
            });
        }
        info!("Auth was successful");
        Ok(())
    }

    /// Fetches a checkpoint page and extracts its navigation links and
    /// verification-method choices.
    pub fn checkpoint_handle(&mut self, url: &str) -> Result<Challenge> {
        let username = self.username();
        info!("Handle checkpoint page for '{}' started", username);
        let response = self.client.get(url)?;
        let text = response.text().map_err(|e| Error::unexpected(url, e))?;
        match parse_challenge(&text, &self.client.config.base_url) {
            Ok(challenge) => {
                info!("Handle checkpoint page for '{}' was successful", username);
                Ok(challenge)
            }
            Err(reason) => {
                error!(
                    "Handle checkpoint page for '{}' was unsuccessful: {}",
                    username, reason
                );
                Err(Error::unexpected(url, reason))
            }
        }
    }

    /// Submits the chosen verification method to the challenge forward URL.
    pub fn checkpoint_send(
        &mut self,
        checkpoint_url: &str,
        forward_url: &str,
        choice: &str,
    ) -> Result<HashMap<String, String>> {
        let username = self.username();
        info!("Send verify code for '{}' started", username);
        let data = self
            .client
            .action_request(checkpoint_url, forward_url, &[("choice", choice)])?;
        match navigation_links(&data, &self.client.config.base_url) {
            Ok(navigation) => {
                info!("Send verify code for '{}' was successful", username);
                Ok(navigation)
            }
            Err(reason) => {
                error!(
                    "Send verify code for '{}' was unsuccessful: {}",
                    username, reason
                );
                Err(Error::unexpected(forward_url, reason))
            }
        }
    }

    pub fn checkpoint_replay(
        &mut self,
        forward_url: &str,
        replay_url: &str,
    ) -> Result<HashMap<String, String>> {
        let username = self.username();
        info!("Resend verify code for '{}' started", username);
        let data = self.client.action_request(forward_url, replay_url, &[])?;
        match navigation_links(&data, &self.client.config.base_url) {
            Ok(navigation) => {
                info!("Resend verify code for '{}' was successful", username);
                Ok(navigation)
            }
            Err(reason) => {
                error!(
                    "Resend verify code for '{}' was unsuccessful: {}",
                    username, reason
                );
                Err(Error::unexpected(replay_url, reason))
            }
        }
    }

    /// Submits the received security code against the checkpoint URL.
    pub fn checkpoint_verify(&mut self, url: &str, code: &str) -> Result<bool> {
        let username = self.username();
        info!("Verify account '{}' started", username);
        match self.client.action_request(url, url, &[("security_code", code)]) {
            Ok(data) => {
                let ok = data.get("status").and_then(Value::as_str) == Some("ok");
                info!("Verify account '{}' was successful", username);
                Ok(ok)
            }
            Err(e) => {
                error!("Verify account '{}' was unsuccessful: {}", username, e);
                Err(e)
            }
        }
    }

    /// One page of accounts the given account follows; defaults to the
    /// session's own account.
    pub fn get_follows(
        &mut self,
        account: Option<&AccountHandle>,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<Listing<AccountHandle>> {
        self.follow_listing(account, cursor, count, FollowEdge::Follows)
    }

    /// One page of the given account's followers; defaults to the
    /// session's own account.
    pub fn get_followers(
        &mut self,
        account: Option<&AccountHandle>,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<Listing<AccountHandle>> {
        self.follow_listing(account, cursor, count, FollowEdge::Followers)
    }

    fn follow_listing(
        &mut self,
        account: Option<&AccountHandle>,
        cursor: Option<&str>,
        count: usize,
        edge: FollowEdge,
    ) -> Result<Listing<AccountHandle>> {
        let account = account.cloned().unwrap_or_else(|| Arc::clone(&self.account));
        let username = account.read().username.clone();
        let recovery = Rc::clone(&self.client.recovery);
        let result = recovery.run(|| self.follow_listing_once(&account, cursor, count, edge));
        if let Err(e) = &result {
            error!("Get '{}' {} was unsuccessful: {}", username, edge.label(), e);
        }
        result
    }

    fn follow_listing_once(
        &mut self,
        account: &AccountHandle,
        cursor: Option<&str>,
        count: usize,
        edge: FollowEdge,
    ) -> Result<Listing<AccountHandle>> {
        let username = account.read().username.clone();
        info!("Get '{}' {} started", username, edge.label());
        let referer = format!("{}/{}", self.client.config.base_url, username);

        if account.read().id.is_none() {
            self.client.update_once(account)?;
        }
        let id = account.read().id.clone().ok_or_else(|| {
            Error::unexpected(&referer, "account id is still unknown after update")
        })?;

        let first = min(self.client.config.page_limit, count);
        let variables = connection_variables("id", &id, first, cursor);
        let (body, url) = self
            .client
            .graphql_request(edge.query_hash(), &variables, &referer)?;
        let container = body.pointer(edge.pointer()).ok_or_else(|| {
            Error::unexpected(&url, format!("missing connection at '{}'", edge.pointer()))
        })?;

        {
            let count_value = container.get("count").and_then(Value::as_u64);
            let mut record = account.write();
            match edge {
                FollowEdge::Follows => record.follows_count = count_value,
                FollowEdge::Followers => record.followers_count = count_value,
            }
        }

        let registry = &self.client.registry;
        let page = decode_page(container, count, |node| {
            let child_name = str_field(node, "username")?;
            let child = registry.account(&child_name);
            {
                let mut record = child.write();
                record.id = opt_str(node, "id");
                record.profile_pic_url = opt_str(node, "profile_pic_url");
                record.is_verified = opt_bool(node, "is_verified");
                record.full_name = opt_str(node, "full_name");
            }
            {
                let mut record = account.write();
                match edge {
                    FollowEdge::Follows => record.follows.insert(child_name),
                    FollowEdge::Followers => record.followers.insert(child_name),
                };
            }
            Ok(Some(child))
        })
        .map_err(|e| Error::unexpected(&url, e))?;

        if page.complete {
            info!("Get '{}' {} was successful", username, edge.label());
        } else {
            self.client.pause();
        }
        Ok(page.into())
    }

    /// One page of the session's home feed. Injected/ad edges without a
    /// shortcode are skipped without consuming the requested quota.
    pub fn feed(&mut self, cursor: Option<&str>, count: usize) -> Result<Listing<MediaHandle>> {
        let recovery = Rc::clone(&self.client.recovery);
        let result = recovery.run(|| self.feed_once(cursor, count));
        if let Err(e) = &result {
            error!("Get feed was unsuccessful: {}", e);
        }
        result
    }

    fn feed_once(&mut self, cursor: Option<&str>, count: usize) -> Result<Listing<MediaHandle>> {
        info!("Get feed started");
        let first = min(self.client.config.page_limit, count);
        let variables = match cursor {
            Some(after) => json!({
                "fetch_media_item_count": first,
                "fetch_media_item_cursor": after,
                "fetch_comment_count": 4,
                "fetch_like": 10,
                "has_stories": false,
            })
            .to_string(),
            None => "{}".to_string(),
        };
        let referer = format!("{}/{}", self.client.config.base_url, self.username());
        let (body, url) = self
            .client
            .graphql_request(FEED_QUERY_HASH, &variables, &referer)?;
        let container = body.pointer("/data/user/edge_web_feed_timeline").ok_or_else(|| {
            Error::unexpected(&url, "missing connection at '/data/user/edge_web_feed_timeline'")
        })?;

        let registry = &self.client.registry;
        let page = decode_page(container, count, |node| {
            let code = match opt_str(node, "shortcode") {
                Some(code) => code,
                None => return Ok(None),
            };
            let media = registry.media(&code);
            media.write().set_data(node, registry)?;
            Ok(Some(media))
        })
        .map_err(|e| Error::unexpected(&url, e))?;

        if page.complete {
            info!("Get feed was successful");
        } else {
            self.client.pause();
        }
        Ok(page.into())
    }

    /// Story stubs from the session's reels tray.
    pub fn stories(&mut self) -> Result<Vec<StoryHandle>> {
        let recovery = Rc::clone(&self.client.recovery);
        let result = recovery.run(|| self.stories_once());
        if let Err(e) = &result {
            error!("Get stories was unsuccessful: {}", e);
        }
        result
    }

    fn stories_once(&mut self) -> Result<Vec<StoryHandle>> {
        info!("Get stories started");
        let referer = format!("{}/{}", self.client.config.base_url, self.username());
        let (body, url) =
            self.client
                .graphql_request(STORIES_QUERY_HASH, r#"{"only_stories":true}"#, &referer)?;
        let container = body
            .pointer("/data/user/feed_reels_tray/edge_reels_tray_to_reel")
            .ok_or_else(|| Error::unexpected(&url, "missing reels tray connection"))?;

        let edges = field(container, "edges")
            .map_err(|e| Error::unexpected(&url, e))?
            .as_array()
            .cloned()
            .unwrap_or_default();
        let mut stories = Vec::new();
        for edge in &edges {
            let id = edge
                .get("node")
                .and_then(|node| opt_str(node, "id"))
                .ok_or_else(|| Error::unexpected(&url, "reel edge without id"))?;
            stories.push(self.client.registry.story(&id));
        }
        info!("Get stories was successful");
        Ok(stories)
    }

    pub fn like(&mut self, media: &MediaHandle) -> Result<bool> {
        self.media_action(media, "Like", |id| format!("web/likes/{}/like/", id))
    }

    pub fn unlike(&mut self, media: &MediaHandle) -> Result<bool> {
        self.media_action(media, "Unlike", |id| format!("web/likes/{}/unlike/", id))
    }

    pub fn save(&mut self, media: &MediaHandle) -> Result<bool> {
        self.media_action(media, "Save", |id| format!("web/save/{}/save/", id))
    }

    pub fn unsave(&mut self, media: &MediaHandle) -> Result<bool> {
        self.media_action(media, "Unsave", |id| format!("web/save/{}/unsave/", id))
    }

    fn media_action(
        &mut self,
        media: &MediaHandle,
        verb: &'static str,
        path: impl Fn(&str) -> String,
    ) -> Result<bool> {
        let code = media.read().code.clone();
        let recovery = Rc::clone(&self.client.recovery);
        let result = recovery.run(|| {
            info!("{} '{}' started", verb, code);
            let referer = format!("{}/p/{}/", self.client.config.base_url, code);
            if media.read().id.is_none() {
                self.client.update_once(media)?;
            }
            let id = media.read().id.clone().ok_or_else(|| {
                Error::unexpected(&referer, "media id is still unknown after update")
            })?;
            let url = format!("{}/{}", self.client.config.base_url, path(&id));
            let data = self.client.action_request(&referer, &url, &[])?;
            let ok = data.get("status").and_then(Value::as_str) == Some("ok");
            info!("{} '{}' was successful", verb, code);
            Ok(ok)
        });
        if let Err(e) = &result {
            error!("{} '{}' was unsuccessful: {}", verb, code, e);
        }
        result
    }

    pub fn follow(&mut self, account: &AccountHandle) -> Result<bool> {
        self.friendship_action(account, "Follow to", |id| {
            format!("web/friendships/{}/follow/", id)
        })
    }

    pub fn unfollow(&mut self, account: &AccountHandle) -> Result<bool> {
        self.friendship_action(account, "Unfollow to", |id| {
            format!("web/friendships/{}/unfollow/", id)
        })
    }

    fn friendship_action(
        &mut self,
        account: &AccountHandle,
        verb: &'static str,
        path: impl Fn(&str) -> String,
    ) -> Result<bool> {
        let username = account.read().username.clone();
        let recovery = Rc::clone(&self.client.recovery);
        let result = recovery.run(|| {
            info!("{} '{}' started", verb, username);
            let referer = format!("{}/{}", self.client.config.base_url, username);
            if account.read().id.is_none() {
                self.client.update_once(account)?;
            }
            let id = account.read().id.clone().ok_or_else(|| {
                Error::unexpected(&referer, "account id is still unknown after update")
            })?;
            let url = format!("{}/{}", self.client.config.base_url, path(&id));
            let data = self.client.action_request(&referer, &url, &[])?;
            let ok = data.get("status").and_then(Value::as_str) == Some("ok");
            info!("{} '{}' was successful", verb, username);
            Ok(ok)
        });
        if let Err(e) = &result {
            error!("{} '{}' was unsuccessful: {}", verb, username, e);
        }
        result
    }

    /// Posts a comment; returns the created comment when the server
    /// acknowledged it.
    pub fn add_comment(&mut self, media: &MediaHandle, text: &str) -> Result<Option<CommentHandle>> {
        let code = media.read().code.clone();
        let recovery = Rc::clone(&self.client.recovery);
        let result = recovery.run(|| {
            info!("Comment '{}' started", code);
            let referer = format!("{}/p/{}/", self.client.config.base_url, code);
            if media.read().id.is_none() {
                self.client.update_once(media)?;
            }
            let id = media.read().id.clone().ok_or_else(|| {
                Error::unexpected(&referer, "media id is still unknown after update")
            })?;
            let url = format!("{}/web/comments/{}/add/", self.client.config.base_url, id);
            let data = self
                .client
                .action_request(&referer, &url, &[("comment_text", text)])?;

            let comment = if data.get("status").and_then(Value::as_str) == Some("ok") {
                let comment_id = match data.get("id") {
                    Some(Value::String(id)) => id.clone(),
                    Some(other) => other.to_string(),
                    None => return Err(Error::unexpected(&url, "missing field 'id'")),
                };
                let comment_text = opt_str(&data, "text").unwrap_or_else(|| text.to_string());
                let created_at = timestamp(&data, "created_time");
                let owner = self.username();
                let comment = self.client.registry.comment(
                    &comment_id,
                    &code,
                    &owner,
                    &comment_text,
                    created_at,
                );
                media.write().comments.insert(comment_id);
                Some(comment)
            } else {
                None
            };
            info!("Comment '{}' was successful", code);
            Ok(comment)
        });
        if let Err(e) = &result {
            error!("Comment '{}' was unsuccessful: {}", code, e);
        }
        result
    }

    /// Deletes a comment and evicts it from the registry on success.
    pub fn delete_comment(&mut self, comment: &CommentHandle) -> Result<bool> {
        let (id, media_code) = {
            let record = comment.read();
            (record.id.clone(), record.media.clone())
        };
        let recovery = Rc::clone(&self.client.recovery);
        let result = recovery.run(|| {
            info!("Delete comment '{}' started", id);
            let media = self.client.registry.media(&media_code);
            let referer = format!("{}/p/{}/", self.client.config.base_url, media_code);
            if media.read().id.is_none() {
                self.client.update_once(&media)?;
            }
            let media_id = media.read().id.clone().ok_or_else(|| {
                Error::unexpected(&referer, "media id is still unknown after update")
            })?;
            let url = format!(
                "{}/web/comments/{}/delete/{}/",
                self.client.config.base_url, media_id, id
            );
            let data = self.client.action_request(&referer, &url, &[])?;
            let ok = data.get("status").and_then(Value::as_str) == Some("ok");
            if ok {
                self.client.registry.evict_comment(&id);
                media.write().comments.remove(&id);
            }
            info!("Delete comment '{}' was successful", id);
            Ok(ok)
        });
        if let Err(e) = &result {
            error!("Delete comment '{}' was unsuccessful: {}", id, e);
        }
        result
    }
}

fn navigation_links(
    data: &Value,
    origin: &str,
) -> std::result::Result<HashMap<String, String>, String> {
    let navigation = data
        .get("navigation")
        .and_then(Value::as_object)
        .ok_or("missing 'navigation'")?;
    let mut links = HashMap::new();
    for (key, value) in navigation {
        let path = value.as_str().ok_or("navigation link is not a string")?;
        links.insert(key.clone(), format!("{}{}", origin, path));
    }
    Ok(links)
}

fn parse_challenge(html: &str, origin: &str) -> std::result::Result<Challenge, String> {
    let shared = shared_data(html).ok_or("no shared data blob in page")?;
    let data = shared
        .pointer("/entry_data/Challenge/0")
        .ok_or("missing '/entry_data/Challenge/0'")?;
    let navigation = navigation_links(data, origin)?;

    let content = data
        .pointer("/extraData/content")
        .and_then(Value::as_array)
        .ok_or("missing '/extraData/content'")?;
    let form = content
        .iter()
        .find(|item| {
            item.get("__typename").and_then(Value::as_str) == Some("GraphChallengePageForm")
        })
        .ok_or("no challenge form in page")?;
    let values = form
        .pointer("/fields/0/values")
        .and_then(Value::as_array)
        .ok_or("no verification choices in form")?;

    let mut types = Vec::new();
    for choice in values {
        let label = choice
            .get("label")
            .and_then(Value::as_str)
            .ok_or("choice without label")?
            .to_lowercase();
        let label = label.split(':').next().unwrap_or_default().to_string();
        let value = match choice.get("value") {
            Some(Value::String(value)) => value.clone(),
            Some(other) => other.to_string(),
            None => return Err("choice without value".to_string()),
        };
        types.push(VerificationMethod { label, value });
    }
    Ok(Challenge { navigation, types })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_challenge_page() {
        let blob = json!({
            "rhx_gis": "seed",
            "config": {"csrf_token": "token"},
            "entry_data": {
                "Challenge": [{
                    "navigation": {
                        "forward": "/challenge/1/forward/",
                        "replay": "/challenge/1/replay/",
                    },
                    "extraData": {
                        "content": [
                            {"__typename": "GraphChallengePageHeader"},
                            {
                                "__typename": "GraphChallengePageForm",
                                "fields": [{
                                    "values": [
                                        {"label": "Email: t***@example.com", "value": 1},
                                        {"label": "Phone: +1 *** 42", "value": "0"},
                                    ],
                                }],
                            },
                        ],
                    },
                }],
            },
        });
        let html = format!(
            "<html><script>window._sharedData = {};</script></html>",
            blob
        );
        let challenge = parse_challenge(&html, "https://www.instagram.com").unwrap();
        assert_eq!(
            challenge.navigation.get("forward").map(String::as_str),
            Some("https://www.instagram.com/challenge/1/forward/")
        );
        assert_eq!(challenge.types.len(), 2);
        assert_eq!(challenge.types[0].label, "email");
        assert_eq!(challenge.types[0].value, "1");
        assert_eq!(challenge.types[1].label, "phone");
        assert_eq!(challenge.types[1].value, "0");
    }

    #[test]
    fn test_parse_challenge_requires_form() {
        let blob = json!({
            "entry_data": {
                "Challenge": [{
                    "navigation": {},
                    "extraData": {"content": []},
                }],
            },
        });
        let html = format!(
            "<html><script>window._sharedData = {};</script></html>",
            blob
        );
        let error = parse_challenge(&html, "https://www.instagram.com").unwrap_err();
        assert_eq!(error, "no challenge form in page");
    }

    #[test]
    fn test_navigation_links_are_prefixed() {
        let data = json!({"navigation": {"forward": "/next/"}});
        let links = navigation_links(&data, "https://www.instagram.com").unwrap();
        assert_eq!(links["forward"], "https://www.instagram.com/next/");
    }
}

//! Blocking client for the web surface: embedded-JSON page fetches,
//! signed GraphQL queries and the anonymous listing drivers.

use std::cmp::min;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{error, info};
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::entities::{
    timestamp, AccountHandle, CommentHandle, HasMedia, MediaHandle, Registry, Shared, Updatable,
};
use crate::errors::{DispatchTable, Error, Result};
use crate::paging::{decode_page, opt_bool, opt_str, str_field, Listing, PageError};

mod account;

pub use account::{AccountClient, Challenge};

const LIKES_QUERY_HASH: &str = "1cb6ec562846122743b61e492c85999f";
const COMMENTS_QUERY_HASH: &str = "f0986789a5c5d17c2400faebf16efd0d";

lazy_static! {
    static ref SHARED_DATA_RE: Regex =
        Regex::new(r#"<script[^>]*>\s*window\._sharedData\s*=\s*(.*?)\s*;\s*</script>"#).unwrap();
}

/// Extracts the `window._sharedData` assignment embedded in an HTML page.
pub(crate) fn shared_data(html: &str) -> Option<Value> {
    let caps = SHARED_DATA_RE.captures(html)?;
    serde_json::from_str(caps.get(1)?.as_str()).ok()
}

/// Request-signing header value: `md5("{seed}:{variables}")`.
pub(crate) fn gis_signature(seed: &str, variables: &str) -> String {
    format!("{:x}", md5::compute(format!("{}:{}", seed, variables)))
}

/// JSON-encoded variables for a cursor query: key field, page size and the
/// optional continuation cursor.
pub(crate) fn connection_variables(
    name: &str,
    value: &str,
    first: usize,
    after: Option<&str>,
) -> String {
    let mut vars = Map::new();
    vars.insert(name.to_string(), Value::String(value.to_string()));
    vars.insert("first".to_string(), Value::from(first as u64));
    if let Some(after) = after {
        vars.insert("after".to_string(), Value::String(after.to_string()));
    }
    Value::Object(vars).to_string()
}

pub struct WebClient {
    pub(crate) http: Client,
    pub(crate) config: ClientConfig,
    pub(crate) registry: Arc<Registry>,
    pub(crate) recovery: Rc<DispatchTable>,
    pub(crate) rhx_gis: Option<String>,
    pub(crate) csrf_token: Option<String>,
}

impl WebClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_registry(config, Arc::new(Registry::new()))
    }

    pub fn with_registry(config: ClientConfig, registry: Arc<Registry>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookies) = &config.cookies {
            let value = HeaderValue::from_str(cookies).map_err(|e| {
                Error::Config(config::ConfigError::Message(format!(
                    "invalid cookie header: {}",
                    e
                )))
            })?;
            headers.insert(COOKIE, value);
        }

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(config.user_agent.as_str())
            .cookie_store(true)
            .default_headers(headers);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(Error::Transport)?);
        }
        let http = builder.build().map_err(Error::Transport)?;
        let recovery = Rc::new(DispatchTable::new(config.retries));

        Ok(Self {
            http,
            config,
            registry,
            recovery,
            rhx_gis: None,
            csrf_token: None,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    /// Replaces the recovery table driving the bounded retry around every
    /// public operation.
    pub fn set_recovery(&mut self, table: DispatchTable) {
        self.recovery = Rc::new(table);
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        let response = request.send().map_err(|e| Error::Internet {
            url: url.to_string(),
            source: e,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Like `send` but keeps non-2xx responses: some endpoints report
    /// application errors with a JSON body on a failure status.
    pub(crate) fn send_lenient(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        request.send().map_err(|e| Error::Internet {
            url: url.to_string(),
            source: e,
        })
    }

    pub(crate) fn get(&self, url: &str) -> Result<Response> {
        self.send(self.http.get(url), url)
    }

    /// Signed GET against the paginated query endpoint. Returns the parsed
    /// body and the request URL for error attribution.
    pub(crate) fn graphql_request(
        &self,
        query_hash: &str,
        variables: &str,
        referer: &str,
    ) -> Result<(Value, String)> {
        let url = format!("{}/graphql/query/", self.config.base_url);
        let signature = gis_signature(self.rhx_gis.as_deref().unwrap_or(""), variables);
        let request = self
            .http
            .get(&url)
            .query(&[("query_hash", query_hash), ("variables", variables)])
            .header("X-Instagram-GIS", signature)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Referer", referer);
        let response = self.send(request, &url)?;
        let body = response.json().map_err(|e| Error::unexpected(&url, e))?;
        Ok((body, url))
    }

    /// CSRF-protected POST used by every state-changing endpoint.
    pub(crate) fn action_request(
        &self,
        referer: &str,
        url: &str,
        data: &[(&str, &str)],
    ) -> Result<Value> {
        let request = self
            .http
            .post(url)
            .header("Referer", referer)
            .header("X-CSRFToken", self.csrf_token.clone().unwrap_or_default())
            .header("X-Instagram-Ajax", "1")
            .header("X-Requested-With", "XMLHttpRequest")
            .form(data);
        let response = self.send(request, url)?;
        response.json().map_err(|e| Error::unexpected(url, e))
    }

    fn capture_tokens(&mut self, shared: &Value) -> std::result::Result<(), String> {
        let csrf = shared
            .pointer("/config/csrf_token")
            .and_then(Value::as_str)
            .ok_or("missing '/config/csrf_token'")?
            .to_string();
        self.rhx_gis = Some(
            shared
                .get("rhx_gis")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        );
        self.csrf_token = Some(csrf);
        Ok(())
    }

    fn hydrate_from_page<T: Updatable>(
        &mut self,
        obj: &Shared<T>,
        html: &str,
    ) -> std::result::Result<Value, String> {
        let shared = shared_data(html).ok_or("no shared data blob in page")?;
        self.capture_tokens(&shared)?;
        let entry = shared
            .pointer(&format!("/entry_data{}", T::ENTRY_DATA_POINTER))
            .ok_or_else(|| format!("missing entry data at '{}'", T::ENTRY_DATA_POINTER))?
            .clone();
        obj.write()
            .set_data(&entry, &self.registry)
            .map_err(|e| e.to_string())?;
        Ok(entry)
    }

    /// Re-captures the signing seed and CSRF token from the site root
    /// without hydrating any entity.
    pub fn refresh(&mut self) -> Result<()> {
        info!("Update 'self' started");
        let url = format!("{}/", self.config.base_url);
        let response = self.get(&url)?;
        let text = response.text().map_err(|e| Error::unexpected(&url, e))?;
        let outcome = shared_data(&text)
            .ok_or_else(|| "no shared data blob in page".to_string())
            .and_then(|shared| self.capture_tokens(&shared));
        match outcome {
            Ok(()) => {
                info!("Update 'self' was successful");
                Ok(())
            }
            Err(reason) => {
                error!("Update 'self' was unsuccessful: {}", reason);
                if self.config.strict_update {
                    Err(Error::unexpected(&url, reason))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Fetches the entity's own page and hydrates it from the embedded
    /// entry data. Returns the entry-data subtree, or `None` when the page
    /// shape was not recognized and `strict_update` is off (the signing
    /// seed is still refreshed when present).
    pub fn update<T: Updatable>(&mut self, obj: &Shared<T>) -> Result<Option<Value>> {
        let recovery = Rc::clone(&self.recovery);
        recovery.run(|| self.update_once(obj))
    }

    pub(crate) fn update_once<T: Updatable>(&mut self, obj: &Shared<T>) -> Result<Option<Value>> {
        let key = obj.read().key().to_string();
        info!("Update '{}' started", key);
        let url = format!("{}/{}{}", self.config.base_url, T::BASE_URL, key);
        let response = self.get(&url)?;
        let text = response.text().map_err(|e| Error::unexpected(&url, e))?;
        match self.hydrate_from_page(obj, &text) {
            Ok(data) => {
                info!("Update '{}' was successful", key);
                Ok(Some(data))
            }
            Err(reason) => {
                error!("Update '{}' was unsuccessful: {}", key, reason);
                if self.config.strict_update {
                    Err(Error::unexpected(&url, reason))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// One page of the entity's media connection. The first page (no
    /// cursor) rides on the denser full-page fetch; subsequent pages go
    /// through the paginated query endpoint. Invoke again with the
    /// returned cursor to continue.
    pub fn get_media<T: HasMedia>(
        &mut self,
        obj: &Shared<T>,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<Listing<MediaHandle>> {
        let key = obj.read().key().to_string();
        let recovery = Rc::clone(&self.recovery);
        let result = recovery.run(|| self.get_media_once(obj, cursor, count));
        if let Err(e) = &result {
            error!("Get media '{}' was unsuccessful: {}", key, e);
        }
        result
    }

    fn get_media_once<T: HasMedia>(
        &mut self,
        obj: &Shared<T>,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<Listing<MediaHandle>> {
        let key = obj.read().key().to_string();
        info!("Get media '{}' started", key);
        let page_url = format!("{}/{}{}", self.config.base_url, T::BASE_URL, key);

        let listing = if cursor.is_none() {
            let data = self
                .update_once(obj)?
                .ok_or_else(|| Error::unexpected(&page_url, "no entry data in page"))?;
            let connection_key = T::MEDIA_POINTER.rsplit('/').next().unwrap_or_default();
            let container = data.get(connection_key).ok_or_else(|| {
                Error::unexpected(&page_url, format!("missing field '{}'", connection_key))
            })?;
            self.decode_media_page(obj, container, count, &page_url)?
        } else {
            let known = obj.read().media_variable();
            let variable = match known {
                Some(variable) => variable,
                None => {
                    self.update_once(obj)?;
                    obj.read().media_variable().ok_or_else(|| {
                        Error::unexpected(&page_url, "entity id is still unknown after update")
                    })?
                }
            };
            let first = min(self.config.page_limit, count);
            let variables = connection_variables(variable.0, &variable.1, first, cursor);
            let (body, url) = self.graphql_request(T::MEDIA_QUERY_HASH, &variables, &page_url)?;
            let container = body.pointer(&format!("/data{}", T::MEDIA_POINTER)).ok_or_else(
                || Error::unexpected(&url, format!("missing connection at '{}'", T::MEDIA_POINTER)),
            )?;
            self.decode_media_page(obj, container, count, &url)?
        };

        if listing.complete {
            info!("Get media '{}' was successful", key);
        } else {
            self.pause();
        }
        Ok(listing)
    }

    fn decode_media_page<T: HasMedia>(
        &self,
        obj: &Shared<T>,
        container: &Value,
        count: usize,
        url: &str,
    ) -> Result<Listing<MediaHandle>> {
        let registry = &self.registry;
        let page = decode_page(container, count, |node| {
            let code = str_field(node, "shortcode")?;
            let media = registry.media(&code);
            {
                let mut record = media.write();
                record.set_data(node, registry)?;
                obj.read().decorate_media(&mut record, node);
            }
            obj.write().add_media(&code);
            Ok(Some(media))
        })
        .map_err(|e| Error::unexpected(url, e))?;
        Ok(page.into())
    }

    /// One page of accounts that liked the media; the connection's own
    /// count is denormalized onto the media record.
    pub fn get_likes(
        &mut self,
        media: &MediaHandle,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<Listing<AccountHandle>> {
        let code = media.read().code.clone();
        let recovery = Rc::clone(&self.recovery);
        let result = recovery.run(|| self.get_likes_once(media, cursor, count));
        if let Err(e) = &result {
            error!("Get likes '{}' was unsuccessful: {}", code, e);
        }
        result
    }

    fn get_likes_once(
        &mut self,
        media: &MediaHandle,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<Listing<AccountHandle>> {
        let code = media.read().code.clone();
        info!("Get likes '{}' started", code);
        if media.read().id.is_none() {
            self.update_once(media)?;
        }

        let first = min(self.config.page_limit, count);
        let variables = connection_variables("shortcode", &code, first, cursor);
        let referer = format!("{}/p/{}", self.config.base_url, code);
        let (body, url) = self.graphql_request(LIKES_QUERY_HASH, &variables, &referer)?;
        let container = body
            .pointer("/data/shortcode_media/edge_liked_by")
            .ok_or_else(|| {
                Error::unexpected(&url, "missing connection at '/data/shortcode_media/edge_liked_by'")
            })?;
        media.write().likes_count = container.get("count").and_then(Value::as_u64);

        let registry = &self.registry;
        let page = decode_page(container, count, |node| {
            let username = str_field(node, "username")?;
            let account = registry.account(&username);
            {
                let mut record = account.write();
                record.id = opt_str(node, "id");
                record.profile_pic_url = opt_str(node, "profile_pic_url");
                record.is_verified = opt_bool(node, "is_verified");
                record.full_name = opt_str(node, "full_name");
            }
            media.write().likes.insert(username);
            Ok(Some(account))
        })
        .map_err(|e| Error::unexpected(&url, e))?;

        if page.complete {
            info!("Get likes '{}' was successful", code);
        } else {
            self.pause();
        }
        Ok(page.into())
    }

    /// One page of the media's comment thread. The first page comes from
    /// the post page's entry data, where the connection appears under one
    /// of two alternate names.
    pub fn get_comments(
        &mut self,
        media: &MediaHandle,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<Listing<CommentHandle>> {
        let code = media.read().code.clone();
        let recovery = Rc::clone(&self.recovery);
        let result = recovery.run(|| self.get_comments_once(media, cursor, count));
        if let Err(e) = &result {
            error!("Get comments '{}' was unsuccessful: {}", code, e);
        }
        result
    }

    fn get_comments_once(
        &mut self,
        media: &MediaHandle,
        cursor: Option<&str>,
        count: usize,
    ) -> Result<Listing<CommentHandle>> {
        let code = media.read().code.clone();
        info!("Get comments '{}' started", code);
        let page_url = format!("{}/p/{}", self.config.base_url, code);

        let (container, url) = if cursor.is_none() {
            let data = self
                .update_once(media)?
                .ok_or_else(|| Error::unexpected(&page_url, "no entry data in page"))?;
            let container = data
                .get("edge_media_to_comment")
                .or_else(|| data.get("edge_media_to_parent_comment"))
                .ok_or_else(|| Error::unexpected(&page_url, "missing comment connection"))?
                .clone();
            (container, page_url.clone())
        } else {
            let first = min(self.config.page_limit, count);
            let variables = connection_variables("shortcode", &code, first, cursor);
            let (body, url) = self.graphql_request(COMMENTS_QUERY_HASH, &variables, &page_url)?;
            let container = body
                .pointer("/data/shortcode_media/edge_media_to_comment")
                .ok_or_else(|| {
                    Error::unexpected(
                        &url,
                        "missing connection at '/data/shortcode_media/edge_media_to_comment'",
                    )
                })?
                .clone();
            media.write().comments_count = container.get("count").and_then(Value::as_u64);
            (container, url)
        };

        let registry = &self.registry;
        let page = decode_page(&container, count, |node| {
            let id = str_field(node, "id")?;
            let owner = node
                .get("owner")
                .and_then(|owner| opt_str(owner, "username"))
                .ok_or(PageError::Missing("owner"))?;
            registry.account(&owner);
            let text = str_field(node, "text")?;
            let created_at = timestamp(node, "created_at");
            let comment = registry.comment(&id, &code, &owner, &text, created_at);
            media.write().comments.insert(id);
            Ok(Some(comment))
        })
        .map_err(|e| Error::unexpected(&url, e))?;

        if page.complete {
            info!("Get comments '{}' was successful", code);
        } else {
            self.pause();
        }
        Ok(page.into())
    }

    pub(crate) fn pause(&self) {
        if self.config.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.delay_ms));
        }
    }
}

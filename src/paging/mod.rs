//! Page decoding for cursor-based connections.
//!
//! Every connection the web surface exposes has the same rough shape: an
//! `edges` array of `{ "node": ... }` wrappers plus a `page_info` object with
//! `has_next_page` and `end_cursor`. The decoder is type-agnostic; the caller
//! supplies the hydration closure that turns a node into an entity and
//! performs the relationship side effects.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("missing field '{0}'")]
    Missing(&'static str),
    #[error("field '{field}' has unexpected type")]
    WrongType { field: &'static str },
}

/// One decoded page of a connection.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `end_cursor` only when the upstream reports another page; a stale
    /// cursor next to `has_next_page: false` is treated as end of input.
    pub next_cursor: Option<String>,
    /// False when this page yielded fewer items than requested and more
    /// pages exist upstream, i.e. the caller's quota is not yet satisfied.
    pub complete: bool,
}

/// Result of one driver invocation: the page's entities plus the
/// continuation cursor. The caller decides whether to issue the next call.
#[derive(Debug)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
    pub complete: bool,
}

impl<T> From<Page<T>> for Listing<T> {
    fn from(page: Page<T>) -> Self {
        Listing {
            items: page.items,
            cursor: page.next_cursor,
            complete: page.complete,
        }
    }
}

pub fn field<'a>(value: &'a Value, key: &'static str) -> Result<&'a Value, PageError> {
    value.get(key).ok_or(PageError::Missing(key))
}

pub fn str_field(value: &Value, key: &'static str) -> Result<String, PageError> {
    field(value, key)?
        .as_str()
        .map(str::to_string)
        .ok_or(PageError::WrongType { field: key })
}

pub fn u64_field(value: &Value, key: &'static str) -> Result<u64, PageError> {
    field(value, key)?
        .as_u64()
        .ok_or(PageError::WrongType { field: key })
}

pub fn opt_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn opt_bool(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

pub fn opt_u64(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

/// Decodes at most `count` edges out of `container` in array order.
///
/// `hydrate` maps a node to an entity; returning `Ok(None)` skips the edge
/// without counting it against `count` (used for ad/injected feed items).
pub fn decode_page<T, F>(container: &Value, count: usize, mut hydrate: F) -> Result<Page<T>, PageError>
where
    F: FnMut(&Value) -> Result<Option<T>, PageError>,
{
    let edges = field(container, "edges")?
        .as_array()
        .ok_or(PageError::WrongType { field: "edges" })?;
    let page_info = field(container, "page_info")?;
    let has_next = page_info
        .get("has_next_page")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut items = Vec::new();
    for edge in edges {
        if items.len() >= count {
            break;
        }
        let node = field(edge, "node")?;
        if let Some(item) = hydrate(node)? {
            items.push(item);
        }
    }

    let next_cursor = if has_next {
        opt_str(page_info, "end_cursor")
    } else {
        None
    };

    Ok(Page {
        complete: !(items.len() < count && has_next),
        items,
        next_cursor,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn shortcode(node: &Value) -> Result<Option<String>, PageError> {
        Ok(Some(str_field(node, "shortcode")?))
    }

    fn container(has_next: bool, cursor: &str) -> Value {
        json!({
            "edges": [
                {"node": {"shortcode": "abc"}},
                {"node": {"shortcode": "def"}},
            ],
            "page_info": {"has_next_page": has_next, "end_cursor": cursor},
        })
    }

    #[test]
    fn test_limit_bounds_taken_edges() {
        let page = decode_page(&container(true, "CURSOR1"), 1, shortcode).unwrap();
        assert_eq!(page.items, vec!["abc"]);
        assert_eq!(page.next_cursor.as_deref(), Some("CURSOR1"));
        // quota satisfied, even though more pages exist upstream
        assert!(page.complete);
    }

    #[test]
    fn test_stale_cursor_without_next_page_terminates() {
        let page = decode_page(&container(false, "STALE"), 10, shortcode).unwrap();
        assert_eq!(page.items, vec!["abc", "def"]);
        assert_eq!(page.next_cursor, None);
        assert!(page.complete);
    }

    #[test]
    fn test_incomplete_when_short_page_and_more_upstream() {
        let page = decode_page(&container(true, "CURSOR1"), 10, shortcode).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("CURSOR1"));
        assert!(!page.complete);
    }

    #[test]
    fn test_quota_never_exceeds_edges() {
        let page = decode_page(&container(false, ""), 50, shortcode).unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn test_skipped_edges_do_not_consume_quota() {
        let container = json!({
            "edges": [
                {"node": {"injected": true}},
                {"node": {"shortcode": "abc"}},
                {"node": {"shortcode": "def"}},
            ],
            "page_info": {"has_next_page": false, "end_cursor": null},
        });
        let page = decode_page(&container, 2, |node| Ok(opt_str(node, "shortcode"))).unwrap();
        assert_eq!(page.items, vec!["abc", "def"]);
    }

    #[test]
    fn test_missing_edges_is_hard_failure() {
        let container = json!({"page_info": {"has_next_page": false}});
        let error = decode_page(&container, 1, shortcode).unwrap_err();
        assert!(matches!(error, PageError::Missing("edges")));
    }

    #[test]
    fn test_missing_page_info_is_hard_failure() {
        let container = json!({"edges": []});
        let error = decode_page(&container, 1, shortcode).unwrap_err();
        assert!(matches!(error, PageError::Missing("page_info")));
    }
}

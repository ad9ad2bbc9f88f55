use std::collections::BTreeSet;

use serde_json::Value;

use crate::paging::{field, opt_bool, opt_str, u64_field, PageError};

use super::{HasMedia, Registry, Updatable};

#[derive(Debug)]
pub struct Location {
    pub id: String,
    pub slug: Option<String>,
    pub name: Option<String>,
    pub has_public_page: Option<bool>,
    pub directory: Option<String>,
    pub coordinates: Option<(f64, f64)>,
    pub media_count: Option<u64>,

    pub media: BTreeSet<String>,
    pub top_posts: BTreeSet<String>,
}

impl Location {
    pub fn new(id: String) -> Self {
        Self {
            id,
            slug: None,
            name: None,
            has_public_page: None,
            directory: None,
            coordinates: None,
            media_count: None,
            media: BTreeSet::new(),
            top_posts: BTreeSet::new(),
        }
    }
}

impl Updatable for Location {
    const ENTRY_DATA_POINTER: &'static str = "/LocationsPage/0/graphql/location";
    const BASE_URL: &'static str = "explore/locations/";

    fn key(&self) -> &str {
        &self.id
    }

    fn set_data(&mut self, data: &Value, registry: &Registry) -> Result<(), PageError> {
        if let Some(id) = opt_str(data, "id") {
            self.id = id;
        }
        self.slug = opt_str(data, "slug");
        self.name = opt_str(data, "name");
        self.has_public_page = opt_bool(data, "has_public_page");
        if let Some(directory) = opt_str(data, "directory") {
            self.directory = Some(directory);
        }
        self.coordinates = match (
            data.get("lat").and_then(Value::as_f64),
            data.get("lng").and_then(Value::as_f64),
        ) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        };
        self.media_count = Some(u64_field(field(data, "edge_location_to_media")?, "count")?);
        let top = field(data, "edge_location_to_top_posts")?;
        for edge in field(top, "edges")?.as_array().into_iter().flatten() {
            if let Some(code) = edge.get("node").and_then(|n| opt_str(n, "shortcode")) {
                registry.media(&code);
                self.top_posts.insert(code);
            }
        }
        Ok(())
    }
}

impl HasMedia for Location {
    const MEDIA_POINTER: &'static str = "/location/edge_location_to_media";
    const MEDIA_QUERY_HASH: &'static str = "ac38b90f0f3981c42092016a37c59bf7";

    fn media_variable(&self) -> Option<(&'static str, String)> {
        Some(("id", self.id.clone()))
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
    fn test_set_data_maps_location_fields() {
        let registry = Registry::new();
        let mut location = Location::new("213385402".into());
        let payload = json!({
            "id": "213385402",
            "slug": "london-united-kingdom",
            "name": "London, United Kingdom",
            "has_public_page": true,
            "lat": 51.5072,
            "lng": -0.1275,
            "edge_location_to_media": {"count": 123456},
            "edge_location_to_top_posts": {
                "edges": [{"node": {"shortcode": "top1"}}],
            },
        });
        location.set_data(&payload, &registry).unwrap();
        assert_eq!(location.slug.as_deref(), Some("london-united-kingdom"));
        assert_eq!(location.coordinates, Some((51.5072, -0.1275)));
        assert_eq!(location.media_count, Some(123456));
        assert!(location.top_posts.contains("top1"));
    }
}

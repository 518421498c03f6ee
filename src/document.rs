//! Top-level JSON:API documents.
//!
//! ```json
//! {
//!   "data": [{"id": "1", "type": "post", "attributes": {...}, "relationships": {...}}],
//!   "included": [{"id": "3", "type": "user", "attributes": {...}}],
//!   "meta": {"current_page": 1, "per_page": 50, "total": 1, "last_page": 1, "from": 1, "to": 1},
//!   "links": {"first": "/posts?page%5Bnumber%5D=1", "last": "/posts?page%5Bnumber%5D=1"}
//! }
//! ```
//!
//! When the client did not ask for JSON:API and the configuration does not default to it,
//! [`Document::to_plain`] renders the same data as plain objects.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use serde_with::skip_serializing_none;

use crate::pagination::PageLinks;
use crate::resource::{JsonApiCollection, JsonApiResource, RelationshipData, ResourceIdentifier};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Resource(Box<JsonApiResource>),
    Collection(Vec<JsonApiResource>),
    Null,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<JsonApiResource>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, JsonValue>,
    pub links: Option<PageLinks>,
    #[serde(skip)]
    plain: bool,
}

impl From<JsonApiCollection> for Document {
    fn from(collection: JsonApiCollection) -> Self {
        Self::new(PrimaryData::Collection(collection.data), collection.included)
    }
}

impl From<JsonApiResource> for Document {
    fn from(mut resource: JsonApiResource) -> Self {
        let included = resource.take_included();
        Self::new(PrimaryData::Resource(Box::new(resource)), included)
    }
}

impl Document {
    fn new(data: PrimaryData, included: Vec<JsonApiResource>) -> Self {
        Self {
            data,
            included,
            meta: Map::new(),
            links: None,
            plain: false,
        }
    }

    /// `{"data": null}`
    #[must_use]
    pub fn null() -> Self {
        Self::new(PrimaryData::Null, Vec::new())
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_links(mut self, links: PageLinks) -> Self {
        self.links = Some(links);
        self
    }

    /// Render as plain JSON instead of JSON:API when sent as a response.
    #[must_use]
    pub fn plain(mut self, plain: bool) -> Self {
        self.plain = plain;
        self
    }

    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.plain
    }

    fn find_included(&self, identifier: &ResourceIdentifier) -> Option<&JsonApiResource> {
        self.included
            .iter()
            .find(|resource| resource.identifier == *identifier)
    }

    fn flatten(resource: &JsonApiResource) -> Map<String, JsonValue> {
        let mut object = Map::new();
        object.insert("id".to_string(), json!(resource.identifier.id));
        for (name, value) in &resource.attributes {
            object.insert(name.clone(), value.clone());
        }
        object
    }

    fn plain_resource(&self, resource: &JsonApiResource) -> JsonValue {
        let mut object = Self::flatten(resource);
        for (name, relationship) in &resource.relationships {
            let embed = |identifier: &ResourceIdentifier| {
                self.find_included(identifier)
                    .map_or_else(|| json!({"id": identifier.id}), |related| {
                        JsonValue::Object(Self::flatten(related))
                    })
            };
            let value = match &relationship.data {
                RelationshipData::One(None) => JsonValue::Null,
                RelationshipData::One(Some(identifier)) => embed(identifier),
                RelationshipData::Many(identifiers) => {
                    JsonValue::Array(identifiers.iter().map(embed).collect())
                }
            };
            object.insert(name.clone(), value);
        }
        JsonValue::Object(object)
    }

    /// Plain representation: resources flattened to `{id, ...attributes}` with loaded
    /// relationships embedded one level deep, plus `meta` and `links` when present.
    #[must_use]
    pub fn to_plain(&self) -> JsonValue {
        let data = match &self.data {
            PrimaryData::Resource(resource) => self.plain_resource(resource),
            PrimaryData::Collection(resources) => JsonValue::Array(
                resources
                    .iter()
                    .map(|resource| self.plain_resource(resource))
                    .collect(),
            ),
            PrimaryData::Null => JsonValue::Null,
        };

        let mut body = Map::new();
        body.insert("data".to_string(), data);
        if !self.meta.is_empty() {
            body.insert("meta".to_string(), JsonValue::Object(self.meta.clone()));
        }
        if let Some(links) = &self.links {
            body.insert(
                "links".to_string(),
                serde_json::to_value(links).unwrap_or(JsonValue::Null),
            );
        }
        JsonValue::Object(body)
    }
}

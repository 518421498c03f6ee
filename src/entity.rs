//! Loaded rows.
//!
//! An [`Entity`] is one row of a registered resource: its attribute values in column order
//! plus whatever relationships were eager-loaded onto it. The serializer only ever sees
//! entities, so anything that can produce them (the executor, a test, a handler building
//! data by hand) can be rendered as JSON:API.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Box<Entity>>),
    Many(Vec<Entity>),
}

impl Related {
    /// Loaded entities, regardless of cardinality.
    #[must_use]
    pub fn entities(&self) -> Vec<&Entity> {
        match self {
            Self::One(entity) => entity.iter().map(AsRef::as_ref).collect(),
            Self::Many(entities) => entities.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    model: String,
    key_name: String,
    attributes: IndexMap<String, JsonValue>,
    relations: IndexMap<String, Related>,
}

/// Render a key value the way it appears in a resource identifier.
#[must_use]
pub fn key_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

impl Entity {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            key_name: "id".to_string(),
            attributes: IndexMap::new(),
            relations: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set(name, value);
        self
    }

    #[must_use]
    pub fn related(mut self, name: impl Into<String>, related: Related) -> Self {
        self.set_relation(name, related);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.attributes.get(name)
    }

    /// Drop an attribute. Returns its value when it was present.
    pub fn forget(&mut self, name: &str) -> Option<JsonValue> {
        self.attributes.shift_remove(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.relations.get_mut(name)
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Primary key as a string, `None` when missing or null.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.attributes.get(&self.key_name).and_then(key_string)
    }

    #[must_use]
    pub fn attributes(&self) -> &IndexMap<String, JsonValue> {
        &self.attributes
    }

    #[must_use]
    pub fn relations(&self) -> &IndexMap<String, Related> {
        &self.relations
    }
}

//! # Resource Serialization
//!
//! Turns loaded [`Entity`] graphs into JSON:API resource objects.
//!
//! Every entity becomes `{id, type, attributes, relationships?}`. Only relationships that
//! were already loaded are serialized, nothing is fetched here. Related entities are
//! serialized recursively and collected into an `included` side table, deduplicated by
//! `type` + `id` with the first occurrence kept.
//!
//! Attributes are the entity's values minus the primary key, a field named exactly `_id`,
//! the resource's hidden columns and nulls. Foreign keys such as `author_id` stay.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::entity::{Entity, Related};
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentifier {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelationshipData {
    One(Option<ResourceIdentifier>),
    Many(Vec<ResourceIdentifier>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub data: RelationshipData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonApiResource {
    #[serde(flatten)]
    pub identifier: ResourceIdentifier,
    pub attributes: IndexMap<String, JsonValue>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, Relationship>,
    #[serde(skip)]
    included: Vec<JsonApiResource>,
}

impl JsonApiResource {
    /// Related resources reachable from this one, deduplicated.
    #[must_use]
    pub fn included(&self) -> &[JsonApiResource] {
        &self.included
    }

    /// Take the side table out, leaving the resource without it.
    pub fn take_included(&mut self) -> Vec<JsonApiResource> {
        std::mem::take(&mut self.included)
    }
}

/// Serialized primary data plus the union of everything it includes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonApiCollection {
    pub data: Vec<JsonApiResource>,
    pub included: Vec<JsonApiResource>,
}

fn push_unique(table: &mut Vec<JsonApiResource>, resource: JsonApiResource) {
    if !table
        .iter()
        .any(|existing| existing.identifier == resource.identifier)
    {
        table.push(resource);
    }
}

/// Move a serialized child and its own side table into `table`.
fn absorb(table: &mut Vec<JsonApiResource>, mut child: JsonApiResource) -> ResourceIdentifier {
    let identifier = child.identifier.clone();
    let nested = child.take_included();
    push_unique(table, child);
    for resource in nested {
        push_unique(table, resource);
    }
    identifier
}

pub struct ResourceSerializer<'a> {
    schema: &'a Schema,
    appends: Option<&'a IndexMap<String, Vec<String>>>,
}

impl<'a> ResourceSerializer<'a> {
    #[must_use]
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            appends: None,
        }
    }

    /// Computed attributes to add, keyed by resource type.
    #[must_use]
    pub fn with_appends(mut self, appends: &'a IndexMap<String, Vec<String>>) -> Self {
        self.appends = Some(appends);
        self
    }

    #[must_use]
    pub fn identifier(&self, entity: &Entity) -> ResourceIdentifier {
        ResourceIdentifier {
            id: entity.key().unwrap_or_default(),
            resource_type: self.schema.resource_type(entity.model()),
        }
    }

    fn attributes(&self, entity: &Entity, resource_type: &str) -> IndexMap<String, JsonValue> {
        let descriptor = self.schema.resource(entity.model()).ok();
        let hidden = descriptor.map(|resource| resource.hidden_columns()).unwrap_or_default();

        let mut attributes: IndexMap<String, JsonValue> = entity
            .attributes()
            .iter()
            .filter(|(name, value)| {
                name.as_str() != entity.key_name()
                    && name.as_str() != "_id"
                    && !value.is_null()
                    && !hidden.contains(*name)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let requested = self.appends.and_then(|appends| appends.get(resource_type));
        if let (Some(descriptor), Some(requested)) = (descriptor, requested) {
            for name in requested {
                let Some(compute) = descriptor.get_append(name) else {
                    tracing::debug!(
                        resource_type,
                        append = %name,
                        "Skipping unknown computed attribute",
                    );
                    continue;
                };
                let value = compute(entity);
                if !value.is_null() {
                    attributes.insert(name.clone(), value);
                }
            }
        }
        attributes
    }

    /// Serialize one entity and everything loaded below it.
    #[must_use]
    pub fn resource(&self, entity: &Entity) -> JsonApiResource {
        let identifier = self.identifier(entity);
        let attributes = self.attributes(entity, &identifier.resource_type);

        let mut relationships = IndexMap::new();
        let mut included = Vec::new();
        for (name, related) in entity.relations() {
            let data = match related {
                Related::One(None) => RelationshipData::One(None),
                Related::One(Some(child)) => {
                    RelationshipData::One(Some(absorb(&mut included, self.resource(child))))
                }
                Related::Many(children) => RelationshipData::Many(
                    children
                        .iter()
                        .map(|child| absorb(&mut included, self.resource(child)))
                        .collect(),
                ),
            };
            relationships.insert(name.clone(), Relationship { data });
        }

        JsonApiResource {
            identifier,
            attributes,
            relationships,
            included,
        }
    }

    /// Serialize a list of entities. Resources already present as primary data are left
    /// out of `included`.
    #[must_use]
    pub fn collection(&self, entities: &[Entity]) -> JsonApiCollection {
        let mut data = Vec::with_capacity(entities.len());
        let mut included = Vec::new();
        for entity in entities {
            let mut resource = self.resource(entity);
            for related in resource.take_included() {
                push_unique(&mut included, related);
            }
            data.push(resource);
        }

        included.retain(|related: &JsonApiResource| {
            !data
                .iter()
                .any(|primary| primary.identifier == related.identifier)
        });
        JsonApiCollection { data, included }
    }
}

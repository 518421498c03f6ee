//! # Resource Schema
//!
//! Describes what the query pipeline and the serializer may know about each entity type:
//! its table, primary key, typed columns, hidden attributes, relationships, named query
//! scopes, computed attributes and an optional full-text search capability.
//!
//! Descriptors are registered once at startup into a [`Schema`]; nothing is reflected at
//! request time. Scopes and computed attributes are looked up by name.
//!
//! ```rust,ignore
//! let schema = Schema::new(config)
//!     .register(
//!         Resource::new("Post", "posts")
//!             .column("id", FieldType::Integer)
//!             .column("title", FieldType::Text)
//!             .column("author_id", FieldType::Integer)
//!             .belongs_to("author", "User", "author_id")
//!             .scope("published", |query, _| {
//!                 query.where_clause("status", Comparator::Equal, "published", Boolean::And);
//!             }),
//!     )
//!     .register(Resource::new("User", "users").column("id", FieldType::Integer))
//!     .into_shared();
//! ```

use heck::ToLowerCamelCase;
use indexmap::IndexMap;
use sea_orm::Value;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ApiableConfig;
use crate::entity::Entity;
use crate::errors::RuleError;
use crate::query::{QueryBuilder, ResourceQuery};

/// Storage type of a column, used to bind filter values and decode rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Uuid,
    Json,
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl FieldType {
    /// Bind a raw query-string value as this type. Values that do not parse bind as text.
    #[must_use]
    pub fn cast(self, raw: &str) -> Value {
        let trimmed = raw.trim();
        let typed = match self {
            Self::Integer => trimmed.parse::<i64>().ok().map(Value::from),
            Self::Float => trimmed.parse::<f64>().ok().map(Value::from),
            Self::Boolean => parse_bool(trimmed).map(Value::from),
            Self::Uuid => Uuid::parse_str(trimmed).ok().map(Value::from),
            Self::Text | Self::Json => None,
        };
        typed.unwrap_or_else(|| Value::from(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

/// A declared relationship. `parent_key` lives on the declaring resource, `related_key` on
/// the related one; rows match when both are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub related: String,
    pub kind: RelationKind,
    pub parent_key: String,
    pub related_key: String,
}

impl Relation {
    /// `posts.author_id -> users.id`
    pub fn belongs_to(
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            related: related.into(),
            kind: RelationKind::BelongsTo,
            parent_key: foreign_key.into(),
            related_key: "id".to_string(),
        }
    }

    /// `users.id <- profiles.user_id`, at most one row
    pub fn has_one(
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::HasOne,
            ..Self::has_many(name, related, foreign_key)
        }
    }

    /// `users.id <- posts.author_id`
    pub fn has_many(
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            related: related.into(),
            kind: RelationKind::HasMany,
            parent_key: "id".to_string(),
            related_key: foreign_key.into(),
        }
    }

    /// Override the key columns when they are not `id`.
    #[must_use]
    pub fn keyed_by(
        mut self,
        parent_key: impl Into<String>,
        related_key: impl Into<String>,
    ) -> Self {
        self.parent_key = parent_key.into();
        self.related_key = related_key.into();
        self
    }

    #[must_use]
    pub fn is_to_many(&self) -> bool {
        self.kind == RelationKind::HasMany
    }
}

/// A named query scope, invoked with the raw filter values.
pub type ScopeFn = Arc<dyn Fn(&mut dyn QueryBuilder, &[String]) + Send + Sync>;

/// A computed attribute.
pub type AppendFn = Arc<dyn Fn(&Entity) -> JsonValue + Send + Sync>;

/// Full-text search capability: returns the primary keys matching a term.
pub trait SearchEngine: Send + Sync {
    fn search(&self, term: &str, filters: &IndexMap<String, String>) -> Vec<String>;
}

impl<F> SearchEngine for F
where
    F: Fn(&str, &IndexMap<String, String>) -> Vec<String> + Send + Sync,
{
    fn search(&self, term: &str, filters: &IndexMap<String, String>) -> Vec<String> {
        self(term, filters)
    }
}

/// Descriptor of one entity type.
#[derive(Clone)]
pub struct Resource {
    model: String,
    table: String,
    resource_type: String,
    key_name: String,
    columns: IndexMap<String, FieldType>,
    hidden: Vec<String>,
    relations: IndexMap<String, Relation>,
    scopes: IndexMap<String, ScopeFn>,
    appends: IndexMap<String, AppendFn>,
    search: Option<Arc<dyn SearchEngine>>,
    page_size: Option<u64>,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("model", &self.model)
            .field("table", &self.table)
            .field("resource_type", &self.resource_type)
            .field("key_name", &self.key_name)
            .field("columns", &self.columns)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .field("appends", &self.appends.keys().collect::<Vec<_>>())
            .field("searchable", &self.search.is_some())
            .finish_non_exhaustive()
    }
}

impl Resource {
    pub fn new(model: impl Into<String>, table: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            resource_type: model.to_lowercase(),
            model,
            table: table.into(),
            key_name: "id".to_string(),
            columns: IndexMap::new(),
            hidden: Vec::new(),
            relations: IndexMap::new(),
            scopes: IndexMap::new(),
            appends: IndexMap::new(),
            search: None,
            page_size: None,
        }
    }

    #[must_use]
    pub fn key(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    #[must_use]
    pub fn column(mut self, name: impl Into<String>, kind: FieldType) -> Self {
        self.columns.insert(name.into(), kind);
        self
    }

    /// Columns that are loaded (so relations can be matched) but never serialized.
    #[must_use]
    pub fn hidden(mut self, name: impl Into<String>) -> Self {
        self.hidden.push(name.into());
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    #[must_use]
    pub fn belongs_to(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(Relation::belongs_to(name, related, foreign_key))
    }

    #[must_use]
    pub fn has_one(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(Relation::has_one(name, related, foreign_key))
    }

    #[must_use]
    pub fn has_many(
        self,
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relation(Relation::has_many(name, related, foreign_key))
    }

    #[must_use]
    pub fn scope<F>(mut self, name: impl Into<String>, scope: F) -> Self
    where
        F: Fn(&mut dyn QueryBuilder, &[String]) + Send + Sync + 'static,
    {
        self.scopes.insert(name.into(), Arc::new(scope));
        self
    }

    #[must_use]
    pub fn append<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Entity) -> JsonValue + Send + Sync + 'static,
    {
        self.appends.insert(name.into(), Arc::new(compute));
        self
    }

    #[must_use]
    pub fn searchable(mut self, engine: impl SearchEngine + 'static) -> Self {
        self.search = Some(Arc::new(engine));
        self
    }

    #[must_use]
    pub fn page_size(mut self, size: u64) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    #[must_use]
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    #[must_use]
    pub fn columns(&self) -> &IndexMap<String, FieldType> {
        &self.columns
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    #[must_use]
    pub fn field_type(&self, column: &str) -> FieldType {
        self.columns.get(column).copied().unwrap_or(FieldType::Text)
    }

    #[must_use]
    pub fn hidden_columns(&self) -> &[String] {
        &self.hidden
    }

    #[must_use]
    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    #[must_use]
    pub fn relations(&self) -> &IndexMap<String, Relation> {
        &self.relations
    }

    /// Find a scope by its registered name or by the camel-cased filter attribute
    /// (`is_active` -> `isActive`).
    #[must_use]
    pub fn get_scope(&self, name: &str) -> Option<&ScopeFn> {
        self.scopes
            .get(name)
            .or_else(|| self.scopes.get(&name.to_lower_camel_case()))
    }

    #[must_use]
    pub fn get_append(&self, name: &str) -> Option<&AppendFn> {
        self.appends.get(name)
    }

    #[must_use]
    pub fn search_engine(&self) -> Option<&Arc<dyn SearchEngine>> {
        self.search.as_ref()
    }

    #[must_use]
    pub fn default_page_size(&self) -> Option<u64> {
        self.page_size
    }

    /// Bind a raw value for `column` according to its declared type.
    #[must_use]
    pub fn cast(&self, column: &str, raw: &str) -> Value {
        self.field_type(column).cast(raw)
    }
}

/// Registry of resource descriptors, keyed by model name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    config: Arc<ApiableConfig>,
    resources: IndexMap<String, Arc<Resource>>,
}

impl Schema {
    #[must_use]
    pub fn new(config: Arc<ApiableConfig>) -> Self {
        Self {
            config,
            resources: IndexMap::new(),
        }
    }

    /// Register a descriptor, resolving its JSON:API type through the configured map.
    #[must_use]
    pub fn register(mut self, mut resource: Resource) -> Self {
        resource.resource_type = self.config.resource_type_for(&resource.model);
        self.resources
            .insert(resource.model.clone(), Arc::new(resource));
        self
    }

    #[must_use]
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ApiableConfig> {
        &self.config
    }

    /// # Errors
    ///
    /// Returns [`RuleError::UnknownResource`] when `model` was never registered.
    pub fn resource(&self, model: &str) -> Result<&Arc<Resource>, RuleError> {
        self.resources
            .get(model)
            .ok_or_else(|| RuleError::UnknownResource(model.to_string()))
    }

    /// JSON:API type of a model, registered or not.
    #[must_use]
    pub fn resource_type(&self, model: &str) -> String {
        self.resources.get(model).map_or_else(
            || self.config.resource_type_for(model),
            |resource| resource.resource_type.clone(),
        )
    }

    /// Start a query over `model`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownResource`] when `model` was never registered.
    pub fn query(self: &Arc<Self>, model: &str) -> Result<ResourceQuery, RuleError> {
        let resource = self.resource(model)?.clone();
        Ok(ResourceQuery::new(Arc::clone(self), resource))
    }
}

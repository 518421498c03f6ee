//! Process-wide settings.
//!
//! An [`ApiableConfig`] is built once at startup (by hand, or deserialized from
//! whatever configuration source the host application uses), wrapped in an
//! `Arc` and handed to the [`Schema`](crate::schema::Schema) and every
//! [`RequestQueryObject`](crate::request::RequestQueryObject). Nothing reads
//! global state at request time.

use indexmap::IndexMap;
use serde::Deserialize;

const DEFAULT_PAGE_SIZE: u64 = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiableConfig {
    /// Reject disallowed parameters with an error instead of silently dropping them.
    pub strict: bool,
    /// Describe the allow-list under `meta.allowed_filters` / `meta.allowed_sorts`.
    pub include_allowed: bool,
    /// Model name to JSON:API resource type.
    pub resource_type_map: IndexMap<String, String>,
    /// Page size used when neither the call site nor the resource declares one.
    pub default_page_size: u64,
    /// Render JSON:API documents when the client sent no `Accept` header.
    pub json_api_by_default: bool,
}

impl Default for ApiableConfig {
    fn default() -> Self {
        Self {
            strict: false,
            include_allowed: false,
            resource_type_map: IndexMap::new(),
            default_page_size: DEFAULT_PAGE_SIZE,
            json_api_by_default: true,
        }
    }
}

impl ApiableConfig {
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn include_allowed(mut self, include: bool) -> Self {
        self.include_allowed = include;
        self
    }

    #[must_use]
    pub fn resource_type(
        mut self,
        model: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        self.resource_type_map.insert(model.into(), resource_type.into());
        self
    }

    #[must_use]
    pub fn default_page_size(mut self, size: u64) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// Resolve the JSON:API type for a model, falling back to its lower-cased name.
    #[must_use]
    pub fn resource_type_for(&self, model: &str) -> String {
        self.resource_type_map
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_lowercase())
    }
}

//! # Request Query Object
//!
//! Per-request working set: the raw query string, the query under construction, the
//! allow-rules declared by the handler and the parsed parameters (parsed once, on first
//! use). Rules are registered first, then [`RequestQueryObject::apply`] validates the
//! parameters and runs them through the pipeline.
//!
//! ```rust,ignore
//! let mut request = RequestQueryObject::from_request(&request, schema.query("Post")?)
//!     .allow_filter(AllowFilter::exact("status", ["Active", "Archived"]))
//!     .allow_filter(AllowFilter::similar("title", "*"))
//!     .allow_sort(AllowSort::both("created_at"))
//!     .allow_include(AllowInclude::new("author"))
//!     .default_sort("created_at", Order::Desc);
//!
//! let validated = request.apply()?;
//! let posts = executor::fetch(&db, request.query()).await?;
//! ```

use indexmap::IndexMap;
use sea_orm::Order;
use std::cell::OnceCell;
use std::sync::Arc;

use crate::config::ApiableConfig;
use crate::errors::ApiError;
use crate::http::JsonApiRequest;
use crate::params::QueryParams;
use crate::pipeline::{Pipeline, StageContext};
use crate::query::{QueryBuilder, ResourceQuery};
use crate::rules::{
    AllowAppends, AllowFields, AllowFilter, AllowInclude, AllowRule, AllowRules,
    AllowSearchFilter, AllowSort,
};
use crate::validator::{ValidatedParams, validate_all};

#[derive(Debug)]
pub struct RequestQueryObject<Q = ResourceQuery> {
    path: String,
    query_string: String,
    json_api: Option<bool>,
    query: Q,
    rules: AllowRules,
    config: Arc<ApiableConfig>,
    default_sorts: IndexMap<String, Order>,
    params: OnceCell<QueryParams>,
}

impl RequestQueryObject<ResourceQuery> {
    /// Build from an extracted request, using the configuration of the query's schema.
    #[must_use]
    pub fn from_request(request: &JsonApiRequest, query: ResourceQuery) -> Self {
        let config = Arc::clone(query.schema().config());
        let mut object = Self::new(query, request.query.clone(), config).with_path(&request.path);
        object.json_api = request.json_api;
        object
    }

    /// Build from a raw query string, using the configuration of the query's schema.
    #[must_use]
    pub fn for_query(query: ResourceQuery, query_string: impl Into<String>) -> Self {
        let config = Arc::clone(query.schema().config());
        Self::new(query, query_string, config)
    }
}

impl<Q: QueryBuilder> RequestQueryObject<Q> {
    pub fn new(query: Q, query_string: impl Into<String>, config: Arc<ApiableConfig>) -> Self {
        Self {
            path: String::new(),
            query_string: query_string.into(),
            json_api: None,
            query,
            rules: AllowRules::new(),
            config,
            default_sorts: IndexMap::new(),
            params: OnceCell::new(),
        }
    }

    /// Request path, used to build pagination links.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Register any allow-rule.
    #[must_use]
    pub fn allow(mut self, rule: impl Into<AllowRule>) -> Self {
        self.rules.allow(rule);
        self
    }

    #[must_use]
    pub fn allow_filter(self, rule: AllowFilter) -> Self {
        self.allow(rule)
    }

    #[must_use]
    pub fn allow_sort(self, rule: AllowSort) -> Self {
        self.allow(rule)
    }

    #[must_use]
    pub fn allow_include(self, rule: AllowInclude) -> Self {
        self.allow(rule)
    }

    #[must_use]
    pub fn allow_fields(self, rule: AllowFields) -> Self {
        self.allow(rule)
    }

    #[must_use]
    pub fn allow_appends(self, rule: AllowAppends) -> Self {
        self.allow(rule)
    }

    #[must_use]
    pub fn allow_search_filter(self, rule: AllowSearchFilter) -> Self {
        self.allow(rule)
    }

    #[must_use]
    pub fn allow_search(mut self, allowed: bool) -> Self {
        self.rules.allow_search(allowed);
        self
    }

    /// Sort applied only when the client sent no accepted sort.
    #[must_use]
    pub fn default_sort(mut self, attribute: impl Into<String>, order: Order) -> Self {
        self.default_sorts.insert(attribute.into(), order);
        self
    }

    #[must_use]
    pub fn rules(&self) -> &AllowRules {
        &self.rules
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ApiableConfig> {
        &self.config
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Whether the response should be JSON:API, falling back to the configured default when
    /// the client did not say.
    #[must_use]
    pub fn wants_json_api(&self) -> bool {
        self.json_api.unwrap_or(self.config.json_api_by_default)
    }

    /// Parsed query-string parameters, computed once.
    pub fn params(&self) -> &QueryParams {
        self.params.get_or_init(|| QueryParams::parse(&self.query_string))
    }

    /// Validate the parameters against the registered rules.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidParameter`] when an enforced category rejects a value.
    pub fn validate(&self) -> Result<ValidatedParams, ApiError> {
        let mut validated = validate_all(self.params(), &self.rules, self.config.strict)?;
        if validated.sorts.is_empty() {
            validated.sorts = self.default_sorts.clone();
        }
        Ok(validated)
    }

    /// Validate and run the default pipeline over the query.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidParameter`] when an enforced category rejects a value.
    pub fn apply(&mut self) -> Result<ValidatedParams, ApiError> {
        self.apply_with(&Pipeline::default())
    }

    /// Validate and run a custom pipeline over the query.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidParameter`] when an enforced category rejects a value.
    pub fn apply_with(&mut self, pipeline: &Pipeline) -> Result<ValidatedParams, ApiError> {
        let validated = self.validate()?;
        let ctx = StageContext {
            params: &validated,
            rules: &self.rules,
        };
        pipeline.run(&ctx, &mut self.query);
        Ok(validated)
    }

    #[must_use]
    pub fn query(&self) -> &Q {
        &self.query
    }

    #[must_use]
    pub fn into_query(self) -> Q {
        self.query
    }
}

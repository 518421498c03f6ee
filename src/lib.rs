//! # apiable
//!
//! JSON:API query handling for Axum and Sea-ORM. Untrusted query-string parameters
//! (`filter`, `sort`, `include`, `fields`, `appends`, `q`, `page`) are validated against a
//! developer-declared allow-list, applied to a query through an ordered pipeline, executed,
//! and rendered as JSON:API documents with deduplicated `included` resources.
//!
//! ```rust,ignore
//! use apiable::prelude::*;
//!
//! let schema = Schema::new(Arc::new(ApiableConfig::default()))
//!     .register(
//!         Resource::new("Post", "posts")
//!             .column("id", FieldType::Integer)
//!             .column("title", FieldType::Text)
//!             .column("status", FieldType::Text)
//!             .column("author_id", FieldType::Integer)
//!             .belongs_to("author", "User", "author_id"),
//!     )
//!     .register(
//!         Resource::new("User", "users")
//!             .column("id", FieldType::Integer)
//!             .column("name", FieldType::Text),
//!     )
//!     .into_shared();
//!
//! async fn list_posts(
//!     State(app): State<AppState>,
//!     request: JsonApiRequest,
//! ) -> Result<Document, ApiError> {
//!     let query = RequestQueryObject::from_request(&request, app.schema.query("Post")?)
//!         .allow_filter(AllowFilter::exact("status", ["Active", "Archived"]))
//!         .allow_sort(AllowSort::both("title"))
//!         .allow_include(AllowInclude::new("author"));
//!     JsonApiResponse::new(query).paginate(None).collection(&app.db).await
//! }
//! ```

pub mod config;
pub mod document;
pub mod entity;
pub mod errors;
pub mod executor;
pub mod http;
pub mod pagination;
pub mod params;
pub mod pipeline;
pub mod predicate;
pub mod query;
pub mod request;
pub mod resource;
pub mod response;
pub mod rules;
pub mod schema;
pub mod validator;

pub use config::ApiableConfig;
pub use document::Document;
pub use entity::{Entity, Related};
pub use errors::{ApiError, RuleError};
pub use http::{JsonApiQueryParams, JsonApiRequest, accepts_json_api};
pub use params::QueryParams;
pub use query::{QueryBuilder, ResourceQuery};
pub use request::RequestQueryObject;
pub use resource::{JsonApiCollection, JsonApiResource, ResourceSerializer};
pub use response::JsonApiResponse;
pub use rules::{
    AllowAppends, AllowFields, AllowFilter, AllowInclude, AllowRules, AllowSearchFilter,
    AllowSort, AllowedValues, FilterOperator, SortDirection,
};
pub use schema::{FieldType, Resource, Schema};

/// Everything a handler usually needs.
pub mod prelude {
    pub use crate::predicate::{Boolean, Comparator};
    pub use crate::{
        AllowAppends, AllowFields, AllowFilter, AllowInclude, AllowSearchFilter, AllowSort,
        ApiError, ApiableConfig, Document, FieldType, JsonApiRequest, JsonApiResponse,
        QueryBuilder, RequestQueryObject, Resource, Schema, SortDirection,
    };
    pub use sea_orm::Order;
}

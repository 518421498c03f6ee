//! # HTTP Integration
//!
//! axum glue: the [`JsonApiRequest`] extractor captures the path, the raw query string and
//! the client's `Accept` preference; [`Document`] responds with the JSON:API media type (or
//! plain JSON when asked to); [`JsonApiQueryParams`] documents the query grammar for
//! OpenAPI.
//!
//! ```rust,ignore
//! async fn list_posts(
//!     State(app): State<AppState>,
//!     request: JsonApiRequest,
//! ) -> Result<Document, ApiError> {
//!     let query = RequestQueryObject::from_request(&request, app.schema.query("Post")?)
//!         .allow_filter(AllowFilter::exact("status", "*"))
//!         .allow_include(AllowInclude::new("author"));
//!     JsonApiResponse::new(query).paginate(None).collection(&app.db).await
//! }
//! ```

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use utoipa::IntoParams;

use crate::document::Document;

pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Whether the `Accept` header lists the JSON:API media type.
#[must_use]
pub fn accepts_json_api(headers: &HeaderMap) -> bool {
    negotiate(headers) == Some(true)
}

/// `None` when the client expressed no preference (no `Accept`, or only `*/*`).
fn negotiate(headers: &HeaderMap) -> Option<bool> {
    let accept: Vec<&str> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|media| media.split(';').next().unwrap_or_default().trim())
        .filter(|media| !media.is_empty())
        .collect();

    if accept.iter().any(|media| *media == JSON_API_MEDIA_TYPE) {
        Some(true)
    } else if accept.iter().all(|media| *media == "*/*") {
        None
    } else {
        Some(false)
    }
}

/// Request data the query pipeline needs, extracted from any axum request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonApiRequest {
    pub path: String,
    /// Raw query string, still percent-encoded, without `?`.
    pub query: String,
    /// Client preference from `Accept`, `None` when it expressed none.
    pub json_api: Option<bool>,
}

impl<S> FromRequestParts<S> for JsonApiRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            json_api: negotiate(&parts.headers),
        })
    }
}

impl IntoResponse for Document {
    fn into_response(self) -> Response {
        if self.is_plain() {
            return Json(self.to_plain()).into_response();
        }

        let mut response = Json(self).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_API_MEDIA_TYPE),
        );
        response
    }
}

/// JSON:API query parameters, for OpenAPI documentation.
///
/// Handlers read the raw query string through [`JsonApiRequest`]; this struct only
/// describes the grammar:
///
/// - `filter[<attribute>]=v1,v2` filters, values OR-ed per attribute
/// - `sort=title,-created_at` ascending unless prefixed with `-`
/// - `include=author,comments.author` relationships to side-load
/// - `fields[<type>]=title,body` sparse fieldsets
/// - `appends[<type>]=excerpt` computed attributes
/// - `q=<term>` full-text search
/// - `page[size]=25&page[number]=2` pagination
#[derive(Debug, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct JsonApiQueryParams {
    /// Filters keyed by attribute, e.g. `filter[status]=Active,Pending`
    #[param(style = DeepObject, explode)]
    pub filter: Option<HashMap<String, String>>,
    /// Comma-separated sort attributes, `-` for descending
    #[param(example = "title,-created_at")]
    pub sort: Option<String>,
    /// Comma-separated relationship paths
    #[param(example = "author,comments.author")]
    pub include: Option<String>,
    /// Sparse fieldsets keyed by resource type, e.g. `fields[post]=title,body`
    #[param(style = DeepObject, explode)]
    pub fields: Option<HashMap<String, String>>,
    /// Computed attributes keyed by resource type
    #[param(style = DeepObject, explode)]
    pub appends: Option<HashMap<String, String>>,
    /// Full-text search term
    #[param(example = "rust")]
    pub q: Option<String>,
    /// Items per page
    #[serde(rename = "page[size]")]
    #[param(example = 25)]
    pub page_size: Option<u64>,
    /// 1-based page number
    #[serde(rename = "page[number]")]
    #[param(example = 1)]
    pub page_number: Option<u64>,
}

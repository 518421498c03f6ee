//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - [`ApiError`] is what request handling returns. It maps onto an HTTP status and is
//!   rendered as a JSON:API `errors` document. Rejected query parameters carry the
//!   offending key and value so clients can diagnose the problem without server logs.
//!   Database failures are logged with `tracing` and sanitized before they reach the client.
//! - [`RuleError`] is raised while allow-rules are declared, so a misconfigured rule fails
//!   at registration time rather than on the first request that hits it.
//!
//! ```rust,ignore
//! async fn list_posts(
//!     request: JsonApiRequest,
//!     State(app): State<App>,
//! ) -> Result<Document, ApiError> {
//!     let query = RequestQueryObject::from_request(&request, app.schema.query("Post")?)
//!         .allow_filter(AllowFilter::exact("status", ["Active", "Archived"]));
//!     JsonApiResponse::new(query).paginate(None).collection(&app.db).await
//! }
//! ```

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use std::fmt;

/// API error type with automatic logging and sanitized responses
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - a query parameter was rejected by the allow-list
    InvalidParameter {
        /// Query-string key, e.g. `filter[status]` or `include`
        parameter: String,
        /// The value that failed validation
        value: String,
    },

    /// 500 Internal Server Error - Database error (details logged, not exposed)
    Database {
        /// Internal error (logged, not sent to user)
        internal: DbErr,
    },

    /// 500 Internal Server Error - Generic internal error
    Internal {
        /// User-facing generic message
        message: String,
        /// Internal error details (logged, not sent to user)
        internal: Option<String>,
    },
}

impl ApiError {
    /// Create a 400 error for a query parameter the allow-list rejected
    ///
    /// # Example
    /// ```rust,ignore
    /// return Err(ApiError::invalid_parameter("include", "secrets"));
    /// ```
    pub fn invalid_parameter(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    /// Create a 500 Internal Server Error from a database error
    ///
    /// The database error details are logged but NOT sent to the user.
    pub fn database(err: DbErr) -> Self {
        Self::Database { internal: err }
    }

    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "Invalid Query Parameter",
            Self::Database { .. } | Self::Internal { .. } => "Internal Server Error",
        }
    }

    /// Get the user-facing error message (sanitized)
    fn user_message(&self) -> String {
        match self {
            Self::InvalidParameter { parameter, value } => {
                format!("Value '{value}' is not allowed for parameter '{parameter}'")
            }
            Self::Internal { message, .. } => message.clone(),
            Self::Database { .. } => "A database error occurred".to_string(),
        }
    }

    /// Log internal error details (not sent to user)
    fn log_internal(&self) {
        match self {
            Self::Database { internal } => {
                tracing::error!(error = ?internal, "Database error occurred");
            }
            Self::Internal {
                internal: Some(details),
                ..
            } => {
                tracing::error!(details = %details, "Internal error occurred");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "API error"
                );
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorSource {
    parameter: String,
}

#[derive(Serialize)]
struct ErrorObject {
    status: String,
    title: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<ErrorSource>,
}

/// Error document sent to users (sanitized)
#[derive(Serialize)]
struct ErrorDocument {
    errors: Vec<ErrorObject>,
}

impl ApiError {
    fn to_document(&self) -> ErrorDocument {
        let source = match self {
            Self::InvalidParameter { parameter, .. } => Some(ErrorSource {
                parameter: parameter.clone(),
            }),
            _ => None,
        };

        ErrorDocument {
            errors: vec![ErrorObject {
                status: self.status_code().as_u16().to_string(),
                title: self.title(),
                detail: self.user_message(),
                source,
            }],
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_internal();

        let status = self.status_code();
        let mut response = (status, Json(self.to_document())).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(crate::http::JSON_API_MEDIA_TYPE),
        );
        response
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ApiError {}

impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        Self::database(err)
    }
}

/// Raised while declaring allow-rules or resource descriptors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),
    #[error("unknown sort direction '{0}'")]
    UnknownDirection(String),
    #[error("a filter rule for '{0}' needs at least one operator")]
    MissingOperator(String),
    #[error("resource '{0}' is not registered")]
    UnknownResource(String),
}

impl From<RuleError> for ApiError {
    fn from(err: RuleError) -> Self {
        Self::internal("The endpoint is misconfigured", Some(err.to_string()))
    }
}

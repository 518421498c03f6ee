//! # Response Facade
//!
//! [`JsonApiResponse`] ties one request together: validate and apply the parameters,
//! run the query (paginated or not), serialize the entities and wrap them in a
//! [`Document`]. When the configuration asks for it, the allow-list is described in
//! `meta.allowed_filters` / `meta.allowed_sorts` so clients can discover it.

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::document::Document;
use crate::errors::ApiError;
use crate::executor;
use crate::pagination::paginate;
use crate::request::RequestQueryObject;
use crate::resource::ResourceSerializer;

pub struct JsonApiResponse {
    request: RequestQueryObject,
    pagination: Option<Option<u64>>,
}

impl JsonApiResponse {
    #[must_use]
    pub fn new(request: RequestQueryObject) -> Self {
        Self {
            request,
            pagination: None,
        }
    }

    /// Paginate the collection. `per_page` is the minimum page size for this endpoint;
    /// `None` uses the resource or configured default.
    #[must_use]
    pub fn paginate(mut self, per_page: Option<u64>) -> Self {
        self.pagination = Some(per_page);
        self
    }

    fn decorate(request: &RequestQueryObject, document: Document) -> Document {
        let document = if request.config().include_allowed {
            document
                .with_meta("allowed_filters", request.rules().describe_filters())
                .with_meta("allowed_sorts", request.rules().describe_sorts())
        } else {
            document
        };
        document.plain(!request.wants_json_api())
    }

    /// Respond with a collection, paginated when [`paginate`](Self::paginate) was called.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidParameter`] for rejected parameters and
    /// [`ApiError::Database`] when a query fails.
    pub async fn collection(self, db: &DatabaseConnection) -> Result<Document, ApiError> {
        let Self {
            mut request,
            pagination,
        } = self;
        let validated = request.apply()?;
        let query = request.query().clone();
        let schema = Arc::clone(query.schema());
        let serializer = ResourceSerializer::new(&schema).with_appends(&validated.appends);

        let document = match pagination {
            Some(per_page) => {
                let page = paginate(db, &query, per_page, validated.page).await?;
                let mut document = Document::from(serializer.collection(&page.items))
                    .with_links(page.links(request.path(), request.query_string()));
                document.meta.extend(page.meta());
                document
            }
            None => {
                let entities = executor::fetch(db, &query).await?;
                Document::from(serializer.collection(&entities))
            }
        };

        Ok(Self::decorate(&request, document))
    }

    /// Respond with the first matching resource, or `data: null`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidParameter`] for rejected parameters and
    /// [`ApiError::Database`] when a query fails.
    pub async fn first(self, db: &DatabaseConnection) -> Result<Document, ApiError> {
        let mut request = self.request;
        let validated = request.apply()?;
        let query = request.query().clone();
        let schema = Arc::clone(query.schema());

        let document = match executor::fetch_first(db, &query).await? {
            Some(entity) => Document::from(
                ResourceSerializer::new(&schema)
                    .with_appends(&validated.appends)
                    .resource(&entity),
            ),
            None => Document::null(),
        };

        Ok(Self::decorate(&request, document))
    }
}

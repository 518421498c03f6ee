//! # Pagination
//!
//! Length-aware pages over a [`ResourceQuery`]. The effective page size is the largest of
//! the size passed by the call site, the client's `page[size]` and the resource's default
//! (falling back to the configured default), so a client can grow a page but never shrink
//! it below what the endpoint declares, nor grow it past what a LIMIT can bind. An empty
//! result short-circuits: when the count is zero, or the page starts past the last row, the
//! rows are never fetched.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use serde_with::skip_serializing_none;
use sea_orm::{DatabaseConnection, DbErr};
use url::form_urlencoded;

use crate::entity::Entity;
use crate::executor;
use crate::params::PageParams;
use crate::query::{QueryBuilder, ResourceQuery};

/// One page of items plus the numbers needed to describe it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}

/// Top-level `links` of a paginated document.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    pub first: String,
    pub last: String,
    pub prev: Option<String>,
    pub next: Option<String>,
}

/// Largest page size a database LIMIT can bind.
pub const MAX_PAGE_SIZE: u64 = i64::MAX.unsigned_abs();

/// Largest of the declared sizes, between 1 and [`MAX_PAGE_SIZE`].
#[must_use]
pub fn page_size(explicit: Option<u64>, requested: Option<u64>, default: u64) -> u64 {
    [explicit, requested, Some(default)]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(default)
        .clamp(1, MAX_PAGE_SIZE)
}

fn page_url(path: &str, query_string: &str, number: u64) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.extend_pairs(
        form_urlencoded::parse(query_string.as_bytes()).filter(|(key, _)| key != "page[number]"),
    );
    serializer.append_pair("page[number]", &number.to_string());
    format!("{path}?{}", serializer.finish())
}

impl<T> Page<T> {
    #[must_use]
    pub fn last_page(&self) -> u64 {
        self.total.div_ceil(self.per_page.max(1)).max(1)
    }

    /// 1-based position of the first item, `None` for an empty page.
    #[must_use]
    pub fn from(&self) -> Option<u64> {
        (!self.items.is_empty()).then(|| {
            self.current_page
                .saturating_sub(1)
                .saturating_mul(self.per_page)
                .saturating_add(1)
        })
    }

    #[must_use]
    pub fn to(&self) -> Option<u64> {
        self.from()
            .map(|from| from.saturating_add(self.items.len() as u64 - 1))
    }

    #[must_use]
    pub fn meta(&self) -> Map<String, JsonValue> {
        let mut meta = Map::new();
        meta.insert("current_page".to_string(), self.current_page.into());
        meta.insert("per_page".to_string(), self.per_page.into());
        meta.insert("total".to_string(), self.total.into());
        meta.insert("last_page".to_string(), self.last_page().into());
        meta.insert("from".to_string(), self.from().into());
        meta.insert("to".to_string(), self.to().into());
        meta
    }

    /// Links to the first, last, previous and next pages, keeping every other query
    /// parameter of the request.
    #[must_use]
    pub fn links(&self, path: &str, query_string: &str) -> PageLinks {
        let last = self.last_page();
        PageLinks {
            first: page_url(path, query_string, 1),
            last: page_url(path, query_string, last),
            prev: (self.current_page > 1)
                .then(|| page_url(path, query_string, self.current_page - 1)),
            next: (self.current_page < last)
                .then(|| page_url(path, query_string, self.current_page + 1)),
        }
    }
}

/// Count, then fetch one page of `query`.
///
/// # Errors
///
/// Returns the database error of the count or the fetch.
pub async fn paginate(
    db: &DatabaseConnection,
    query: &ResourceQuery,
    per_page: Option<u64>,
    page: PageParams,
) -> Result<Page<Entity>, DbErr> {
    let default = query
        .resource()
        .default_page_size()
        .unwrap_or(query.schema().config().default_page_size);
    let per_page = page_size(per_page, page.size, default);
    let current_page = page.number.unwrap_or(1).max(1);

    let total = executor::count(db, query).await?;
    let offset = (current_page - 1)
        .checked_mul(per_page)
        .filter(|offset| *offset < total);
    let Some(offset) = offset else {
        return Ok(Page {
            items: Vec::new(),
            total,
            per_page,
            current_page,
        });
    };

    let mut paged = query.clone();
    paged.limit(per_page).offset(offset);
    let items = executor::fetch(db, &paged).await?;

    Ok(Page {
        items,
        total,
        per_page,
        current_page,
    })
}

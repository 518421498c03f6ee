//! # Query Parameter Parsing
//!
//! Extracts the JSON:API parameter families from a raw query string:
//!
//! ```text
//! filter[<attr>]=<v1>,<v2>        filter values, comma-separated
//! sort=<attr>,-<attr2>            ascending by default, leading '-' = descending
//! include=<rel1>,<rel2.nested>    relationships to side-load
//! fields[<type>]=<col1>,<col2>    sparse fieldsets
//! appends[<type>]=<attr1>         computed attributes
//! q=<term> or search=<term>       full-text search term
//! search[filter][<attr>]=<value>  search-scoped filters
//! page[size]=<n>&page[number]=<n> pagination
//! ```
//!
//! Parsing is side-effect free and never fails: malformed fragments are skipped.

use indexmap::{IndexMap, IndexSet};
use sea_orm::Order;
use url::form_urlencoded;

/// Structured query-string parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub filters: IndexMap<String, Vec<String>>,
    pub sorts: IndexMap<String, Order>,
    pub includes: Vec<String>,
    pub fields: IndexMap<String, Vec<String>>,
    pub appends: IndexMap<String, Vec<String>>,
    pub search: Option<String>,
    pub search_filters: IndexMap<String, String>,
    pub page: PageParams,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageParams {
    pub size: Option<u64>,
    pub number: Option<u64>,
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// `filter[status]` -> `Some(("filter", "status"))`
fn bracketed<'a>(key: &'a str, family: &str) -> Option<&'a str> {
    key.strip_prefix(family)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .filter(|inner| !inner.is_empty())
}

fn parse_positive(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

/// Parse `sort=name,-created_at` front to back. A repeated attribute takes the direction of
/// its last occurrence but keeps the position of its first.
fn parse_sorts(raw: &str) -> IndexMap<String, Order> {
    let mut sorts = IndexMap::new();
    for entry in split_list(raw) {
        let (attribute, direction) = match entry.strip_prefix('-') {
            Some(attribute) => (attribute.trim(), Order::Desc),
            None => (entry.as_str(), Order::Asc),
        };
        if attribute.is_empty() {
            continue;
        }
        sorts.insert(attribute.to_string(), direction);
    }
    sorts
}

impl QueryParams {
    /// Parse a raw (still percent-encoded) query string, without the leading `?`.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        let mut includes: IndexSet<String> = IndexSet::new();
        let mut q_term = None;
        let mut search_term = None;

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let key = key.as_ref();
            let value = value.as_ref();

            match key {
                "sort" => {
                    for (attribute, direction) in parse_sorts(value) {
                        params.sorts.insert(attribute, direction);
                    }
                }
                "include" => includes.extend(split_list(value)),
                "q" => q_term = Some(value.trim().to_string()).filter(|t| !t.is_empty()),
                "search" => search_term = Some(value.trim().to_string()).filter(|t| !t.is_empty()),
                "page[size]" => params.page.size = parse_positive(value),
                "page[number]" => params.page.number = parse_positive(value),
                _ => {
                    if let Some(attribute) = key
                        .strip_prefix("search[filter]")
                        .and_then(|rest| bracketed(rest, ""))
                    {
                        params
                            .search_filters
                            .insert(attribute.to_string(), value.trim().to_string());
                    } else if let Some(attribute) = bracketed(key, "filter") {
                        let values = split_list(value);
                        if values.is_empty() {
                            params.filters.shift_remove(attribute);
                        } else {
                            params.filters.insert(attribute.to_string(), values);
                        }
                    } else if let Some(resource_type) = bracketed(key, "fields") {
                        params
                            .fields
                            .insert(resource_type.to_string(), split_list(value));
                    } else if let Some(resource_type) = bracketed(key, "appends") {
                        params
                            .appends
                            .insert(resource_type.to_string(), split_list(value));
                    }
                }
            }
        }

        params.includes = includes.into_iter().collect();
        params.search = q_term.or(search_term);
        params
    }

    /// Whether the client sent nothing that would modify a query.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
            && self.sorts.is_empty()
            && self.includes.is_empty()
            && self.fields.is_empty()
            && self.appends.is_empty()
            && self.search.is_none()
            && self.search_filters.is_empty()
    }
}

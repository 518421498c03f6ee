//! # Parameter Validation
//!
//! Matches parsed query parameters against the registered allow-rules. Two strategies:
//!
//! - [`ValidationStrategy::Enforce`]: a parameter without a rule, or with a value its rule
//!   rejects, fails the request with [`ApiError::InvalidParameter`].
//! - [`ValidationStrategy::FilterSilently`]: such parameters are dropped and the request
//!   proceeds as if they had never been sent.
//!
//! Value matching for filters and search filters:
//!
//! | rule values         | supplied values      | result                    |
//! |---------------------|----------------------|---------------------------|
//! | `*`                 | anything             | kept as-is                |
//! | `Active`            | `Active`             | kept                      |
//! | `Active, Archived`  | `Active, Inactive`   | `Active` kept (partial)   |
//! | `in*`               | `internet, other`    | whole attribute rejected  |

use indexmap::IndexMap;
use regex::Regex;
use sea_orm::Order;

use crate::errors::ApiError;
use crate::params::{PageParams, QueryParams};
use crate::rules::{AllowRules, AllowedValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStrategy {
    Enforce,
    FilterSilently,
}

impl ValidationStrategy {
    /// Strict mode upgrades every category to `Enforce`.
    #[must_use]
    pub const fn or_strict(self, strict: bool) -> Self {
        if strict { Self::Enforce } else { self }
    }
}

/// Outcome of checking one parameter against its rule.
enum Verdict<V> {
    Accept(V),
    /// `value` is the first offending value; `kept` what survives partial acceptance.
    Reject { value: String, kept: Option<V> },
}

/// Glob match where `*` is the only wildcard.
fn glob_matches(pattern: &str, value: &str) -> bool {
    let expression = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    Regex::new(&expression).is_ok_and(|re| re.is_match(value))
}

fn value_allowed(entries: &[String], value: &str) -> bool {
    entries
        .iter()
        .any(|entry| entry == value || (entry.contains('*') && glob_matches(entry, value)))
}

/// Apply the matching algorithm. `None` means the whole attribute is rejected.
#[must_use]
pub fn matching_values(allowed: &AllowedValues, values: &[String]) -> Option<Vec<String>> {
    match allowed {
        AllowedValues::Any => Some(values.to_vec()),
        AllowedValues::Only(entries) if allowed.is_pattern() => values
            .iter()
            .all(|value| value_allowed(entries, value))
            .then(|| values.to_vec()),
        AllowedValues::Only(entries) => {
            let kept: Vec<String> = values
                .iter()
                .filter(|value| entries.contains(value))
                .cloned()
                .collect();
            (!kept.is_empty()).then_some(kept)
        }
    }
}

fn check_values(allowed: &AllowedValues, values: &[String]) -> Verdict<Vec<String>> {
    let kept = matching_values(allowed, values);
    match kept {
        Some(kept) if kept.len() == values.len() => Verdict::Accept(kept),
        kept => {
            let value = values
                .iter()
                .find(|value| matching_values(allowed, std::slice::from_ref(*value)).is_none())
                .cloned()
                .unwrap_or_default();
            Verdict::Reject { value, kept }
        }
    }
}

fn check_names(allowed: &[String], requested: &[String]) -> Verdict<Vec<String>> {
    let (kept, rejected): (Vec<String>, Vec<String>) = requested
        .iter()
        .cloned()
        .partition(|name| allowed.contains(name));
    match rejected.into_iter().next() {
        None => Verdict::Accept(kept),
        Some(value) => Verdict::Reject {
            value,
            kept: (!kept.is_empty()).then_some(kept),
        },
    }
}

/// Core validation loop shared by every category.
fn validate_with<V, R, F>(
    params: impl IntoIterator<Item = (String, V)>,
    rules: &IndexMap<String, R>,
    strategy: ValidationStrategy,
    parameter: impl Fn(&str) -> String,
    describe: impl Fn(&V) -> String,
    check: F,
) -> Result<IndexMap<String, V>, ApiError>
where
    F: Fn(&R, &V) -> Verdict<V>,
{
    let mut validated = IndexMap::new();

    for (key, value) in params {
        let Some(rule) = rules.get(&key) else {
            if strategy == ValidationStrategy::Enforce {
                return Err(ApiError::invalid_parameter(parameter(&key), describe(&value)));
            }
            tracing::debug!(parameter = %parameter(&key), "Dropping parameter without allow-rule");
            continue;
        };

        match check(rule, &value) {
            Verdict::Accept(value) => {
                validated.insert(key, value);
            }
            Verdict::Reject { value, kept } => {
                if strategy == ValidationStrategy::Enforce {
                    return Err(ApiError::invalid_parameter(parameter(&key), value));
                }
                tracing::debug!(
                    parameter = %parameter(&key),
                    rejected = %value,
                    "Dropping disallowed parameter value"
                );
                if let Some(kept) = kept {
                    validated.insert(key, kept);
                }
            }
        }
    }

    Ok(validated)
}

fn joined(values: &Vec<String>) -> String {
    values.join(",")
}

/// Validate `filter[...]` values.
///
/// # Errors
///
/// Under `Enforce`, fails on the first attribute without a rule or with a rejected value.
pub fn validate_filters(
    params: &QueryParams,
    rules: &AllowRules,
    strategy: ValidationStrategy,
) -> Result<IndexMap<String, Vec<String>>, ApiError> {
    validate_with(
        params.filters.clone(),
        rules.filters(),
        strategy,
        |key| format!("filter[{key}]"),
        joined,
        |rule, values| check_values(&rule.values, values),
    )
}

/// Validate `sort` entries against the allowed directions.
///
/// # Errors
///
/// Under `Enforce`, fails on the first sort without a rule or with a disallowed direction.
pub fn validate_sorts(
    params: &QueryParams,
    rules: &AllowRules,
    strategy: ValidationStrategy,
) -> Result<IndexMap<String, Order>, ApiError> {
    let sorts: Vec<(String, Order)> = params
        .sorts
        .iter()
        .map(|(attribute, order)| (attribute.clone(), order.clone()))
        .collect();

    validate_with(
        sorts,
        rules.sorts(),
        strategy,
        |_| "sort".to_string(),
        |order| match order {
            Order::Desc => "descending".to_string(),
            _ => "ascending".to_string(),
        },
        |rule, order| {
            if rule.direction.permits(order) {
                Verdict::Accept(order.clone())
            } else {
                let value = match order {
                    Order::Desc => format!("-{}", rule.attribute),
                    _ => rule.attribute.clone(),
                };
                Verdict::Reject { value, kept: None }
            }
        },
    )
}

/// Validate `include` paths.
///
/// # Errors
///
/// Under `Enforce`, fails on the first relationship path that is not allowed.
pub fn validate_includes(
    params: &QueryParams,
    rules: &AllowRules,
    strategy: ValidationStrategy,
) -> Result<Vec<String>, ApiError> {
    let includes = params
        .includes
        .iter()
        .map(|path| (path.clone(), path.clone()));

    Ok(validate_with(
        includes,
        rules.includes(),
        strategy,
        |_| "include".to_string(),
        Clone::clone,
        |_, path| Verdict::Accept(path.clone()),
    )?
    .into_values()
    .collect())
}

/// Validate `fields[type]` column lists.
///
/// # Errors
///
/// Under `Enforce`, fails on the first type or column that is not allowed.
pub fn validate_fields(
    params: &QueryParams,
    rules: &AllowRules,
    strategy: ValidationStrategy,
) -> Result<IndexMap<String, Vec<String>>, ApiError> {
    validate_with(
        params.fields.clone(),
        rules.fields(),
        strategy,
        |resource_type| format!("fields[{resource_type}]"),
        joined,
        |rule, columns| check_names(&rule.attributes, columns),
    )
}

/// Validate `appends[type]` attribute lists.
///
/// # Errors
///
/// Under `Enforce`, fails on the first type or attribute that is not allowed.
pub fn validate_appends(
    params: &QueryParams,
    rules: &AllowRules,
    strategy: ValidationStrategy,
) -> Result<IndexMap<String, Vec<String>>, ApiError> {
    validate_with(
        params.appends.clone(),
        rules.appends(),
        strategy,
        |resource_type| format!("appends[{resource_type}]"),
        joined,
        |rule, attributes| check_names(&rule.attributes, attributes),
    )
}

/// Validate `search[filter][...]` values.
///
/// # Errors
///
/// Under `Enforce`, fails on the first search filter that is not allowed.
pub fn validate_search_filters(
    params: &QueryParams,
    rules: &AllowRules,
    strategy: ValidationStrategy,
) -> Result<IndexMap<String, String>, ApiError> {
    validate_with(
        params.search_filters.clone(),
        rules.search_filters(),
        strategy,
        |attribute| format!("search[filter][{attribute}]"),
        Clone::clone,
        |rule, value| match check_values(&rule.values, std::slice::from_ref(value)) {
            Verdict::Accept(_) => Verdict::Accept(value.clone()),
            Verdict::Reject { value, .. } => Verdict::Reject { value, kept: None },
        },
    )
}

/// Parameters that survived validation, ready for the pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParams {
    pub filters: IndexMap<String, Vec<String>>,
    pub sorts: IndexMap<String, Order>,
    pub includes: Vec<String>,
    pub fields: IndexMap<String, Vec<String>>,
    pub appends: IndexMap<String, Vec<String>>,
    pub search: Option<String>,
    pub search_filters: IndexMap<String, String>,
    pub page: PageParams,
}

/// Validate every category with its default strategy: includes and search filters are
/// enforced, everything else is filtered silently unless `strict` is set.
///
/// # Errors
///
/// Returns the first [`ApiError::InvalidParameter`] raised by an enforced category.
pub fn validate_all(
    params: &QueryParams,
    rules: &AllowRules,
    strict: bool,
) -> Result<ValidatedParams, ApiError> {
    let silently = ValidationStrategy::FilterSilently.or_strict(strict);
    let enforce = ValidationStrategy::Enforce;

    let search = params.search.clone().filter(|_| rules.search_allowed());
    let search_filters = if rules.search_allowed() {
        validate_search_filters(params, rules, enforce)?
    } else {
        IndexMap::new()
    };

    Ok(ValidatedParams {
        filters: validate_filters(params, rules, silently)?,
        sorts: validate_sorts(params, rules, silently)?,
        includes: validate_includes(params, rules, enforce)?,
        fields: validate_fields(params, rules, silently)?,
        appends: validate_appends(params, rules, silently)?,
        search,
        search_filters,
        page: params.page,
    })
}

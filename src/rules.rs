//! # Allow-rules
//!
//! Developer-declared allow-list entries. Only parameters covered by a rule may affect a
//! query. Rules are registered on a [`AllowRules`] registry per request (or once per route
//! and cloned), merging with any earlier rule for the same key instead of replacing it.
//! There is no removal: an allow-list only grows while it is being configured.

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value as JsonValue, json};
use std::fmt;
use std::str::FromStr;

use crate::errors::RuleError;

/// Comparison applied by a filter rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Substring match (`LIKE %value%`)
    Similar,
    /// Equality (`=`)
    Exact,
    /// Dispatch to a named query scope of the resource
    Scope,
    /// `<`
    LowerThan,
    /// `>`
    GreaterThan,
    /// `<=`
    LowerOrEqual,
    /// `>=`
    GreaterOrEqual,
}

impl FilterOperator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Similar => "similar",
            Self::Exact => "exact",
            Self::Scope => "scope",
            Self::LowerThan => "lt",
            Self::GreaterThan => "gt",
            Self::LowerOrEqual => "lte",
            Self::GreaterOrEqual => "gte",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "similar" | "like" => Ok(Self::Similar),
            "exact" | "equal" | "eq" => Ok(Self::Exact),
            "scope" => Ok(Self::Scope),
            "lt" | "lower_than" => Ok(Self::LowerThan),
            "gt" | "greater_than" => Ok(Self::GreaterThan),
            "lte" | "lower_or_equal" => Ok(Self::LowerOrEqual),
            "gte" | "greater_or_equal" => Ok(Self::GreaterOrEqual),
            _ => Err(RuleError::UnknownOperator(s.to_string())),
        }
    }
}

/// Values a rule accepts.
///
/// `Only` entries containing `*` are glob patterns. When any entry is a pattern the rule
/// is all-or-nothing: every supplied value must match some entry. Otherwise the supplied
/// values are intersected with the entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedValues {
    Any,
    Only(Vec<String>),
}

impl AllowedValues {
    #[must_use]
    pub const fn any() -> Self {
        Self::Any
    }

    pub fn only<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: IndexSet<String> = IndexSet::new();
        for value in values {
            let value = value.into();
            if value == "*" {
                return Self::Any;
            }
            unique.insert(value);
        }
        Self::Only(unique.into_iter().collect())
    }

    /// Whether any entry is a glob pattern.
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        match self {
            Self::Any => false,
            Self::Only(values) => values.iter().any(|v| v.contains('*')),
        }
    }

    /// Union two value sets. `Any` absorbs everything.
    pub fn merge(&mut self, other: Self) {
        match (&mut *self, other) {
            (Self::Any, _) => {}
            (_, Self::Any) => *self = Self::Any,
            (Self::Only(current), Self::Only(extra)) => {
                for value in extra {
                    if !current.contains(&value) {
                        current.push(value);
                    }
                }
            }
        }
    }

    fn describe(&self) -> JsonValue {
        match self {
            Self::Any => json!("*"),
            Self::Only(values) if values.len() == 1 => json!(values[0]),
            Self::Only(values) => json!(values),
        }
    }
}

impl From<&str> for AllowedValues {
    fn from(value: &str) -> Self {
        Self::only([value])
    }
}

impl From<String> for AllowedValues {
    fn from(value: String) -> Self {
        Self::only([value])
    }
}

impl From<Vec<&str>> for AllowedValues {
    fn from(values: Vec<&str>) -> Self {
        Self::only(values)
    }
}

impl From<Vec<String>> for AllowedValues {
    fn from(values: Vec<String>) -> Self {
        Self::only(values)
    }
}

impl<const N: usize> From<[&str; N]> for AllowedValues {
    fn from(values: [&str; N]) -> Self {
        Self::only(values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowFilter {
    pub attribute: String,
    operators: Vec<FilterOperator>,
    pub values: AllowedValues,
}

impl AllowFilter {
    pub fn new(
        attribute: impl Into<String>,
        operator: FilterOperator,
        values: impl Into<AllowedValues>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operators: vec![operator],
            values: values.into(),
        }
    }

    /// Declare a rule with several operators. Only the first one is used when building
    /// predicates.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::MissingOperator`] when `operators` is empty.
    pub fn with_operators(
        attribute: impl Into<String>,
        operators: Vec<FilterOperator>,
        values: impl Into<AllowedValues>,
    ) -> Result<Self, RuleError> {
        let attribute = attribute.into();
        if operators.is_empty() {
            return Err(RuleError::MissingOperator(attribute));
        }
        Ok(Self {
            attribute,
            operators,
            values: values.into(),
        })
    }

    /// Declare a rule from an operator name such as `"exact"` or `"gte"`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownOperator`] for names outside the operator set.
    pub fn parse(
        attribute: impl Into<String>,
        operator: &str,
        values: impl Into<AllowedValues>,
    ) -> Result<Self, RuleError> {
        Ok(Self::new(attribute, operator.parse()?, values))
    }

    pub fn exact(attribute: impl Into<String>, values: impl Into<AllowedValues>) -> Self {
        Self::new(attribute, FilterOperator::Exact, values)
    }

    pub fn similar(attribute: impl Into<String>, values: impl Into<AllowedValues>) -> Self {
        Self::new(attribute, FilterOperator::Similar, values)
    }

    /// Allow `filter[<scope>]=...` to invoke the resource's scope of the same name.
    pub fn scoped(scope: impl Into<String>) -> Self {
        Self::new(scope, FilterOperator::Scope, AllowedValues::Any)
    }

    /// The operator used for building predicates (the first one declared).
    #[must_use]
    pub fn operator(&self) -> FilterOperator {
        self.operators[0]
    }

    #[must_use]
    pub fn operators(&self) -> &[FilterOperator] {
        &self.operators
    }
}

/// Which sort directions a client may request for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Both,
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Both => "*",
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    #[must_use]
    pub fn permits(self, requested: &sea_orm::Order) -> bool {
        match self {
            Self::Both => true,
            Self::Ascending => matches!(requested, sea_orm::Order::Asc),
            Self::Descending => matches!(requested, sea_orm::Order::Desc),
        }
    }

    fn merge(self, other: Self) -> Self {
        if self == other { self } else { Self::Both }
    }
}

impl FromStr for SortDirection {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "*" | "both" => Ok(Self::Both),
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(RuleError::UnknownDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowSort {
    pub attribute: String,
    pub direction: SortDirection,
}

impl AllowSort {
    pub fn new(attribute: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            attribute: attribute.into(),
            direction,
        }
    }

    pub fn both(attribute: impl Into<String>) -> Self {
        Self::new(attribute, SortDirection::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowInclude {
    pub relationship: String,
}

impl AllowInclude {
    pub fn new(relationship: impl Into<String>) -> Self {
        Self {
            relationship: relationship.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowFields {
    pub resource_type: String,
    pub attributes: Vec<String>,
}

impl AllowFields {
    pub fn new<I, S>(resource_type: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_type: resource_type.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowAppends {
    pub resource_type: String,
    pub attributes: Vec<String>,
}

impl AllowAppends {
    pub fn new<I, S>(resource_type: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource_type: resource_type.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowSearchFilter {
    pub attribute: String,
    pub values: AllowedValues,
}

impl AllowSearchFilter {
    pub fn new(attribute: impl Into<String>, values: impl Into<AllowedValues>) -> Self {
        Self {
            attribute: attribute.into(),
            values: values.into(),
        }
    }
}

/// Any allow-rule, for registration through [`AllowRules::allow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowRule {
    Filter(AllowFilter),
    Sort(AllowSort),
    Include(AllowInclude),
    Fields(AllowFields),
    Appends(AllowAppends),
    SearchFilter(AllowSearchFilter),
}

macro_rules! impl_into_allow_rule {
    ($($rule:ident => $variant:ident),+ $(,)?) => {
        $(
            impl From<$rule> for AllowRule {
                fn from(rule: $rule) -> Self {
                    Self::$variant(rule)
                }
            }
        )+
    };
}

impl_into_allow_rule!(
    AllowFilter => Filter,
    AllowSort => Sort,
    AllowInclude => Include,
    AllowFields => Fields,
    AllowAppends => Appends,
    AllowSearchFilter => SearchFilter,
);

fn merge_names(current: &mut Vec<String>, extra: Vec<String>) {
    for name in extra {
        if !current.contains(&name) {
            current.push(name);
        }
    }
}

/// Allow-list registry, keyed per category by attribute, relationship or resource type.
#[derive(Debug, Clone, Default)]
pub struct AllowRules {
    filters: IndexMap<String, AllowFilter>,
    sorts: IndexMap<String, AllowSort>,
    includes: IndexMap<String, AllowInclude>,
    fields: IndexMap<String, AllowFields>,
    appends: IndexMap<String, AllowAppends>,
    search_filters: IndexMap<String, AllowSearchFilter>,
    search: bool,
}

impl AllowRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&mut self, rule: impl Into<AllowRule>) -> &mut Self {
        match rule.into() {
            AllowRule::Filter(rule) => self.allow_filter(rule),
            AllowRule::Sort(rule) => self.allow_sort(rule),
            AllowRule::Include(rule) => self.allow_include(rule),
            AllowRule::Fields(rule) => self.allow_fields(rule),
            AllowRule::Appends(rule) => self.allow_appends(rule),
            AllowRule::SearchFilter(rule) => self.allow_search_filter(rule),
        }
    }

    /// Register a filter. A rule already present for the attribute keeps its operators
    /// and gains the new values.
    pub fn allow_filter(&mut self, rule: AllowFilter) -> &mut Self {
        match self.filters.get_mut(&rule.attribute) {
            Some(existing) => existing.values.merge(rule.values),
            None => {
                self.filters.insert(rule.attribute.clone(), rule);
            }
        }
        self
    }

    pub fn allow_sort(&mut self, rule: AllowSort) -> &mut Self {
        match self.sorts.get_mut(&rule.attribute) {
            Some(existing) => existing.direction = existing.direction.merge(rule.direction),
            None => {
                self.sorts.insert(rule.attribute.clone(), rule);
            }
        }
        self
    }

    pub fn allow_include(&mut self, rule: AllowInclude) -> &mut Self {
        self.includes.entry(rule.relationship.clone()).or_insert(rule);
        self
    }

    pub fn allow_fields(&mut self, rule: AllowFields) -> &mut Self {
        match self.fields.get_mut(&rule.resource_type) {
            Some(existing) => merge_names(&mut existing.attributes, rule.attributes),
            None => {
                self.fields.insert(rule.resource_type.clone(), rule);
            }
        }
        self
    }

    pub fn allow_appends(&mut self, rule: AllowAppends) -> &mut Self {
        match self.appends.get_mut(&rule.resource_type) {
            Some(existing) => merge_names(&mut existing.attributes, rule.attributes),
            None => {
                self.appends.insert(rule.resource_type.clone(), rule);
            }
        }
        self
    }

    pub fn allow_search_filter(&mut self, rule: AllowSearchFilter) -> &mut Self {
        match self.search_filters.get_mut(&rule.attribute) {
            Some(existing) => existing.values.merge(rule.values),
            None => {
                self.search_filters.insert(rule.attribute.clone(), rule);
            }
        }
        self
    }

    /// Enable full-text search for this request.
    pub fn allow_search(&mut self, allowed: bool) -> &mut Self {
        self.search = allowed;
        self
    }

    #[must_use]
    pub fn filters(&self) -> &IndexMap<String, AllowFilter> {
        &self.filters
    }

    #[must_use]
    pub fn sorts(&self) -> &IndexMap<String, AllowSort> {
        &self.sorts
    }

    #[must_use]
    pub fn includes(&self) -> &IndexMap<String, AllowInclude> {
        &self.includes
    }

    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, AllowFields> {
        &self.fields
    }

    #[must_use]
    pub fn appends(&self) -> &IndexMap<String, AllowAppends> {
        &self.appends
    }

    #[must_use]
    pub fn search_filters(&self) -> &IndexMap<String, AllowSearchFilter> {
        &self.search_filters
    }

    #[must_use]
    pub fn search_allowed(&self) -> bool {
        self.search
    }

    /// `{attribute: {operator: values}}`, as exposed in `meta.allowed_filters`.
    #[must_use]
    pub fn describe_filters(&self) -> JsonValue {
        let described: Map<String, JsonValue> = self
            .filters
            .values()
            .map(|rule| {
                let mut entry = Map::new();
                entry.insert(rule.operator().to_string(), rule.values.describe());
                (rule.attribute.clone(), JsonValue::Object(entry))
            })
            .collect();
        JsonValue::Object(described)
    }

    /// `{attribute: direction}`, as exposed in `meta.allowed_sorts`.
    #[must_use]
    pub fn describe_sorts(&self) -> JsonValue {
        let described: Map<String, JsonValue> = self
            .sorts
            .values()
            .map(|rule| (rule.attribute.clone(), json!(rule.direction.as_str())))
            .collect();
        JsonValue::Object(described)
    }
}

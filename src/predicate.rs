//! Translate one allowed filter into query clauses.
//!
//! The builder is pure: it only describes the clauses, the filter stage hands them to the
//! [`QueryBuilder`](crate::query::QueryBuilder). Multiple values for one attribute are
//! OR-ed together: the first clause is joined with AND, every following one with OR, and
//! the filter stage wraps the group in its own parenthesized block so the ORs never leak
//! into the surrounding conditions.

use crate::rules::FilterOperator;

/// How a clause joins the clauses before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

/// SQL comparison emitted for a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    Like,
    LowerThan,
    GreaterThan,
    LowerOrEqual,
    GreaterOrEqual,
}

impl Comparator {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Like => "LIKE",
            Self::LowerThan => "<",
            Self::GreaterThan => ">",
            Self::LowerOrEqual => "<=",
            Self::GreaterOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub column: String,
    pub comparator: Comparator,
    pub value: String,
    pub boolean: Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseSpec {
    /// Plain column comparisons, one per value.
    Compare(Vec<Comparison>),
    /// Dispatch to the named scope with all values at once.
    Scope { name: String, values: Vec<String> },
}

/// Escape LIKE wildcards so user input matches literally.
#[must_use]
pub fn escape_like_wildcards(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Build the clauses for `column` filtered by `operator` over `values`.
#[must_use]
pub fn build(column: &str, operator: FilterOperator, values: &[String]) -> ClauseSpec {
    let comparator = match operator {
        FilterOperator::Scope => {
            return ClauseSpec::Scope {
                name: column.to_string(),
                values: values.to_vec(),
            };
        }
        FilterOperator::Similar => Comparator::Like,
        FilterOperator::Exact => Comparator::Equal,
        FilterOperator::LowerThan => Comparator::LowerThan,
        FilterOperator::GreaterThan => Comparator::GreaterThan,
        FilterOperator::LowerOrEqual => Comparator::LowerOrEqual,
        FilterOperator::GreaterOrEqual => Comparator::GreaterOrEqual,
    };

    let comparisons = values
        .iter()
        .enumerate()
        .map(|(index, value)| Comparison {
            column: column.to_string(),
            comparator,
            value: if comparator == Comparator::Like {
                format!("%{}%", escape_like_wildcards(value))
            } else {
                value.clone()
            },
            boolean: if index == 0 { Boolean::And } else { Boolean::Or },
        })
        .collect();

    ClauseSpec::Compare(comparisons)
}

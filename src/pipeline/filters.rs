use crate::predicate::{self, Boolean, ClauseSpec};
use crate::query::QueryBuilder;
use crate::rules::FilterOperator;

use super::{Stage, StageContext};

/// Applies `filter[...]` parameters.
///
/// Each attribute becomes one parenthesized group, AND-joined with the other attributes.
/// `author.name` is applied inside an existence constraint on the `author` relationship.
/// Attributes that name a scope of the resource dispatch to it with all their values.
pub struct ApplyFilters;

impl Stage for ApplyFilters {
    fn apply(&self, ctx: &StageContext<'_>, query: &mut dyn QueryBuilder) {
        for (attribute, values) in &ctx.params.filters {
            let Some(rule) = ctx.rules.filters().get(attribute) else {
                continue;
            };
            apply_filter(query, attribute, rule.operator(), values);
        }
    }
}

fn apply_filter(
    query: &mut dyn QueryBuilder,
    path: &str,
    operator: FilterOperator,
    values: &[String],
) {
    if let Some((relation, rest)) = path.split_once('.') {
        if query.resource().get_relation(relation).is_some() {
            query.where_has(relation, Boolean::And, &mut |related: &mut dyn QueryBuilder| {
                apply_filter(related, rest, operator, values);
            });
            return;
        }
    }

    let operator = if operator != FilterOperator::Scope
        && !query.resource().has_column(path)
        && query.resource().get_scope(path).is_some()
    {
        FilterOperator::Scope
    } else {
        operator
    };

    match predicate::build(path, operator, values) {
        ClauseSpec::Scope { name, values } => {
            let scope = query.resource().get_scope(&name).cloned();
            match scope {
                Some(scope) => {
                    tracing::debug!(
                        resource = %query.resource().model(),
                        scope = %name,
                        "Applying filter scope",
                    );
                    scope(query, &values);
                }
                None => {
                    tracing::warn!(
                        resource = %query.resource().model(),
                        scope = %name,
                        "Filter names a scope the resource does not declare",
                    );
                }
            }
        }
        ClauseSpec::Compare(comparisons) => {
            if !query.resource().has_column(path) {
                tracing::debug!(
                    resource = %query.resource().model(),
                    attribute = path,
                    "Skipping filter on undeclared column",
                );
                return;
            }
            query.where_nested(Boolean::And, &mut |group: &mut dyn QueryBuilder| {
                for comparison in &comparisons {
                    group.where_clause(
                        &comparison.column,
                        comparison.comparator,
                        &comparison.value,
                        comparison.boolean,
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::posts;
    use crate::rules::{AllowFilter, AllowRules};
    use crate::validator::ValidatedParams;
    use sea_orm::DbBackend;

    fn run(rules: &AllowRules, filters: &[(&str, &[&str])]) -> String {
        let mut params = ValidatedParams::default();
        for (attribute, values) in filters {
            params.filters.insert(
                (*attribute).to_string(),
                values.iter().map(ToString::to_string).collect(),
            );
        }
        let mut query = posts();
        ApplyFilters.apply(
            &StageContext {
                params: &params,
                rules,
            },
            &mut query,
        );
        query.to_sql(DbBackend::Sqlite)
    }

    #[test]
    fn test_same_attribute_or_across_attributes_and() {
        let mut rules = AllowRules::new();
        rules
            .allow_filter(AllowFilter::exact("status", ["Active", "Pending"]))
            .allow_filter(AllowFilter::exact("views", "*"));

        let sql = run(&rules, &[("status", &["Active", "Pending"]), ("views", &["10"])]);
        let expected = concat!(
            r#"("posts"."status" = 'Active' OR "posts"."status" = 'Pending') "#,
            r#"AND "posts"."views" = 10"#
        );
        assert!(sql.contains(expected), "{sql}");
    }

    #[test]
    fn test_similar_filter() {
        let mut rules = AllowRules::new();
        rules.allow_filter(AllowFilter::similar("title", "*"));
        let sql = run(&rules, &[("title", &["rust"])]);
        assert!(sql.contains(r#""posts"."title" LIKE '%rust%'"#), "{sql}");
    }

    #[test]
    fn test_relationship_path_uses_exists() {
        let mut rules = AllowRules::new();
        rules.allow_filter(AllowFilter::exact("author.name", "*"));
        let sql = run(&rules, &[("author.name", &["Jane"])]);
        assert!(sql.contains("EXISTS"), "{sql}");
        assert!(sql.contains(r#""posts_author"."name" = 'Jane'"#), "{sql}");
    }

    #[test]
    fn test_scope_dispatch_by_camel_case() {
        let mut rules = AllowRules::new();
        rules.allow_filter(AllowFilter::scoped("is_published"));
        let sql = run(&rules, &[("is_published", &["1"])]);
        assert!(sql.contains(r#""posts"."status" = 'Published'"#), "{sql}");
    }

    #[test]
    fn test_missing_scope_is_skipped() {
        let mut rules = AllowRules::new();
        rules.allow_filter(AllowFilter::scoped("trending"));
        let sql = run(&rules, &[("trending", &["1"])]);
        assert!(!sql.contains("WHERE"), "{sql}");
    }

    #[test]
    fn test_unruled_attribute_is_ignored() {
        let rules = AllowRules::new();
        let sql = run(&rules, &[("status", &["Active"])]);
        assert!(!sql.contains("WHERE"), "{sql}");
    }

    #[test]
    fn test_undeclared_column_is_skipped() {
        let mut rules = AllowRules::new();
        rules.allow_filter(AllowFilter::exact("password", "*"));
        let sql = run(&rules, &[("password", &["x"])]);
        assert!(!sql.contains("WHERE"), "{sql}");
    }
}

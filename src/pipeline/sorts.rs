use crate::query::QueryBuilder;

use super::{Stage, StageContext};

/// Applies one ORDER BY per validated sort, in parsed order. `author.name` orders by a
/// column of a to-one relationship.
pub struct ApplySorts;

impl Stage for ApplySorts {
    fn apply(&self, ctx: &StageContext<'_>, query: &mut dyn QueryBuilder) {
        for (attribute, order) in &ctx.params.sorts {
            match attribute.split_once('.') {
                Some((relation, column)) => {
                    if !query.order_by_related(relation, column, order.clone()) {
                        tracing::debug!(
                            sort = %attribute,
                            "Skipping sort on an unsupported relationship",
                        );
                    }
                }
                None if query.resource().has_column(attribute) => {
                    query.order_by(attribute, order.clone());
                }
                None => {
                    tracing::debug!(sort = %attribute, "Skipping sort on undeclared column");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::posts;
    use crate::rules::AllowRules;
    use crate::validator::ValidatedParams;
    use sea_orm::{DbBackend, Order};

    #[test]
    fn test_sorts_apply_in_order() {
        let mut params = ValidatedParams::default();
        params.sorts.insert("status".to_string(), Order::Asc);
        params.sorts.insert("views".to_string(), Order::Desc);
        params.sorts.insert("secret".to_string(), Order::Desc);
        let rules = AllowRules::new();

        let mut query = posts();
        ApplySorts.apply(&StageContext { params: &params, rules: &rules }, &mut query);
        assert_eq!(
            query.to_sql(DbBackend::Sqlite),
            r#"SELECT "posts".* FROM "posts" ORDER BY "posts"."status" ASC, "posts"."views" DESC"#
        );
    }

    #[test]
    fn test_relationship_sort() {
        let mut params = ValidatedParams::default();
        params.sorts.insert("author.name".to_string(), Order::Asc);
        params.sorts.insert("comments.body".to_string(), Order::Asc);
        let rules = AllowRules::new();

        let mut query = posts();
        ApplySorts.apply(&StageContext { params: &params, rules: &rules }, &mut query);
        let sql = query.to_sql(DbBackend::Sqlite);
        assert!(sql.contains(r#"FROM "users" AS "posts_author_sort""#), "{sql}");
        assert!(!sql.contains("comments"), "{sql}");
    }
}

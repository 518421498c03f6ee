use crate::query::QueryBuilder;
use crate::schema::Resource;

use super::{Stage, StageContext};

/// Applies sparse fieldsets.
///
/// The root query always selects `table.*`. `fields[type]` narrows the root when `type` is
/// the root resource type, and narrows an eager load when `type` is its include path or its
/// resource type. The primary key is always kept, undeclared columns are dropped.
pub struct ApplyFields;

fn narrowed(resource: &Resource, requested: &[String]) -> Vec<String> {
    let key = resource.key_name();
    let mut columns = vec![key.to_string()];
    columns.extend(
        requested
            .iter()
            .filter(|column| column.as_str() != key && resource.has_column(column))
            .cloned(),
    );
    columns
}

impl Stage for ApplyFields {
    fn apply(&self, ctx: &StageContext<'_>, query: &mut dyn QueryBuilder) {
        query.select(&[]);

        for (resource_type, requested) in &ctx.params.fields {
            if query.resource().resource_type() == resource_type.as_str() {
                let columns = narrowed(query.resource(), requested);
                query.select(&columns);
                continue;
            }

            for path in query.eager_loads() {
                query.with(&path, &mut |related: &mut dyn QueryBuilder| {
                    if path == *resource_type
                        || related.resource().resource_type() == resource_type.as_str()
                    {
                        let columns = narrowed(related.resource(), requested);
                        related.select(&columns);
                    }
                });
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
    use sea_orm::DbBackend;

    fn fields(entries: &[(&str, &[&str])]) -> ValidatedParams {
        let mut params = ValidatedParams::default();
        for (resource_type, columns) in entries {
            params.fields.insert(
                (*resource_type).to_string(),
                columns.iter().map(ToString::to_string).collect(),
            );
        }
        params
    }

    #[test]
    fn test_root_narrowing_forces_primary_key() {
        let params = fields(&[("post", &["title", "nope"])]);
        let rules = AllowRules::new();

        let mut query = posts();
        ApplyFields.apply(&StageContext { params: &params, rules: &rules }, &mut query);
        assert_eq!(
            query.to_sql(DbBackend::Sqlite),
            r#"SELECT "posts"."id", "posts"."title" FROM "posts""#
        );
    }

    #[test]
    fn test_included_narrowing() {
        let params = fields(&[("user", &["name"])]);
        let rules = AllowRules::new();

        let mut query = posts();
        query.with("author", &mut |_: &mut dyn QueryBuilder| {});
        ApplyFields.apply(&StageContext { params: &params, rules: &rules }, &mut query);

        assert_eq!(query.columns(), &[] as &[String]);
        assert_eq!(query.eager()["author"].columns(), &["id", "name"]);
    }

    #[test]
    fn test_unrelated_type_is_ignored() {
        let params = fields(&[("tag", &["label"])]);
        let rules = AllowRules::new();

        let mut query = posts();
        ApplyFields.apply(&StageContext { params: &params, rules: &rules }, &mut query);
        assert_eq!(
            query.to_sql(DbBackend::Sqlite),
            r#"SELECT "posts".* FROM "posts""#
        );
    }
}

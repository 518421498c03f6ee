use crate::query::QueryBuilder;

use super::{Stage, StageContext};

/// Applies the `q`/`search` term through the resource's search capability, constraining the
/// query to the matched primary keys.
pub struct ApplySearch;

impl Stage for ApplySearch {
    fn apply(&self, ctx: &StageContext<'_>, query: &mut dyn QueryBuilder) {
        if !ctx.rules.search_allowed() {
            return;
        }
        let Some(term) = ctx.params.search.as_deref() else {
            return;
        };
        let Some(engine) = query.resource().search_engine().cloned() else {
            tracing::debug!(
                resource = %query.resource().model(),
                "Search requested on a resource without a search capability",
            );
            return;
        };

        let keys = engine.search(term, &ctx.params.search_filters);
        tracing::debug!(term, matches = keys.len(), "Applying search");
        query.where_key_in(&keys);
    }
}

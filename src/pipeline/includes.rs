use crate::query::QueryBuilder;

use super::{Stage, StageContext};

/// Eager-loads every validated `include` path.
pub struct ApplyIncludes;

impl Stage for ApplyIncludes {
    fn apply(&self, ctx: &StageContext<'_>, query: &mut dyn QueryBuilder) {
        for path in &ctx.params.includes {
            if !query.with(path, &mut |_: &mut dyn QueryBuilder| {}) {
                tracing::debug!(
                    resource = %query.resource().model(),
                    include = %path,
                    "Skipping include of an unknown relationship",
                );
            }
        }
    }
}

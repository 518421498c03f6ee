//! # Query Pipeline
//!
//! Ordered stages that apply validated parameters to a [`QueryBuilder`]. Each stage reads
//! one parameter family and mutates the query; a stage with nothing to do leaves the query
//! untouched. Stages never fail: anything invalid was dropped or rejected by the validator.
//!
//! The default order is significant:
//!
//! 1. [`ApplyFilters`] so later stages never load rows the filters exclude
//! 2. [`ApplySearch`] which AND-combines the matched keys with the filters
//! 3. [`ApplyIncludes`] so the fields stage can narrow eager loads
//! 4. [`ApplyFields`]
//! 5. [`ApplySorts`] last, after any relationship setup

mod fields;
mod filters;
mod includes;
mod search;
mod sorts;

pub use fields::ApplyFields;
pub use filters::ApplyFilters;
pub use includes::ApplyIncludes;
pub use search::ApplySearch;
pub use sorts::ApplySorts;

use crate::query::QueryBuilder;
use crate::rules::AllowRules;
use crate::validator::ValidatedParams;

/// What every stage gets to read.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub params: &'a ValidatedParams,
    pub rules: &'a AllowRules,
}

pub trait Stage: Send + Sync {
    fn apply(&self, ctx: &StageContext<'_>, query: &mut dyn QueryBuilder);
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::empty()
            .through(ApplyFilters)
            .through(ApplySearch)
            .through(ApplyIncludes)
            .through(ApplyFields)
            .through(ApplySorts)
    }
}

impl Pipeline {
    /// A pipeline with no stages.
    #[must_use]
    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage.
    #[must_use]
    pub fn through(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn run(&self, ctx: &StageContext<'_>, query: &mut dyn QueryBuilder) {
        for stage in &self.stages {
            stage.apply(ctx, query);
        }
    }
}

//! # Query Builder
//!
//! [`QueryBuilder`] is the collaborator the pipeline stages talk to. It knows nothing about
//! query strings: stages hand it column comparisons, nested groups, relationship
//! constraints, eager loads, selections and orderings.
//!
//! [`ResourceQuery`] is the concrete builder. It records clauses against a registered
//! [`Resource`] and renders them into a `sea_query` SELECT when executed:
//!
//! - clauses fold left to right, each one joining the previous result with its own
//!   AND/OR connective, nested groups render parenthesized
//! - relationship constraints become correlated `EXISTS (...)` sub-selects
//! - eager loads are separate queries keyed by relationship name, run by the executor
//! - ordering by a to-one relationship column uses a correlated scalar sub-select

use indexmap::IndexMap;
use sea_orm::sea_query::{
    Alias, Asterisk, Condition, Expr, Func, LikeExpr, Query, QueryStatementBuilder,
    SelectStatement, SimpleExpr,
};
use sea_orm::{DbBackend, Order, Statement, Value};
use std::sync::Arc;

use crate::predicate::{Boolean, Comparator};
use crate::schema::{Relation, Resource, Schema};

/// Mutating view of a query under construction.
pub trait QueryBuilder {
    /// Descriptor of the entity being queried.
    fn resource(&self) -> &Resource;

    /// Restrict the selected columns. An empty list selects `table.*`.
    fn select(&mut self, columns: &[String]);

    fn where_clause(&mut self, column: &str, comparator: Comparator, value: &str, boolean: Boolean);

    /// Group the clauses added by `build` in one parenthesized block. Only where clauses
    /// added inside the block are kept.
    fn where_nested(&mut self, boolean: Boolean, build: &mut dyn FnMut(&mut dyn QueryBuilder));

    /// Require at least one related row matching the clauses added by `build`. A `build`
    /// that adds no clauses leaves the query unchanged. Returns `false` when the
    /// relationship is unknown.
    fn where_has(
        &mut self,
        relation: &str,
        boolean: Boolean,
        build: &mut dyn FnMut(&mut dyn QueryBuilder),
    ) -> bool;

    /// Restrict to rows whose primary key is one of `keys`.
    fn where_key_in(&mut self, keys: &[String]);

    /// Eager-load a relationship, or a dot-separated chain of them, and let `constrain`
    /// adjust the innermost related query. Loading an already loaded path only applies the
    /// constraint. Returns `false` when a segment is not a known relationship.
    fn with(&mut self, path: &str, constrain: &mut dyn FnMut(&mut dyn QueryBuilder)) -> bool;

    /// Dot-joined paths of every relationship currently eager-loaded.
    fn eager_loads(&self) -> Vec<String>;

    fn order_by(&mut self, column: &str, order: Order);

    /// Order by a column of a to-one relationship. Returns `false` when the relationship is
    /// unknown or to-many, or when the related resource has no such column.
    fn order_by_related(&mut self, relation: &str, column: &str, order: Order) -> bool;
}

#[derive(Debug, Clone)]
enum Clause {
    Compare {
        column: String,
        comparator: Comparator,
        value: Value,
        boolean: Boolean,
    },
    In {
        column: String,
        values: Vec<Value>,
        boolean: Boolean,
    },
    Nested {
        clauses: Vec<Clause>,
        boolean: Boolean,
    },
    Has {
        relation: Relation,
        query: Box<ResourceQuery>,
        boolean: Boolean,
    },
}

#[derive(Debug, Clone)]
enum Ordering {
    Column(String, Order),
    Related {
        relation: Relation,
        table: String,
        column: String,
        order: Order,
    },
}

fn column_ref(alias: &str, column: &str) -> Expr {
    Expr::col((Alias::new(alias), Alias::new(column)))
}

impl Clause {
    fn boolean(&self) -> Boolean {
        match self {
            Self::Compare { boolean, .. }
            | Self::In { boolean, .. }
            | Self::Nested { boolean, .. }
            | Self::Has { boolean, .. } => *boolean,
        }
    }

    fn render(&self, alias: &str) -> Option<Condition> {
        let expr: SimpleExpr = match self {
            Self::Compare {
                column,
                comparator,
                value,
                ..
            } => {
                let col = column_ref(alias, column);
                let value = value.clone();
                match comparator {
                    Comparator::Equal => col.eq(value),
                    Comparator::LowerThan => col.lt(value),
                    Comparator::GreaterThan => col.gt(value),
                    Comparator::LowerOrEqual => col.lte(value),
                    Comparator::GreaterOrEqual => col.gte(value),
                    Comparator::Like => col.like(LikeExpr::new(value_text(&value)).escape('\\')),
                }
            }
            Self::In { column, values, .. } => column_ref(alias, column).is_in(values.clone()),
            Self::Nested { clauses, .. } => return fold(alias, clauses),
            Self::Has {
                relation, query, ..
            } => {
                let link = column_ref(&query.alias, &relation.related_key)
                    .equals((Alias::new(alias), Alias::new(&relation.parent_key)));
                let mut condition = Condition::all().add(link);
                if let Some(inner) = fold(&query.alias, &query.clauses) {
                    condition = condition.add(inner);
                }

                let mut exists = Query::select();
                exists
                    .expr(Expr::val(1))
                    .from_as(
                        Alias::new(query.resource.table()),
                        Alias::new(&query.alias),
                    )
                    .cond_where(condition);
                Expr::exists(exists)
            }
        };
        Some(Condition::all().add(expr))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(Some(text)) => text.to_string(),
        _ => String::new(),
    }
}

/// Fold clauses left to right: `((a AND b) OR c) AND d`.
fn fold(alias: &str, clauses: &[Clause]) -> Option<Condition> {
    let mut folded: Option<Condition> = None;
    for clause in clauses {
        let Some(condition) = clause.render(alias) else {
            continue;
        };
        folded = Some(match folded {
            None => condition,
            Some(previous) => match clause.boolean() {
                Boolean::And => Condition::all().add(previous).add(condition),
                Boolean::Or => Condition::any().add(previous).add(condition),
            },
        });
    }
    folded
}

/// Query over one registered resource.
#[derive(Debug, Clone)]
pub struct ResourceQuery {
    schema: Arc<Schema>,
    resource: Arc<Resource>,
    alias: String,
    columns: Vec<String>,
    clauses: Vec<Clause>,
    eager: IndexMap<String, ResourceQuery>,
    orders: Vec<Ordering>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl ResourceQuery {
    #[must_use]
    pub fn new(schema: Arc<Schema>, resource: Arc<Resource>) -> Self {
        Self {
            alias: resource.table().to_string(),
            schema,
            resource,
            columns: Vec::new(),
            clauses: Vec::new(),
            eager: IndexMap::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Empty query over the same resource and alias, used to collect grouped clauses.
    fn scratch(&self) -> Self {
        let mut query = Self::new(Arc::clone(&self.schema), Arc::clone(&self.resource));
        query.alias.clone_from(&self.alias);
        query
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn shared_resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Columns the executor should decode: the explicit selection, or every declared column.
    #[must_use]
    pub fn selected_columns(&self) -> Vec<String> {
        if self.columns.is_empty() {
            self.resource.columns().keys().cloned().collect()
        } else {
            self.columns.clone()
        }
    }

    /// Explicit selection, empty when selecting `table.*`.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Make sure `column` is selected. Returns `true` when it had to be added.
    pub fn ensure_selected(&mut self, column: &str) -> bool {
        if self.columns.is_empty() || self.columns.iter().any(|c| c == column) {
            return false;
        }
        self.columns.push(column.to_string());
        true
    }

    #[must_use]
    pub fn eager(&self) -> &IndexMap<String, ResourceQuery> {
        &self.eager
    }

    /// Restrict `column` to `values`, AND-joined with everything else.
    pub fn where_in(&mut self, column: &str, values: Vec<Value>) {
        self.clauses.push(Clause::In {
            column: column.to_string(),
            values,
            boolean: Boolean::And,
        });
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn select_statement(&self) -> SelectStatement {
        let table = Alias::new(self.resource.table());
        let alias = Alias::new(&self.alias);

        let mut stmt = Query::select();
        if self.alias == self.resource.table() {
            stmt.from(table);
        } else {
            stmt.from_as(table, alias.clone());
        }

        if self.columns.is_empty() {
            stmt.column((alias, Asterisk));
        } else {
            for column in &self.columns {
                stmt.column((Alias::new(&self.alias), Alias::new(column)));
            }
        }

        if let Some(condition) = fold(&self.alias, &self.clauses) {
            stmt.cond_where(condition);
        }

        for ordering in &self.orders {
            match ordering {
                Ordering::Column(column, order) => {
                    stmt.order_by((Alias::new(&self.alias), Alias::new(column)), order.clone());
                }
                Ordering::Related {
                    relation,
                    table,
                    column,
                    order,
                } => {
                    let sort_alias = format!("{}_{}_sort", self.alias, relation.name);
                    let mut sub = Query::select();
                    sub.column((Alias::new(&sort_alias), Alias::new(column)))
                        .from_as(Alias::new(table), Alias::new(&sort_alias))
                        .and_where(
                            column_ref(&sort_alias, &relation.related_key).equals((
                                Alias::new(&self.alias),
                                Alias::new(&relation.parent_key),
                            )),
                        )
                        .limit(1);
                    stmt.order_by_expr(
                        SimpleExpr::SubQuery(None, Box::new(sub.into_sub_query_statement())),
                        order.clone(),
                    );
                }
            }
        }

        if let Some(limit) = self.limit {
            stmt.limit(limit);
        }
        if let Some(offset) = self.offset {
            stmt.offset(offset);
        }
        stmt
    }

    /// `SELECT COUNT(*)` over the filtered rows, ignoring ordering and paging.
    #[must_use]
    pub fn count_statement(&self) -> SelectStatement {
        let mut inner = self.clone();
        inner.orders.clear();
        inner.eager.clear();
        inner.limit = None;
        inner.offset = None;
        inner.columns = vec![self.resource.key_name().to_string()];

        let mut stmt = Query::select();
        stmt.expr_as(Func::count(Expr::col(Asterisk)), Alias::new("aggregate"))
            .from_subquery(inner.select_statement(), Alias::new("aggregate_table"));
        stmt
    }

    #[must_use]
    pub fn build(&self, backend: DbBackend) -> Statement {
        backend.build(&self.select_statement())
    }

    /// SQL with values inlined, for logging and assertions.
    #[must_use]
    pub fn to_sql(&self, backend: DbBackend) -> String {
        self.build(backend).to_string()
    }
}

impl QueryBuilder for ResourceQuery {
    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn select(&mut self, columns: &[String]) {
        self.columns = columns.to_vec();
    }

    fn where_clause(
        &mut self,
        column: &str,
        comparator: Comparator,
        value: &str,
        boolean: Boolean,
    ) {
        let value = if comparator == Comparator::Like {
            Value::from(value.to_string())
        } else {
            self.resource.cast(column, value)
        };
        self.clauses.push(Clause::Compare {
            column: column.to_string(),
            comparator,
            value,
            boolean,
        });
    }

    fn where_nested(&mut self, boolean: Boolean, build: &mut dyn FnMut(&mut dyn QueryBuilder)) {
        let mut nested = self.scratch();
        build(&mut nested);
        if !nested.clauses.is_empty() {
            self.clauses.push(Clause::Nested {
                clauses: nested.clauses,
                boolean,
            });
        }
    }

    fn where_has(
        &mut self,
        relation: &str,
        boolean: Boolean,
        build: &mut dyn FnMut(&mut dyn QueryBuilder),
    ) -> bool {
        let Some(relation) = self.resource.get_relation(relation).cloned() else {
            tracing::debug!(
                resource = %self.resource.model(),
                relation,
                "Unknown relationship in filter",
            );
            return false;
        };
        let Ok(related) = self.schema.resource(&relation.related).cloned() else {
            tracing::warn!(
                related = %relation.related,
                "Relationship points at an unregistered resource",
            );
            return false;
        };

        let mut nested = Self::new(Arc::clone(&self.schema), related);
        nested.alias = format!("{}_{}", self.alias, relation.name);
        build(&mut nested);
        if nested.clauses.is_empty() {
            return true;
        }

        self.clauses.push(Clause::Has {
            relation,
            query: Box::new(nested),
            boolean,
        });
        true
    }

    fn where_key_in(&mut self, keys: &[String]) {
        let key_name = self.resource.key_name().to_string();
        let values = keys
            .iter()
            .map(|key| self.resource.cast(&key_name, key))
            .collect();
        self.where_in(&key_name, values);
    }

    fn with(&mut self, path: &str, constrain: &mut dyn FnMut(&mut dyn QueryBuilder)) -> bool {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        if !self.eager.contains_key(head) {
            let Some(relation) = self.resource.get_relation(head) else {
                tracing::debug!(
                    resource = %self.resource.model(),
                    relation = head,
                    "Unknown relationship in include",
                );
                return false;
            };
            let Ok(related) = self.schema.resource(&relation.related) else {
                tracing::warn!(
                    related = %relation.related,
                    "Relationship points at an unregistered resource",
                );
                return false;
            };
            let related = Self::new(Arc::clone(&self.schema), Arc::clone(related));
            self.eager.insert(head.to_string(), related);
        }

        let Some(related) = self.eager.get_mut(head) else {
            return false;
        };
        match rest {
            Some(rest) => related.with(rest, constrain),
            None => {
                constrain(related);
                true
            }
        }
    }

    fn eager_loads(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for (name, related) in &self.eager {
            paths.push(name.clone());
            paths.extend(
                related
                    .eager_loads()
                    .into_iter()
                    .map(|nested| format!("{name}.{nested}")),
            );
        }
        paths
    }

    fn order_by(&mut self, column: &str, order: Order) {
        self.orders.push(Ordering::Column(column.to_string(), order));
    }

    fn order_by_related(&mut self, relation: &str, column: &str, order: Order) -> bool {
        let Some(relation) = self.resource.get_relation(relation).cloned() else {
            return false;
        };
        if relation.is_to_many() {
            tracing::debug!(
                relation = %relation.name,
                "Sorting by a to-many relationship is not supported",
            );
            return false;
        }
        let Ok(related) = self.schema.resource(&relation.related) else {
            return false;
        };
        if !related.has_column(column) {
            tracing::debug!(
                relation = %relation.name,
                column,
                "Sorting by an undeclared related column",
            );
            return false;
        }

        self.orders.push(Ordering::Related {
            table: related.table().to_string(),
            relation,
            column: column.to_string(),
            order,
        });
        true
    }
}

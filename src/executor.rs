//! # Query Execution
//!
//! Runs a [`ResourceQuery`] against a `sea-orm` connection and decodes the rows into
//! [`Entity`] values, then eager-loads every requested relationship with one extra query
//! per relationship level (`WHERE related_key IN (...)`).
//!
//! Key columns needed to match related rows are selected even when a sparse fieldset left
//! them out; they are stripped again before the entities are returned, together with the
//! resource's hidden columns.

use indexmap::IndexSet;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, QueryResult};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use crate::entity::{Entity, Related, key_string};
use crate::query::{QueryBuilder, ResourceQuery};
use crate::schema::{FieldType, Relation, Resource};

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Entity>, DbErr>> + Send + 'a>>;

fn decode(row: &QueryResult, resource: &Resource, columns: &[String]) -> Result<Entity, DbErr> {
    let mut entity = Entity::new(resource.model()).with_key_name(resource.key_name());
    for column in columns {
        let value = match resource.field_type(column) {
            FieldType::Text => row
                .try_get::<Option<String>>("", column)?
                .map(JsonValue::from),
            FieldType::Integer => row.try_get::<Option<i64>>("", column)?.map(JsonValue::from),
            FieldType::Float => row.try_get::<Option<f64>>("", column)?.map(JsonValue::from),
            FieldType::Boolean => row.try_get::<Option<bool>>("", column)?.map(JsonValue::from),
            FieldType::Uuid => row
                .try_get::<Option<Uuid>>("", column)?
                .map(|uuid| JsonValue::from(uuid.to_string())),
            FieldType::Json => row.try_get::<Option<JsonValue>>("", column)?,
        };
        entity.set(column.as_str(), value.unwrap_or(JsonValue::Null));
    }
    Ok(entity)
}

/// Load rows and relationships, keeping every column that was read.
fn load<'a>(db: &'a DatabaseConnection, query: &'a ResourceQuery) -> LoadFuture<'a> {
    Box::pin(async move {
        let mut root = query.clone();
        for name in query.eager().keys() {
            if let Some(relation) = query.resource().get_relation(name) {
                root.ensure_selected(&relation.parent_key);
            }
        }

        let statement = root.build(db.get_database_backend());
        tracing::debug!(
            resource = %query.resource().model(),
            sql = %statement,
            "Executing resource query",
        );

        let columns = root.selected_columns();
        let mut entities = db
            .query_all(statement)
            .await?
            .iter()
            .map(|row| decode(row, root.resource(), &columns))
            .collect::<Result<Vec<_>, DbErr>>()?;

        for (name, nested) in query.eager() {
            let Some(relation) = query.resource().get_relation(name) else {
                continue;
            };
            load_relation(db, &mut entities, relation, nested).await?;
        }

        Ok(entities)
    })
}

async fn load_relation(
    db: &DatabaseConnection,
    parents: &mut [Entity],
    relation: &Relation,
    nested: &ResourceQuery,
) -> Result<(), DbErr> {
    let keys: IndexSet<String> = parents
        .iter()
        .filter_map(|parent| parent.get(&relation.parent_key).and_then(key_string))
        .collect();

    let mut grouped: HashMap<String, Vec<Entity>> = HashMap::new();
    if !keys.is_empty() {
        let mut related_query = nested.clone();
        related_query.ensure_selected(&relation.related_key);
        let values = keys
            .iter()
            .map(|key| related_query.resource().cast(&relation.related_key, key))
            .collect();
        related_query.where_in(&relation.related_key, values);

        for entity in load(db, &related_query).await? {
            if let Some(key) = entity.get(&relation.related_key).and_then(key_string) {
                grouped.entry(key).or_default().push(entity);
            }
        }
    }

    for parent in parents.iter_mut() {
        let matches = parent
            .get(&relation.parent_key)
            .and_then(key_string)
            .and_then(|key| grouped.get(&key))
            .cloned()
            .unwrap_or_default();
        let related = if relation.is_to_many() {
            Related::Many(matches)
        } else {
            Related::One(matches.into_iter().next().map(Box::new))
        };
        parent.set_relation(relation.name.as_str(), related);
    }
    Ok(())
}

/// Remove hidden columns and anything read only to match relationships.
fn strip(entities: &mut [Entity], query: &ResourceQuery) {
    let selection = query.columns();
    for entity in entities.iter_mut() {
        for hidden in query.resource().hidden_columns() {
            entity.forget(hidden);
        }
        if !selection.is_empty() {
            let extra: Vec<String> = entity
                .attributes()
                .keys()
                .filter(|name| !selection.contains(*name))
                .cloned()
                .collect();
            for name in extra {
                entity.forget(&name);
            }
        }

        for (name, nested) in query.eager() {
            match entity.relation_mut(name) {
                Some(Related::One(Some(related))) => {
                    strip(std::slice::from_mut(related.as_mut()), nested);
                }
                Some(Related::Many(related)) => strip(related, nested),
                Some(Related::One(None)) | None => {}
            }
        }
    }
}

/// Run `query` and eager-load its relationships.
///
/// # Errors
///
/// Returns the database error of the first failing statement.
pub async fn fetch(db: &DatabaseConnection, query: &ResourceQuery) -> Result<Vec<Entity>, DbErr> {
    let mut entities = load(db, query).await?;
    strip(&mut entities, query);
    Ok(entities)
}

/// Run `query` limited to one row.
///
/// # Errors
///
/// Returns the database error of the first failing statement.
pub async fn fetch_first(
    db: &DatabaseConnection,
    query: &ResourceQuery,
) -> Result<Option<Entity>, DbErr> {
    let mut query = query.clone();
    query.limit(1);
    Ok(fetch(db, &query).await?.into_iter().next())
}

/// Count the rows `query` matches, ignoring ordering and paging.
///
/// # Errors
///
/// Returns the database error if the count statement fails.
pub async fn count(db: &DatabaseConnection, query: &ResourceQuery) -> Result<u64, DbErr> {
    let statement = db
        .get_database_backend()
        .build(&query.count_statement());
    tracing::debug!(sql = %statement, "Counting resource query");

    let total = match db.query_one(statement).await? {
        Some(row) => row.try_get::<i64>("", "aggregate")?,
        None => 0,
    };
    Ok(u64::try_from(total).unwrap_or(0))
}

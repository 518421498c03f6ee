#![allow(dead_code)]

use apiable::prelude::*;
use apiable::{JsonApiRequest, executor};
use axum::Router;
use axum::extract::{Path, State};
use indexmap::IndexMap;
use sea_orm::sea_query::{Alias, ColumnDef, Query, Table};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::SchemaManager;
use serde_json::json;
use std::sync::{Arc, Mutex};

pub type ScopeLog = Arc<Mutex<Vec<Vec<String>>>>;

const POSTS: [(i64, &str, &str, i64, bool, i64); 3] = [
    (1, "Rust ownership", "Active", 10, true, 1),
    (2, "Axum routing", "Archived", 25, false, 1),
    (3, "Sea ORM queries", "Inactive", 5, true, 2),
];

pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = Database::connect("sqlite::memory:").await?;
    let manager = SchemaManager::new(&db);

    manager
        .create_table(
            Table::create()
                .table(Alias::new("users"))
                .if_not_exists()
                .col(ColumnDef::new(Alias::new("id")).integer().not_null().primary_key())
                .col(ColumnDef::new(Alias::new("name")).string().not_null())
                .col(ColumnDef::new(Alias::new("email")).string().not_null())
                .to_owned(),
        )
        .await?;

    manager
        .create_table(
            Table::create()
                .table(Alias::new("posts"))
                .if_not_exists()
                .col(ColumnDef::new(Alias::new("id")).integer().not_null().primary_key())
                .col(ColumnDef::new(Alias::new("title")).string().not_null())
                .col(ColumnDef::new(Alias::new("status")).string().not_null())
                .col(ColumnDef::new(Alias::new("views")).integer().not_null())
                .col(ColumnDef::new(Alias::new("published")).boolean().not_null())
                .col(ColumnDef::new(Alias::new("author_id")).integer().not_null())
                .to_owned(),
        )
        .await?;

    manager
        .create_table(
            Table::create()
                .table(Alias::new("comments"))
                .if_not_exists()
                .col(ColumnDef::new(Alias::new("id")).integer().not_null().primary_key())
                .col(ColumnDef::new(Alias::new("post_id")).integer().not_null())
                .col(ColumnDef::new(Alias::new("author_id")).integer().not_null())
                .col(ColumnDef::new(Alias::new("body")).string().not_null())
                .to_owned(),
        )
        .await?;

    seed(&db).await?;
    Ok(db)
}

async fn seed(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    let mut users = Query::insert();
    users
        .into_table(Alias::new("users"))
        .columns([Alias::new("id"), Alias::new("name"), Alias::new("email")])
        .values_panic([1.into(), "Jane".into(), "jane@example.com".into()])
        .values_panic([2.into(), "Ann".into(), "ann@example.com".into()]);
    db.execute(backend.build(&users)).await?;

    let mut posts = Query::insert();
    posts.into_table(Alias::new("posts")).columns([
        Alias::new("id"),
        Alias::new("title"),
        Alias::new("status"),
        Alias::new("views"),
        Alias::new("published"),
        Alias::new("author_id"),
    ]);
    for (id, title, status, views, published, author_id) in POSTS {
        posts.values_panic([
            id.into(),
            title.into(),
            status.into(),
            views.into(),
            published.into(),
            author_id.into(),
        ]);
    }
    db.execute(backend.build(&posts)).await?;

    let mut comments = Query::insert();
    comments
        .into_table(Alias::new("comments"))
        .columns([
            Alias::new("id"),
            Alias::new("post_id"),
            Alias::new("author_id"),
            Alias::new("body"),
        ])
        .values_panic([1.into(), 1.into(), 2.into(), "Great read".into()])
        .values_panic([2.into(), 1.into(), 1.into(), "Thanks".into()])
        .values_panic([3.into(), 3.into(), 1.into(), "Nice".into()]);
    db.execute(backend.build(&comments)).await?;

    Ok(())
}

fn search_titles(term: &str, _filters: &IndexMap<String, String>) -> Vec<String> {
    let term = term.to_lowercase();
    POSTS
        .iter()
        .filter(|(_, title, ..)| title.to_lowercase().contains(&term))
        .map(|(id, ..)| id.to_string())
        .collect()
}

pub fn schema_with_config(config: ApiableConfig, scope_log: ScopeLog) -> Arc<Schema> {
    Schema::new(Arc::new(config))
        .register(
            Resource::new("Post", "posts")
                .column("id", FieldType::Integer)
                .column("title", FieldType::Text)
                .column("status", FieldType::Text)
                .column("views", FieldType::Integer)
                .column("published", FieldType::Boolean)
                .column("author_id", FieldType::Integer)
                .belongs_to("author", "User", "author_id")
                .has_many("comments", "Comment", "post_id")
                .scope("active", move |query, values| {
                    if let Ok(mut log) = scope_log.lock() {
                        log.push(values.to_vec());
                    }
                    let flag = values.first().map_or("1", String::as_str);
                    query.where_clause("published", Comparator::Equal, flag, Boolean::And);
                })
                .append("headline", |post| {
                    json!(post
                        .get("title")
                        .and_then(|title| title.as_str())
                        .map(str::to_uppercase))
                })
                .searchable(search_titles),
        )
        .register(
            Resource::new("User", "users")
                .column("id", FieldType::Integer)
                .column("name", FieldType::Text)
                .column("email", FieldType::Text)
                .hidden("email")
                .has_many("posts", "Post", "author_id"),
        )
        .register(
            Resource::new("Comment", "comments")
                .column("id", FieldType::Integer)
                .column("post_id", FieldType::Integer)
                .column("author_id", FieldType::Integer)
                .column("body", FieldType::Text)
                .belongs_to("author", "User", "author_id")
                .belongs_to("post", "Post", "post_id"),
        )
        .into_shared()
}

pub fn schema() -> Arc<Schema> {
    schema_with_config(ApiableConfig::default(), ScopeLog::default())
}

/// The allow-list the `/posts` endpoints declare.
pub fn allow_post_rules(request: RequestQueryObject) -> RequestQueryObject {
    request
        .allow_filter(AllowFilter::exact("status", ["Active", "Archived"]))
        .allow_filter(AllowFilter::similar("title", "*"))
        .allow_filter(AllowFilter::exact("author.name", "*"))
        .allow_filter(AllowFilter::scoped("active"))
        .allow_sort(AllowSort::both("title"))
        .allow_sort(AllowSort::both("views"))
        .allow_sort(AllowSort::both("author.name"))
        .allow_include(AllowInclude::new("author"))
        .allow_include(AllowInclude::new("comments"))
        .allow_include(AllowInclude::new("comments.author"))
        .allow_fields(AllowFields::new("post", ["title", "status", "views"]))
        .allow_fields(AllowFields::new("user", ["name"]))
        .allow_appends(AllowAppends::new("post", ["headline"]))
        .allow_search(true)
}

pub fn posts_request(schema: &Arc<Schema>, query_string: &str) -> RequestQueryObject {
    allow_post_rules(RequestQueryObject::for_query(
        schema.query("Post").unwrap(),
        query_string,
    ))
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub schema: Arc<Schema>,
}

async fn list_posts(
    State(app): State<AppState>,
    request: JsonApiRequest,
) -> Result<Document, ApiError> {
    let request = allow_post_rules(RequestQueryObject::from_request(
        &request,
        app.schema.query("Post")?,
    ));
    JsonApiResponse::new(request)
        .paginate(None)
        .collection(&app.db)
        .await
}

async fn show_post(
    State(app): State<AppState>,
    Path(id): Path<i64>,
    request: JsonApiRequest,
) -> Result<Document, ApiError> {
    let mut query = app.schema.query("Post")?;
    query.where_key_in(&[id.to_string()]);
    let request = RequestQueryObject::from_request(&request, query)
        .allow_include(AllowInclude::new("author"));
    let document = JsonApiResponse::new(request).first(&app.db).await?;
    Ok(document)
}

pub fn setup_test_app(db: DatabaseConnection, schema: Arc<Schema>) -> Router {
    let api = Router::new()
        .route("/posts", axum::routing::get(list_posts))
        .route("/posts/{id}", axum::routing::get(show_post))
        .with_state(AppState { db, schema });

    Router::new().nest("/api/v1", api)
}

/// Primary keys of fetched entities, in order.
pub async fn fetch_ids(
    db: &DatabaseConnection,
    request: &mut RequestQueryObject,
) -> Vec<String> {
    request.apply().unwrap();
    executor::fetch(db, request.query())
        .await
        .unwrap()
        .iter()
        .filter_map(apiable::Entity::key)
        .collect()
}

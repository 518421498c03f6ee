use apiable::prelude::*;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};

mod common;
use common::{ScopeLog, posts_request, schema, schema_with_config, setup_test_db};

fn to_json(document: &Document) -> Value {
    serde_json::to_value(document).unwrap()
}

async fn paginated(request: RequestQueryObject, db: &DatabaseConnection) -> Value {
    let document = JsonApiResponse::new(request)
        .paginate(None)
        .collection(db)
        .await
        .unwrap();
    to_json(&document)
}

#[tokio::test]
async fn test_collection_deduplicates_included() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let request = posts_request(
        &schema,
        "include=author&filter[status]=Active,Archived&sort=views",
    );
    let document = JsonApiResponse::new(request).collection(&db).await.unwrap();
    let body = to_json(&document);

    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["type"], "post");
    assert_eq!(
        body["data"][0]["relationships"]["author"]["data"],
        json!({"id": "1", "type": "user"})
    );
    assert_eq!(
        body["included"],
        json!([{"id": "1", "type": "user", "attributes": {"name": "Jane"}}])
    );
    assert!(body.get("links").is_none());
}

#[tokio::test]
async fn test_appends_are_opt_in() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let request = posts_request(&schema, "filter[status]=Active");
    let body = to_json(&JsonApiResponse::new(request).collection(&db).await.unwrap());
    assert!(body["data"][0]["attributes"].get("headline").is_none());

    let request = posts_request(&schema, "filter[status]=Active&appends[post]=headline");
    let body = to_json(&JsonApiResponse::new(request).collection(&db).await.unwrap());
    assert_eq!(body["data"][0]["attributes"]["headline"], "RUST OWNERSHIP");
}

#[tokio::test]
async fn test_pagination_meta_and_links() {
    let db = setup_test_db().await.unwrap();
    let config = ApiableConfig::default().default_page_size(2);
    let schema = schema_with_config(config, ScopeLog::default());

    let request = posts_request(&schema, "sort=views&page[number]=2").with_path("/posts");
    let document = JsonApiResponse::new(request)
        .paginate(None)
        .collection(&db)
        .await
        .unwrap();
    let body = to_json(&document);

    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], "2");
    assert_eq!(
        body["meta"],
        json!({"current_page": 2, "per_page": 2, "total": 3, "last_page": 2, "from": 3, "to": 3})
    );
    assert_eq!(body["links"]["first"], "/posts?sort=views&page%5Bnumber%5D=1");
    assert_eq!(body["links"]["prev"], "/posts?sort=views&page%5Bnumber%5D=1");
    assert_eq!(body["links"]["last"], "/posts?sort=views&page%5Bnumber%5D=2");
    assert!(body["links"].get("next").is_none());
}

#[tokio::test]
async fn test_requested_page_size_can_only_grow() {
    let db = setup_test_db().await.unwrap();
    let config = ApiableConfig::default().default_page_size(2);
    let schema = schema_with_config(config, ScopeLog::default());

    let request = posts_request(&schema, "page[size]=100");
    let body = paginated(request, &db).await;
    assert_eq!(body["meta"]["per_page"], 100);
    assert_eq!(body["meta"]["last_page"], 1);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let request = posts_request(&schema, "page[size]=1");
    let body = paginated(request, &db).await;
    assert_eq!(body["meta"]["per_page"], 2);
}

#[tokio::test]
async fn test_empty_page() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let request = posts_request(&schema, "filter[status]=Archived&filter[title]=ownership");
    let body = paginated(request, &db).await;

    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"]["total"], 0);
    assert_eq!(body["meta"]["last_page"], 1);
    assert_eq!(body["meta"]["from"], Value::Null);
    assert!(body["links"].get("next").is_none());
}

#[tokio::test]
async fn test_out_of_range_page_parameters_give_an_empty_page() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let request = posts_request(&schema, "page[number]=1000000000000000000");
    let body = paginated(request, &db).await;
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["current_page"], 1_000_000_000_000_000_000_u64);
    assert_eq!(body["meta"]["from"], Value::Null);

    let request = posts_request(&schema, "page[number]=4&page[size]=1");
    let body = paginated(request, &db).await;
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"]["last_page"], 3);

    let request = posts_request(&schema, "page[size]=18446744073709551615");
    let body = paginated(request, &db).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    assert_eq!(body["meta"]["per_page"], i64::MAX);
    assert_eq!(body["meta"]["last_page"], 1);
}

#[tokio::test]
async fn test_first_returns_single_resource_or_null() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut query = schema.query("Post").unwrap();
    query.where_key_in(&["3".to_string()]);
    let request = RequestQueryObject::for_query(query, "include=author")
        .allow_include(AllowInclude::new("author"));
    let body = to_json(&JsonApiResponse::new(request).first(&db).await.unwrap());
    assert_eq!(body["data"]["id"], "3");
    assert_eq!(body["data"]["attributes"]["title"], "Sea ORM queries");
    assert_eq!(body["included"][0]["attributes"]["name"], "Ann");

    let mut query = schema.query("Post").unwrap();
    query.where_key_in(&["99".to_string()]);
    let request = RequestQueryObject::for_query(query, "");
    let body = to_json(&JsonApiResponse::new(request).first(&db).await.unwrap());
    assert_eq!(body, json!({"data": null}));
}

#[tokio::test]
async fn test_allowed_rules_are_described_in_meta() {
    let db = setup_test_db().await.unwrap();
    let config = ApiableConfig::default().include_allowed(true);
    let schema = schema_with_config(config, ScopeLog::default());

    let request = posts_request(&schema, "");
    let body = to_json(&JsonApiResponse::new(request).collection(&db).await.unwrap());

    assert_eq!(
        body["meta"]["allowed_filters"]["status"],
        json!({"exact": ["Active", "Archived"]})
    );
    assert_eq!(body["meta"]["allowed_filters"]["title"], json!({"similar": "*"}));
    assert_eq!(body["meta"]["allowed_sorts"]["views"], "*");
}

#[tokio::test]
async fn test_strict_mode_rejects_disallowed_values() {
    let db = setup_test_db().await.unwrap();
    let config = ApiableConfig::default().strict(true);
    let schema = schema_with_config(config, ScopeLog::default());

    let request = posts_request(&schema, "filter[status]=Inactive");
    let err = JsonApiResponse::new(request).collection(&db).await.unwrap_err();
    match err {
        ApiError::InvalidParameter { parameter, value } => {
            assert_eq!(parameter, "filter[status]");
            assert_eq!(value, "Inactive");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let request = posts_request(&schema, "sort=published");
    let err = JsonApiResponse::new(request).collection(&db).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::InvalidParameter { ref parameter, .. } if parameter == "sort"
    ));
}

#[tokio::test]
async fn test_includes_are_always_enforced() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let request = posts_request(&schema, "include=secrets");
    let err = JsonApiResponse::new(request).collection(&db).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::InvalidParameter { ref parameter, ref value }
            if parameter == "include" && value == "secrets"
    ));
}

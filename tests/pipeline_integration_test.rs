use apiable::prelude::*;
use apiable::{Related, ResourceSerializer, executor};
use std::sync::Arc;

mod common;
use common::{ScopeLog, fetch_ids, posts_request, schema, schema_with_config, setup_test_db};

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_exact_filter_matches_allowed_value() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "filter[status]=Active");
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["1"]);

    // Values outside the allow-list are dropped, leaving the query unfiltered
    let mut request = posts_request(&schema, "filter[status]=Inactive");
    assert_eq!(sorted(fetch_ids(&db, &mut request).await), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_multiple_values_are_or_ed() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "filter[status]=Active,Archived");
    assert_eq!(sorted(fetch_ids(&db, &mut request).await), vec!["1", "2"]);
}

#[tokio::test]
async fn test_similar_filter_is_a_substring_match() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "filter[title]=rout");
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["2"]);

    // LIKE wildcards in the value are matched literally
    let mut request = posts_request(&schema, "filter[title]=%25");
    assert!(fetch_ids(&db, &mut request).await.is_empty());
}

#[tokio::test]
async fn test_scope_filter_receives_values() {
    let db = setup_test_db().await.unwrap();
    let log = ScopeLog::default();
    let schema = schema_with_config(ApiableConfig::default(), Arc::clone(&log));

    let mut request = posts_request(&schema, "filter[active]=1");
    assert_eq!(sorted(fetch_ids(&db, &mut request).await), vec!["1", "3"]);
    assert_eq!(*log.lock().unwrap(), vec![vec!["1".to_string()]]);
}

#[tokio::test]
async fn test_relationship_filter() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "filter[author.name]=Ann");
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["3"]);

    let mut request = posts_request(&schema, "filter[author.name]=Jane&filter[status]=Archived");
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["2"]);
}

#[tokio::test]
async fn test_relationship_filter_on_undeclared_column_is_ignored() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "filter[comments.bdy]=zzz")
        .allow_filter(AllowFilter::exact("comments.bdy", "*"));
    assert_eq!(sorted(fetch_ids(&db, &mut request).await), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_sort_on_undeclared_related_column_is_ignored() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request =
        posts_request(&schema, "sort=author.typo").allow_sort(AllowSort::both("author.typo"));
    assert_eq!(sorted(fetch_ids(&db, &mut request).await), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_sorts() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "sort=-views");
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["2", "1", "3"]);

    let mut request = posts_request(&schema, "sort=title");
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["2", "1", "3"]);

    let mut request = posts_request(&schema, "sort=author.name,title");
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["3", "2", "1"]);
}

#[tokio::test]
async fn test_default_sort_applies_without_client_sort() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "").default_sort("views", Order::Asc);
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["3", "1", "2"]);

    let mut request = posts_request(&schema, "sort=-views").default_sort("views", Order::Asc);
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["2", "1", "3"]);
}

#[tokio::test]
async fn test_search_restricts_to_engine_keys() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "q=rust");
    assert_eq!(fetch_ids(&db, &mut request).await, vec!["1"]);

    let mut request = posts_request(&schema, "q=nothing-matches");
    assert!(fetch_ids(&db, &mut request).await.is_empty());
}

#[tokio::test]
async fn test_search_ignored_when_not_allowed() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "q=rust").allow_search(false);
    assert_eq!(sorted(fetch_ids(&db, &mut request).await), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_includes_load_relationships() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(&schema, "include=comments.author&filter[status]=Active");
    request.apply().unwrap();
    let posts = executor::fetch(&db, request.query()).await.unwrap();

    assert_eq!(posts.len(), 1);
    let Some(Related::Many(comments)) = posts[0].relation("comments") else {
        panic!("comments were not loaded");
    };
    assert_eq!(comments.len(), 2);
    for comment in comments {
        assert!(matches!(comment.relation("author"), Some(Related::One(Some(_)))));
    }
}

#[tokio::test]
async fn test_sparse_fields_strip_forced_and_hidden_columns() {
    let db = setup_test_db().await.unwrap();
    let schema = schema();

    let mut request = posts_request(
        &schema,
        "include=author&fields[post]=title&filter[status]=Active",
    );
    request.apply().unwrap();
    let posts = executor::fetch(&db, request.query()).await.unwrap();

    let post = &posts[0];
    assert_eq!(post.key().as_deref(), Some("1"));
    assert_eq!(post.get("title").and_then(|v| v.as_str()), Some("Rust ownership"));
    assert!(post.get("author_id").is_none());
    assert!(post.get("status").is_none());

    let Some(Related::One(Some(author))) = post.relation("author") else {
        panic!("author was not loaded");
    };
    assert_eq!(author.get("name").and_then(|v| v.as_str()), Some("Jane"));
    assert!(author.get("email").is_none());

    let serialized = ResourceSerializer::new(&schema).resource(post);
    assert_eq!(serialized.attributes.len(), 1);
    assert_eq!(serialized.included()[0].attributes.len(), 1);
}

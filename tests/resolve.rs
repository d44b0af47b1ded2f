//! End-to-end execution over the blog fixture: one query in, recorded RPC
//! calls out.

mod common;

use async_graphql::Request;
use common::{blog_registry, MockTransport, BLOG_SDL};
use grpc_graphql_bridge::dataloader::BatchDispatcher;
use grpc_graphql_bridge::descriptor::RequestContext;
use grpc_graphql_bridge::resolver::build_schema;
use grpc_graphql_bridge::schema::SchemaIndex;
use serde_json::json;
use std::sync::Arc;

async fn execute(query: &str) -> (serde_json::Value, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let registry = blog_registry(transport.clone());
    let index = SchemaIndex::parse(BLOG_SDL).expect("parse");
    let schema = build_schema(&index, &registry).expect("schema builds");

    let request = Request::new(query)
        .data(RequestContext::new())
        .data(BatchDispatcher::new());
    let response = schema.execute(request).await;
    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    (response.data.into_json().expect("json data"), transport)
}

#[tokio::test]
async fn test_list_query_batches_the_author_lookup() {
    let (data, transport) =
        execute("{ posts { id title state author { id name } } }").await;

    assert_eq!(
        data,
        json!({
            "posts": [
                {"id": "p1", "title": "first", "state": "DRAFT",
                 "author": {"id": "a1", "name": "author a1"}},
                {"id": "p2", "title": "second", "state": "PUBLISHED",
                 "author": {"id": "a2", "name": "author a2"}},
                {"id": "p3", "title": "third", "state": "DRAFT",
                 "author": {"id": "a1", "name": "author a1"}},
            ]
        })
    );

    // three author fields, one rpc: keys are batched and deduplicated
    assert_eq!(transport.rpc_names(), vec!["ListPosts", "BatchGetAuthors"]);
    let calls = transport.calls.lock();
    let mut ids: Vec<String> = calls[1].1["ids"]
        .as_array()
        .expect("ids sent")
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a1", "a2"]);
}

#[tokio::test]
async fn test_repeated_enum_values_are_renamed_per_element() {
    let (data, transport) = execute("{ posts { id past_states } }").await;

    assert_eq!(
        data,
        json!({
            "posts": [
                {"id": "p1", "past_states": ["DRAFT", "PUBLISHED"]},
                {"id": "p2", "past_states": []},
                {"id": "p3", "past_states": ["DRAFT"]},
            ]
        })
    );
    assert_eq!(transport.rpc_names(), vec!["ListPosts"]);
}

#[tokio::test]
async fn test_wrapped_field_assembles_from_the_parent_message() {
    let (data, transport) = execute("{ posts { stats { likes } } }").await;

    assert_eq!(
        data,
        json!({
            "posts": [
                {"stats": {"likes": 1}},
                {"stats": {"likes": 2}},
                {"stats": {"likes": 3}},
            ]
        })
    );
    // wrap is pure projection, only the root fetch hits the wire
    assert_eq!(transport.rpc_names(), vec!["ListPosts"]);
}

#[tokio::test]
async fn test_entities_preserve_order_and_typename() {
    let query = r#"
    {
      _entities(representations: [
        {__typename: "Post", id: "p2"},
        {__typename: "Post", id: "p1"}
      ]) {
        __typename
        ... on Post { id title }
      }
    }
    "#;
    let (data, transport) = execute(query).await;

    assert_eq!(
        data,
        json!({
            "_entities": [
                {"__typename": "Post", "id": "p2", "title": "title p2"},
                {"__typename": "Post", "id": "p1", "title": "title p1"},
            ]
        })
    );

    let calls = transport.calls.lock();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|(rpc, _)| rpc == "GetPost"));
    let mut ids: Vec<&str> = calls.iter().map(|(_, req)| req["id"].as_str().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_service_sdl_is_served_without_mapping_directives() {
    let (data, transport) = execute("{ _service { sdl } }").await;

    let sdl = data["_service"]["sdl"].as_str().expect("sdl string");
    assert!(sdl.contains("type Post"));
    assert!(sdl.contains(r#"@key(fields: "id")"#));
    assert!(!sdl.contains("grpc"));
    assert!(transport.rpc_names().is_empty());
}

#![allow(dead_code)]

//! Shared blog fixture: a descriptor pool built in-process, a recording
//! transport with canned responses, and an SDL that maps onto it.

use grpc_graphql_bridge::descriptor::{ProtoService, RpcTransport, ServiceRegistry};
use grpc_graphql_bridge::directives::ServiceDecl;
use parking_lot::Mutex;
use prost_reflect::{DescriptorPool, DynamicMessage, MethodDescriptor};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MethodDescriptorProto, ServiceDescriptorProto,
};
use serde_json::json;
use std::sync::Arc;
use tonic::metadata::MetadataMap;

pub fn field(
    name: &str,
    number: i32,
    ty: Type,
    type_name: Option<&str>,
    repeated: bool,
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(if repeated { Label::Repeated } else { Label::Optional } as i32),
        r#type: Some(ty as i32),
        type_name: type_name.map(String::from),
        ..Default::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn enum_value(name: &str, number: i32) -> EnumValueDescriptorProto {
    EnumValueDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        ..Default::default()
    }
}

fn method(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        ..Default::default()
    }
}

/// The `blog.Blog` service: posts with an enum state, an author reachable via
/// a batched lookup, and single-post retrieval for entity resolution.
pub fn blog_pool() -> DescriptorPool {
    let file = FileDescriptorProto {
        name: Some("blog.proto".to_string()),
        package: Some("blog".to_string()),
        message_type: vec![
            message(
                "Post",
                vec![
                    field("id", 1, Type::String, None, false),
                    field("title", 2, Type::String, None, false),
                    field("author_id", 3, Type::String, None, false),
                    field("state", 4, Type::Enum, Some(".blog.PostState"), false),
                    field("like_count", 5, Type::Int32, None, false),
                    field("past_states", 6, Type::Enum, Some(".blog.PostState"), true),
                ],
            ),
            message(
                "Author",
                vec![
                    field("id", 1, Type::String, None, false),
                    field("name", 2, Type::String, None, false),
                ],
            ),
            message("ListPostsRequest", vec![field("first", 1, Type::Int32, None, false)]),
            message(
                "ListPostsResponse",
                vec![field("posts", 1, Type::Message, Some(".blog.Post"), true)],
            ),
            message("GetPostRequest", vec![field("id", 1, Type::String, None, false)]),
            message(
                "GetPostResponse",
                vec![field("post", 1, Type::Message, Some(".blog.Post"), false)],
            ),
            message(
                "BatchGetAuthorsRequest",
                vec![field("ids", 1, Type::String, None, true)],
            ),
            message(
                "BatchGetAuthorsResponse",
                vec![field("authors", 1, Type::Message, Some(".blog.Author"), true)],
            ),
        ],
        enum_type: vec![EnumDescriptorProto {
            name: Some("PostState".to_string()),
            value: vec![
                enum_value("POST_STATE_UNSPECIFIED", 0),
                enum_value("POST_STATE_DRAFT", 1),
                enum_value("POST_STATE_PUBLISHED", 2),
            ],
            ..Default::default()
        }],
        service: vec![ServiceDescriptorProto {
            name: Some("Blog".to_string()),
            method: vec![
                method("ListPosts", ".blog.ListPostsRequest", ".blog.ListPostsResponse"),
                method("GetPost", ".blog.GetPostRequest", ".blog.GetPostResponse"),
                method(
                    "BatchGetAuthors",
                    ".blog.BatchGetAuthorsRequest",
                    ".blog.BatchGetAuthorsResponse",
                ),
            ],
            ..Default::default()
        }],
        ..Default::default()
    };
    DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })
        .expect("valid descriptor set")
}

pub fn blog_decl() -> ServiceDecl {
    ServiceDecl {
        name: "BLOG".to_string(),
        proto_file: "blog.bin".to_string(),
        service_name: "blog.Blog".to_string(),
        address: "localhost:50051".to_string(),
        metadata: vec![],
    }
}

pub fn blog_service() -> Arc<ProtoService> {
    Arc::new(ProtoService::new(&blog_decl(), blog_pool()).expect("service wires up"))
}

/// Records every dispatched call and answers from canned data
pub struct MockTransport {
    pub calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn rpc_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(rpc, _)| rpc.clone()).collect()
    }
}

#[async_trait::async_trait]
impl RpcTransport for MockTransport {
    async fn unary(
        &self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        _metadata: MetadataMap,
    ) -> grpc_graphql_bridge::Result<DynamicMessage> {
        let rpc = method.name().to_string();
        let request_json = serde_json::to_value(&request).expect("serializable request");
        self.calls.lock().push((rpc.clone(), request_json.clone()));

        let response = match rpc.as_str() {
            "ListPosts" => json!({
                "posts": [
                    {"id": "p1", "title": "first", "author_id": "a1", "state": "POST_STATE_DRAFT", "like_count": 1,
                     "past_states": ["POST_STATE_DRAFT", "POST_STATE_PUBLISHED"]},
                    {"id": "p2", "title": "second", "author_id": "a2", "state": "POST_STATE_PUBLISHED", "like_count": 2,
                     "past_states": []},
                    {"id": "p3", "title": "third", "author_id": "a1", "state": "POST_STATE_DRAFT", "like_count": 3,
                     "past_states": ["POST_STATE_DRAFT"]},
                ]
            }),
            "GetPost" => {
                let id = request_json["id"].as_str().unwrap_or_default();
                json!({
                    "post": {
                        "id": id,
                        "title": format!("title {id}"),
                        "author_id": "a1",
                        "state": "POST_STATE_PUBLISHED",
                        "like_count": 5,
                    }
                })
            }
            "BatchGetAuthors" => {
                let ids: Vec<&str> = request_json["ids"]
                    .as_array()
                    .expect("ids present")
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect();
                // reversed, so correlation by response key is actually needed
                let authors: Vec<serde_json::Value> = ids
                    .iter()
                    .rev()
                    .map(|id| json!({"id": id, "name": format!("author {id}")}))
                    .collect();
                json!({ "authors": authors })
            }
            other => panic!("unexpected rpc {other}"),
        };

        let text = response.to_string();
        let mut de = serde_json::Deserializer::from_str(&text);
        Ok(DynamicMessage::deserialize(method.output(), &mut de).expect("canned response decodes"))
    }
}

pub fn blog_registry(transport: Arc<MockTransport>) -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    registry.insert(
        ProtoService::with_transport(&blog_decl(), blog_pool(), transport)
            .expect("service wires up"),
    );
    registry
}

/// A hand-authored schema over the blog service, exercising fetch, dig,
/// entity keys, input maps, wraps, enum renames, and a batched author lookup.
pub const BLOG_SDL: &str = r#"
enum grpc__Service {
  BLOG @grpc(protoFile: "blog.bin", serviceName: "blog.Blog", address: "localhost:50051")
}

type Query {
  posts: [Post] @grpc__fetch(service: BLOG, rpc: "ListPosts", dig: "posts")
}

type Post @key(fields: "id")
  @grpc__fetch(
    service: BLOG
    rpc: "GetPost"
    dig: "post"
    mapArguments: [{ sourceField: "id", arg: "id" }]
  ) {
  id: ID
  title: String
  author_id: String
  state: PostState
  past_states: [PostState]
  stats: PostStats @grpc__wrap(gql: "likes", proto: "like_count")
  author: Author
    @grpc__fetch(
      service: BLOG
      rpc: "BatchGetAuthors"
      dig: "authors"
      dataloader: { key: "$source.author_id", listArgument: "ids", responseKey: "id" }
    )
}

type PostStats {
  likes: Int
}

type Author {
  id: ID
  name: String
}

enum PostState {
  UNSPECIFIED @grpc__renamed(from: "POST_STATE_UNSPECIFIED")
  DRAFT @grpc__renamed(from: "POST_STATE_DRAFT")
  PUBLISHED @grpc__renamed(from: "POST_STATE_PUBLISHED")
}
"#;

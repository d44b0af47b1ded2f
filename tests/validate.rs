//! Validator scenarios over the blog fixture

mod common;

use common::{blog_registry, blog_service, MockTransport, BLOG_SDL};
use grpc_graphql_bridge::generate::generate;
use grpc_graphql_bridge::report::ErrorCode;
use grpc_graphql_bridge::schema::SchemaIndex;
use grpc_graphql_bridge::validate::validate;

#[test]
fn test_blog_schema_is_compatible() {
    let index = SchemaIndex::parse(BLOG_SDL).expect("parse");
    let errors = validate(&index, &blog_registry(MockTransport::new())).expect("validate runs");
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn test_generated_schema_validates_clean() {
    let sdl = generate(&[blog_service()]).expect("generate");
    let index = SchemaIndex::parse(&sdl).expect("generated sdl parses");
    let errors = validate(&index, &blog_registry(MockTransport::new())).expect("validate runs");
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

const BROKEN_SDL: &str = r#"
enum grpc__Service {
  BLOG @grpc(protoFile: "blog.bin", serviceName: "blog.Blog", address: "localhost:50051")
}

type Query {
  posts: [Post] @grpc__fetch(service: BLOG, rpc: "ListPosts", dig: "posts")
  post(slug: String): Post @grpc__fetch(service: BLOG, rpc: "GetPost", dig: "post")
}

type Post {
  id: ID
  headline: String
  state: PostState
  stats: PostStats @grpc__wrap(gql: "likes", proto: "hearts")
  author: Author
    @grpc__fetch(
      service: BLOG
      rpc: "BatchGetAuthors"
      dig: "authors"
      dataloader: { key: "$source.writer_id", listArgument: "ids", responseKey: "id" }
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
  DRAFT @grpc__renamed(from: "POST_STATE_DRAFT")
  ARCHIVED
}
"#;

#[test]
fn test_every_problem_is_reported_in_one_run() {
    let index = SchemaIndex::parse(BROKEN_SDL).expect("parse");
    let errors = validate(&index, &blog_registry(MockTransport::new())).expect("validate runs");

    let codes: Vec<ErrorCode> = errors.iter().map(|e| e.code).collect();
    assert!(codes.contains(&ErrorCode::MissingField), "{errors:?}");
    assert!(codes.contains(&ErrorCode::ExtraneousEnumValue), "{errors:?}");
    assert!(codes.contains(&ErrorCode::MissingEnumValue), "{errors:?}");
    assert!(codes.contains(&ErrorCode::WrappedFieldNotFound), "{errors:?}");
    assert!(
        codes.contains(&ErrorCode::DataloaderIncorrectSourceKey),
        "{errors:?}"
    );
    assert!(codes.contains(&ErrorCode::IncorrectArgument), "{errors:?}");

    // two missing enum values, everything else consolidated to one entry each
    assert_eq!(errors.len(), 7, "{errors:?}");
}

#[test]
fn test_paths_consolidate_across_both_roots() {
    let index = SchemaIndex::parse(BROKEN_SDL).expect("parse");
    let errors = validate(&index, &blog_registry(MockTransport::new())).expect("validate runs");

    let missing = errors
        .iter()
        .find(|e| e.code == ErrorCode::MissingField)
        .expect("missing field reported");
    assert_eq!(missing.paths.len(), 2);
    assert_eq!(
        missing.to_string(),
        "[ERROR] Post.headline not found\n  \
         Query.posts:[Post] calls Blog/ListPosts\n  \
         ⌙ Post.headline -> Post\n  \
         Query.post:Post calls Blog/GetPost\n  \
         ⌙ Post.headline -> Post"
    );
}

#[test]
fn test_interface_typed_fields_are_skipped_not_fatal() {
    const SDL: &str = r#"
    enum grpc__Service {
      BLOG @grpc(protoFile: "blog.bin", serviceName: "blog.Blog", address: "localhost:50051")
    }

    type Query {
      posts: [Post] @grpc__fetch(service: BLOG, rpc: "ListPosts", dig: "posts")
    }

    interface Actor {
      id: ID
    }

    type Post {
      id: ID
      author_id: Actor
      headline: String
    }
    "#;

    let index = SchemaIndex::parse(SDL).expect("parse");
    let errors = validate(&index, &blog_registry(MockTransport::new())).expect("validate runs");

    // the interface field contributes nothing; the rest of the walk still runs
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0].code, ErrorCode::MissingField);
    assert_eq!(errors[0].message, "Post.headline not found");
}

const BAD_INPUTS_SDL: &str = r#"
enum grpc__Service {
  BLOG @grpc(protoFile: "blog.bin", serviceName: "blog.Blog", address: "localhost:50051")
}

type Query {
  posts: [Post] @grpc__fetch(service: BLOG, rpc: "ListPosts", dig: "posts")
}

type Post {
  id: ID
  lookup: Post
    @grpc__fetch(
      service: BLOG
      rpc: "GetPost"
      dig: "post"
      mapArguments: [
        { sourceField: "missing_src", arg: "id" }
        { sourceField: "like_count", arg: "id" }
        { sourceField: "id", arg: "nope" }
      ]
    )
  author: Author
    @grpc__fetch(
      service: BLOG
      rpc: "BatchGetAuthors"
      dig: "authors"
      dataloader: { key: "author_id", listArgument: "ids", responseKey: "nope" }
    )
}

type Author {
  id: ID
  name: String
}
"#;

#[test]
fn test_input_maps_are_checked_against_source_and_request() {
    let index = SchemaIndex::parse(BAD_INPUTS_SDL).expect("parse");
    let errors = validate(&index, &blog_registry(MockTransport::new())).expect("validate runs");

    let message = |code: ErrorCode| {
        errors
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.message.clone())
            .unwrap_or_else(|| panic!("no {code:?} reported in {errors:?}"))
    };

    assert_eq!(
        message(ErrorCode::InputMapIncorrectArg),
        "Post.lookup (calling rpc GetPost) maps id to request field \
         GetPostRequest.nope, but GetPostRequest.nope does not exist"
    );
    assert_eq!(
        message(ErrorCode::InputMapMissingSourceField),
        "Post.lookup (calling rpc GetPost) maps missing_src to request field \
         GetPostRequest.id, but missing_src does not exist on Post"
    );
    assert_eq!(
        message(ErrorCode::InputMapIncorrectType),
        "Post.lookup (calling rpc GetPost) maps Post.like_count:TYPE_INT32 to \
         request field GetPostRequest.id:TYPE_STRING, but the types do not match"
    );
}

#[test]
fn test_dataloader_key_format_and_response_key_are_checked() {
    let index = SchemaIndex::parse(BAD_INPUTS_SDL).expect("parse");
    let errors = validate(&index, &blog_registry(MockTransport::new())).expect("validate runs");

    let message = |code: ErrorCode| {
        errors
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.message.clone())
            .unwrap_or_else(|| panic!("no {code:?} reported in {errors:?}"))
    };

    assert_eq!(
        message(ErrorCode::DataloaderIncorrectKeyFormat),
        "Dataloader key `author_id` must start with $source. or $args."
    );
    assert_eq!(
        message(ErrorCode::DataloaderIncorrectResponseKey),
        "Response key nope not found on message Author"
    );

    // three input map problems plus the two dataloader ones
    assert_eq!(errors.len(), 5, "{errors:?}");
}

#[test]
fn test_reported_messages_name_the_exact_mismatch() {
    let index = SchemaIndex::parse(BROKEN_SDL).expect("parse");
    let errors = validate(&index, &blog_registry(MockTransport::new())).expect("validate runs");

    let message = |code: ErrorCode| {
        errors
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.message.clone())
            .unwrap_or_else(|| panic!("no {code:?} reported"))
    };

    assert_eq!(
        message(ErrorCode::ExtraneousEnumValue),
        "PostState.ARCHIVED not found in PostState"
    );
    assert_eq!(
        message(ErrorCode::WrappedFieldNotFound),
        "Post.stats wraps field hearts which does not exist on Post"
    );
    assert_eq!(
        message(ErrorCode::DataloaderIncorrectSourceKey),
        "Dataloader cache key writer_id does not exist on message Post"
    );
    assert_eq!(
        message(ErrorCode::IncorrectArgument),
        "Argument slug on Query.post does not exist on rpc GetPost request type GetPostRequest"
    );
}

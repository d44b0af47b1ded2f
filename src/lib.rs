//! # grpc-graphql-bridge
//!
//! Serve a GraphQL API backed by gRPC services. A GraphQL schema carries
//! mapping directives that bind fields to RPC calls; this crate synthesizes
//! such schemas from protobuf descriptors, statically validates that the
//! directive graph is compatible with the message shapes behind it, and
//! executes the schema at request time by interpreting the same directives.
//!
//! ## Main components
//!
//! - [`generate`]: SDL synthesis from protobuf service descriptors.
//! - [`validate`]: the compatibility validator; walks every fetch root over
//!   the GraphQL and protobuf type graphs in parallel and reports each
//!   structural mismatch with full path provenance.
//! - [`resolver`]: compiles the SDL into an executable
//!   `async_graphql::dynamic::Schema`, with request-scoped batching and
//!   federation entity resolution.
//! - [`gateway::ServeMux`]: axum wiring around the executable schema.
//!
//! ## Example
//!
//! ```rust,no_run
//! use grpc_graphql_bridge::gateway::ServeMux;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sdl = std::fs::read_to_string("schema.graphql")?;
//!     let errors = grpc_graphql_bridge::validate::validate_sdl(&sdl)?;
//!     for error in &errors {
//!         eprintln!("{error}");
//!     }
//!     if errors.is_empty() {
//!         ServeMux::from_sdl(&sdl)?.serve("0.0.0.0:4000").await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod dataloader;
pub mod descriptor;
pub mod directives;
pub mod error;
pub mod federation;
pub mod gateway;
pub mod generate;
pub mod print;
pub mod report;
pub mod resolver;
pub mod scalars;
pub mod schema;
pub mod validate;
pub mod value;

pub use dataloader::{BatchDispatcher, BatchLoader};
pub use descriptor::{ProtoService, RequestContext, RpcTransport, ServiceRegistry};
pub use directives::{
    DataloaderParams, FetchDirective, InputMap, MetadataRule, ServiceDecl, WrapPair,
};
pub use error::{Error, Result};
pub use report::{ConsolidatedError, ErrorCode, Path, ValidationError};
pub use schema::SchemaIndex;

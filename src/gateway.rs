//! HTTP serving for the executable schema
//!
//! The `ServeMux` wraps a built dynamic schema in an axum router: POST
//! /graphql executes queries, GET serves the playground. Every request gets a
//! fresh [`BatchDispatcher`] and a [`RequestContext`] carrying the incoming
//! headers, so batching never leaks across requests and metadata rules can
//! read request headers.

use crate::dataloader::BatchDispatcher;
use crate::descriptor::{RequestContext, ServiceRegistry};
use crate::error::Result;
use crate::resolver;
use crate::schema::SchemaIndex;
use async_graphql::dynamic::Schema;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse},
    routing::post,
    Router,
};
use std::sync::Arc;
use tracing::info;

pub struct ServeMux {
    schema: Schema,
}

impl ServeMux {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Build the full pipeline from SDL text: index the document, load every
    /// declared service's descriptors, and compile the executable schema.
    pub fn from_sdl(sdl: &str) -> Result<Self> {
        let index = SchemaIndex::parse(sdl)?;
        let registry = ServiceRegistry::load(&index.services)?;
        let schema = resolver::build_schema(&index, &registry)?;
        Ok(Self::new(schema))
    }

    async fn execute(&self, headers: HeaderMap, request: GraphQLRequest) -> GraphQLResponse {
        let mut ctx = RequestContext::new();
        for (name, value) in &headers {
            if let Ok(value) = value.to_str() {
                ctx = ctx.with_header(name.as_str(), value);
            }
        }

        let request = request
            .into_inner()
            .data(ctx)
            .data(BatchDispatcher::new());
        self.schema.execute(request).await.into()
    }

    pub fn into_router(self) -> Router {
        let state = Arc::new(self);
        Router::new()
            .route("/graphql", post(handle_graphql_post).get(graphql_playground))
            .with_state(state)
    }

    /// Bind and serve until the process is stopped
    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr, "serving graphql endpoint");
        axum::serve(listener, self.into_router()).await?;
        Ok(())
    }
}

async fn handle_graphql_post(
    State(mux): State<Arc<ServeMux>>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> impl IntoResponse {
    mux.execute(headers, request).await
}

/// Serve the GraphQL Playground UI for ad-hoc exploration.
async fn graphql_playground() -> impl IntoResponse {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

//! Error types for the gRPC-GraphQL bridge

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bridge
///
/// Covers configuration and schema-load failures plus runtime RPC failures.
/// Structural schema/descriptor mismatches are *not* represented here; the
/// validator accumulates those as [`crate::report::ValidationError`]s instead
/// of failing fast.
#[derive(Error, Debug)]
pub enum Error {
    /// gRPC server-side errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// gRPC transport errors
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Schema-level errors: malformed SDL, a directive missing a required
    /// argument, a reference to an unknown service or RPC
    #[error("schema error: {0}")]
    Schema(String),

    /// Descriptor errors: unloadable descriptor sets, missing message types
    #[error("descriptor error: {0}")]
    Descriptor(String),

    /// Invalid request errors
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violations
    #[error("internal error: {0}")]
    Internal(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Error code reported in GraphQL error extensions
    fn code(&self) -> &'static str {
        match self {
            Error::Grpc(_) => "GRPC_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Schema(_) => "SCHEMA_ERROR",
            Error::Descriptor(_) => "DESCRIPTOR_ERROR",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "UNKNOWN_ERROR",
        }
    }

    /// Convert into a GraphQL field error carrying a `code` extension
    pub fn into_field_error(self) -> async_graphql::Error {
        use async_graphql::ErrorExtensions;
        let code = self.code();
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", code))
    }
}

//! Service descriptor model: protobuf type resolution and dynamic RPC dispatch
//!
//! Wraps one parsed protobuf service (a [`prost_reflect::ServiceDescriptor`]
//! out of a descriptor-set file) and exposes the lookups the synthesizer,
//! validator, and resolver share: RPC lookup, the dotted-path "dig" across
//! message fields, and a dynamic unary invoke that attaches per-service
//! metadata.

use crate::directives::{MetadataRule, ServiceDecl};
use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use prost::Message;
use prost_reflect::{
    DescriptorPool, DynamicMessage, Kind, MessageDescriptor, MethodDescriptor, ServiceDescriptor,
};
use std::collections::HashMap;
use std::sync::Arc;
use tonic::client::Grpc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Per-request context threaded through every resolver call. Carries the
/// incoming request headers that metadata rules may copy onto outgoing RPCs.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub headers: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Transport seam for RPC dispatch. Production uses [`GrpcTransport`]; tests
/// substitute a recording mock.
#[async_trait::async_trait]
pub trait RpcTransport: Send + Sync {
    async fn unary(
        &self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        metadata: MetadataMap,
    ) -> Result<DynamicMessage>;
}

/// One declared gRPC backend service
pub struct ProtoService {
    /// Logical name (the `grpc__Service` enum value)
    pub name: String,
    /// Fully-qualified protobuf service name
    pub service_name: String,
    /// Descriptor set file the service was declared with
    pub proto_file: String,
    pub address: String,
    pub metadata: Vec<MetadataRule>,
    service: ServiceDescriptor,
    transport: Arc<dyn RpcTransport>,
}

impl ProtoService {
    /// Wire up a service from its declaration and an already-loaded pool
    pub fn new(decl: &ServiceDecl, pool: DescriptorPool) -> Result<Self> {
        let transport = Arc::new(GrpcTransport::new(&decl.address));
        Self::with_transport(decl, pool, transport)
    }

    pub fn with_transport(
        decl: &ServiceDecl,
        pool: DescriptorPool,
        transport: Arc<dyn RpcTransport>,
    ) -> Result<Self> {
        let service = pool.get_service_by_name(&decl.service_name).ok_or_else(|| {
            Error::Descriptor(format!(
                "service `{}` not found in {}",
                decl.service_name, decl.proto_file
            ))
        })?;

        Ok(Self {
            name: decl.name.clone(),
            service_name: decl.service_name.clone(),
            proto_file: decl.proto_file.clone(),
            address: decl.address.clone(),
            metadata: decl.metadata.clone(),
            service,
            transport,
        })
    }

    /// The service name without its package prefix, as shown in reports
    pub fn short_name(&self) -> &str {
        self.service.name()
    }

    /// All RPC methods, in declaration order
    pub fn rpcs(&self) -> impl Iterator<Item = MethodDescriptor> + '_ {
        self.service.methods()
    }

    /// Look up an RPC method by name
    pub fn rpc(&self, name: &str) -> Option<MethodDescriptor> {
        self.service.methods().find(|m| m.name() == name)
    }

    /// Follow a dotted path across message fields, returning the message type
    /// the final segment lands on. `None` if any segment is missing or not a
    /// message; callers turn that into a reported error.
    pub fn dig_from(&self, start: &MessageDescriptor, path: &str) -> Option<MessageDescriptor> {
        let mut current = start.clone();
        for segment in path.split('.') {
            let field = current.get_field_by_name(segment)?;
            match field.kind() {
                Kind::Message(next) => current = next,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Perform a unary RPC. Serializes the request, attaches metadata derived
    /// from the request context per this service's injection rules, and
    /// propagates transport failure without retrying.
    pub async fn invoke(
        &self,
        rpc_name: &str,
        request: DynamicMessage,
        ctx: &RequestContext,
    ) -> Result<DynamicMessage> {
        let method = self.rpc(rpc_name).ok_or_else(|| {
            Error::Schema(format!(
                "no rpc named {} on service {}",
                rpc_name, self.service_name
            ))
        })?;

        let mut metadata = MetadataMap::new();
        for rule in &self.metadata {
            let value = match (&rule.value, &rule.value_from) {
                (Some(value), _) => Some(value.clone()),
                (None, Some(header)) => ctx.header(header).map(String::from),
                (None, None) => None,
            };
            if let Some(value) = value {
                let key: tonic::metadata::MetadataKey<_> = rule
                    .name
                    .parse()
                    .map_err(|_| Error::Schema(format!("invalid metadata name {}", rule.name)))?;
                let value: MetadataValue<_> = value
                    .parse()
                    .map_err(|_| Error::Schema(format!("invalid metadata value for {}", rule.name)))?;
                metadata.insert(key, value);
            }
        }

        debug!(service = %self.name, rpc = rpc_name, "dispatching rpc");
        self.transport.unary(&method, request, metadata).await
    }
}

/// The production transport: one lazily-opened channel per service, cached for
/// the service's lifetime.
pub struct GrpcTransport {
    endpoint: String,
    channel: OnceCell<Channel>,
}

impl GrpcTransport {
    pub fn new(address: &str) -> Self {
        let endpoint = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        Self {
            endpoint,
            channel: OnceCell::new(),
        }
    }

    fn channel(&self) -> Result<Channel> {
        self.channel
            .get_or_try_init(|| {
                debug!(endpoint = %self.endpoint, "opening channel");
                Ok::<_, Error>(Endpoint::from_shared(self.endpoint.clone())?.connect_lazy())
            })
            .cloned()
    }
}

#[async_trait::async_trait]
impl RpcTransport for GrpcTransport {
    async fn unary(
        &self,
        method: &MethodDescriptor,
        request: DynamicMessage,
        metadata: MetadataMap,
    ) -> Result<DynamicMessage> {
        let mut grpc = Grpc::new(self.channel()?);
        grpc.ready()
            .await
            .map_err(|e| Error::Internal(format!("gRPC not ready: {e}")))?;

        let path: http::uri::PathAndQuery = format!(
            "/{}/{}",
            method.parent_service().full_name(),
            method.name()
        )
        .parse()
        .map_err(|e| Error::Schema(format!("invalid gRPC path: {e}")))?;

        let codec = ReflectCodec::new(method.output());
        let mut tonic_request = tonic::Request::new(request);
        *tonic_request.metadata_mut() = metadata;

        let response = grpc.unary(tonic_request, path, codec).await?;
        Ok(response.into_inner())
    }
}

/// Codec for encoding/decoding dynamic protobuf messages
#[derive(Clone)]
struct ReflectCodec {
    output_desc: MessageDescriptor,
}

impl ReflectCodec {
    fn new(output_desc: MessageDescriptor) -> Self {
        Self { output_desc }
    }
}

impl Codec for ReflectCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = ReflectEncoder;
    type Decoder = ReflectDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        ReflectEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        ReflectDecoder {
            desc: self.output_desc.clone(),
        }
    }
}

struct ReflectEncoder;

impl Encoder for ReflectEncoder {
    type Item = DynamicMessage;
    type Error = tonic::Status;

    fn encode(
        &mut self,
        item: Self::Item,
        dst: &mut EncodeBuf<'_>,
    ) -> std::result::Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|e| tonic::Status::internal(format!("encode error: {e}")))?;
        Ok(())
    }
}

struct ReflectDecoder {
    desc: MessageDescriptor,
}

impl Decoder for ReflectDecoder {
    type Item = DynamicMessage;
    type Error = tonic::Status;

    fn decode(
        &mut self,
        src: &mut DecodeBuf<'_>,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        use bytes::Buf;
        let buf = src.chunk();
        if buf.is_empty() {
            return Ok(None);
        }
        let msg = DynamicMessage::decode(self.desc.clone(), buf)
            .map_err(|e| tonic::Status::internal(format!("decode error: {e}")))?;
        src.advance(buf.len());
        Ok(Some(msg))
    }
}

/// Immutable set of declared services, shared read-only across all requests
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<ProtoService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from service declarations, loading each descriptor
    /// set file from disk.
    pub fn load(decls: &[ServiceDecl]) -> Result<Self> {
        let mut registry = Self::new();
        for decl in decls {
            let bytes = std::fs::read(&decl.proto_file)?;
            let pool = DescriptorPool::decode(bytes.as_slice())
                .map_err(|e| Error::Descriptor(format!("{}: {e}", decl.proto_file)))?;
            registry.insert(ProtoService::new(decl, pool)?);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, service: ProtoService) {
        self.services.insert(service.name.clone(), Arc::new(service));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ProtoService>> {
        self.services.get(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_headers_are_case_insensitive() {
        let ctx = RequestContext::new().with_header("Authorization", "Bearer t");
        assert_eq!(ctx.header("authorization"), Some("Bearer t"));
        assert_eq!(ctx.header("AUTHORIZATION"), Some("Bearer t"));
        assert_eq!(ctx.header("x-other"), None);
    }

    #[test]
    fn test_transport_endpoint_scheme() {
        let transport = GrpcTransport::new("localhost:50051");
        assert_eq!(transport.endpoint, "http://localhost:50051");
        let transport = GrpcTransport::new("https://svc.internal:443");
        assert_eq!(transport.endpoint, "https://svc.internal:443");
    }
}

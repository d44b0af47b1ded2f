//! The mapping directive vocabulary shared by the synthesizer, validator, and
//! resolver
//!
//! Directives are parsed out of SDL into a small closed set of typed values.
//! All three consumers go through these types, so a directive can never mean
//! different things at generate, validate, and resolve time.

use crate::error::{Error, Result};
use async_graphql::parser::types::ConstDirective;
use async_graphql::{Positioned, Value as ConstValue};

/// SDL definitions for every mapping directive and its input types.
///
/// Emitted verbatim at the top of generated schemas; hand-authored schemas are
/// expected to carry the same definitions.
pub const PRELUDE: &str = r#"directive @grpc(
  protoFile: String!
  serviceName: String!
  address: String!
  metadata: [grpc__Metadata!]
) on ENUM_VALUE

directive @grpc__fetch(
  service: grpc__Service!
  rpc: String!
  dig: String
  mapArguments: [grpc__InputMap!]
  dataloader: grpc__Dataloader
) on FIELD_DEFINITION | OBJECT

directive @grpc__renamed(
  from: String!
) on FIELD_DEFINITION | ARGUMENT_DEFINITION | ENUM_VALUE | INPUT_FIELD_DEFINITION

directive @grpc__wrap(gql: String!, proto: String!) repeatable on FIELD_DEFINITION

directive @key(fields: String!) repeatable on OBJECT

input grpc__Metadata {
  name: String!
  value: String
  valueFrom: String
}

input grpc__InputMap {
  sourceField: String!
  arg: String!
}

input grpc__Dataloader {
  key: String!
  listArgument: String!
  responseKey: String
}
"#;

/// A metadata header attached to every RPC call of a service: either a static
/// value or a value copied from the incoming request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRule {
    pub name: String,
    pub value: Option<String>,
    pub value_from: Option<String>,
}

/// One `@grpc(...)` service registration from the `grpc__Service` enum
#[derive(Debug, Clone)]
pub struct ServiceDecl {
    /// Logical name: the enum value the schema refers to
    pub name: String,
    /// Descriptor set file (binary FileDescriptorSet)
    pub proto_file: String,
    /// Fully-qualified protobuf service name
    pub service_name: String,
    /// Network address, host:port
    pub address: String,
    pub metadata: Vec<MetadataRule>,
}

/// One `mapArguments` entry: request field `arg` is filled from the resolved
/// source object's `source_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMap {
    pub source_field: String,
    pub arg: String,
}

/// Where a batched-fetch cache key is drawn from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchKey {
    /// `$source.<field>`: a field of the resolved parent object
    Source(String),
    /// `$args.<name>`: a call argument (or entity key field for entities)
    Args(String),
}

/// Batching parameters of a `@grpc__fetch(dataloader: ...)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataloaderParams {
    /// Raw key expression; see [`DataloaderParams::batch_key`]
    pub key: String,
    /// Repeated request field that receives the collected keys
    pub list_argument: String,
    /// Response field used to correlate items back to keys; positional when
    /// absent
    pub response_key: Option<String>,
}

impl DataloaderParams {
    /// Parse the key expression. `None` means the expression is malformed;
    /// the validator reports that, the resolver treats it as fatal.
    pub fn batch_key(&self) -> Option<BatchKey> {
        if let Some(field) = self.key.strip_prefix("$source.") {
            (!field.is_empty()).then(|| BatchKey::Source(field.to_string()))
        } else if let Some(arg) = self.key.strip_prefix("$args.") {
            (!arg.is_empty()).then(|| BatchKey::Args(arg.to_string()))
        } else {
            None
        }
    }
}

/// A `@grpc__fetch` binding of a field (or entity type) to one RPC call
#[derive(Debug, Clone)]
pub struct FetchDirective {
    pub service: String,
    pub rpc: String,
    pub dig: Option<String>,
    pub map_arguments: Vec<InputMap>,
    pub dataloader: Option<DataloaderParams>,
}

/// One `@grpc__wrap(gql:, proto:)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapPair {
    pub gql: String,
    pub proto: String,
}

pub fn find<'a>(
    directives: &'a [Positioned<ConstDirective>],
    name: &str,
) -> Option<&'a ConstDirective> {
    directives
        .iter()
        .map(|d| &d.node)
        .find(|d| d.name.node == name)
}

fn find_all<'a>(
    directives: &'a [Positioned<ConstDirective>],
    name: &str,
) -> impl Iterator<Item = &'a ConstDirective> {
    let name = name.to_string();
    directives
        .iter()
        .map(|d| &d.node)
        .filter(move |d| d.name.node == name)
}

/// A required string (or enum-valued) argument; absence is a grammar
/// violation and therefore fatal.
fn require_str(directive: &ConstDirective, arg: &str) -> Result<String> {
    opt_str(directive, arg)?.ok_or_else(|| {
        Error::Schema(format!(
            "@{} is missing required argument `{}`",
            directive.name.node, arg
        ))
    })
}

fn opt_str(directive: &ConstDirective, arg: &str) -> Result<Option<String>> {
    match directive.get_argument(arg).map(|v| &v.node) {
        None | Some(ConstValue::Null) => Ok(None),
        Some(ConstValue::String(s)) => Ok(Some(s.clone())),
        Some(ConstValue::Enum(name)) => Ok(Some(name.to_string())),
        Some(other) => Err(Error::Schema(format!(
            "@{}({}: ...) expects a string, got {}",
            directive.name.node, arg, other
        ))),
    }
}

fn object_str(obj: &async_graphql::indexmap::IndexMap<async_graphql::Name, ConstValue>, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(ConstValue::String(s)) => Some(s.clone()),
        Some(ConstValue::Enum(name)) => Some(name.to_string()),
        _ => None,
    }
}

/// Parse a `@grpc__fetch` off a field's or object type's directive list
pub fn fetch_directive(directives: &[Positioned<ConstDirective>]) -> Result<Option<FetchDirective>> {
    let Some(directive) = find(directives, "grpc__fetch") else {
        return Ok(None);
    };

    let service = require_str(directive, "service")?;
    let rpc = require_str(directive, "rpc")?;
    let dig = opt_str(directive, "dig")?;

    let mut map_arguments = Vec::new();
    if let Some(value) = directive.get_argument("mapArguments") {
        let ConstValue::List(items) = &value.node else {
            return Err(Error::Schema(
                "@grpc__fetch(mapArguments: ...) expects a list".to_string(),
            ));
        };
        for item in items {
            let ConstValue::Object(obj) = item else {
                return Err(Error::Schema(
                    "mapArguments entries must be grpc__InputMap objects".to_string(),
                ));
            };
            let (Some(source_field), Some(arg)) =
                (object_str(obj, "sourceField"), object_str(obj, "arg"))
            else {
                return Err(Error::Schema(
                    "grpc__InputMap requires sourceField and arg".to_string(),
                ));
            };
            map_arguments.push(InputMap { source_field, arg });
        }
    }

    let dataloader = match directive.get_argument("dataloader").map(|v| &v.node) {
        None | Some(ConstValue::Null) => None,
        Some(ConstValue::Object(obj)) => {
            let (Some(key), Some(list_argument)) =
                (object_str(obj, "key"), object_str(obj, "listArgument"))
            else {
                return Err(Error::Schema(
                    "grpc__Dataloader requires key and listArgument".to_string(),
                ));
            };
            Some(DataloaderParams {
                key,
                list_argument,
                response_key: object_str(obj, "responseKey"),
            })
        }
        Some(_) => {
            return Err(Error::Schema(
                "@grpc__fetch(dataloader: ...) expects a grpc__Dataloader object".to_string(),
            ))
        }
    };

    Ok(Some(FetchDirective {
        service,
        rpc,
        dig,
        map_arguments,
        dataloader,
    }))
}

/// `@grpc__renamed(from:)`, if present
pub fn renamed_from(directives: &[Positioned<ConstDirective>]) -> Result<Option<String>> {
    match find(directives, "grpc__renamed") {
        Some(directive) => Ok(Some(require_str(directive, "from")?)),
        None => Ok(None),
    }
}

/// All `@grpc__wrap(gql:, proto:)` applications, in declaration order
pub fn wrap_pairs(directives: &[Positioned<ConstDirective>]) -> Result<Vec<WrapPair>> {
    find_all(directives, "grpc__wrap")
        .map(|directive| {
            Ok(WrapPair {
                gql: require_str(directive, "gql")?,
                proto: require_str(directive, "proto")?,
            })
        })
        .collect()
}

/// All `@key(fields: "a b")` entity key declarations. Each declaration is a
/// whitespace-separated composite key.
pub fn entity_keys(directives: &[Positioned<ConstDirective>]) -> Result<Vec<Vec<String>>> {
    find_all(directives, "key")
        .map(|directive| {
            let fields = require_str(directive, "fields")?;
            Ok(fields.split_whitespace().map(String::from).collect())
        })
        .collect()
}

/// Parse the `@grpc` registration off a `grpc__Service` enum value
pub fn service_decl(
    value_name: &str,
    directives: &[Positioned<ConstDirective>],
) -> Result<Option<ServiceDecl>> {
    let Some(directive) = find(directives, "grpc") else {
        return Ok(None);
    };

    let mut metadata = Vec::new();
    if let Some(value) = directive.get_argument("metadata") {
        let ConstValue::List(items) = &value.node else {
            return Err(Error::Schema(
                "@grpc(metadata: ...) expects a list".to_string(),
            ));
        };
        for item in items {
            let ConstValue::Object(obj) = item else {
                return Err(Error::Schema(
                    "metadata entries must be grpc__Metadata objects".to_string(),
                ));
            };
            let Some(name) = object_str(obj, "name") else {
                return Err(Error::Schema("grpc__Metadata requires name".to_string()));
            };
            metadata.push(MetadataRule {
                name,
                value: object_str(obj, "value"),
                value_from: object_str(obj, "valueFrom"),
            });
        }
    }

    Ok(Some(ServiceDecl {
        name: value_name.to_string(),
        proto_file: require_str(directive, "protoFile")?,
        service_name: require_str(directive, "serviceName")?,
        address: require_str(directive, "address")?,
        metadata,
    }))
}

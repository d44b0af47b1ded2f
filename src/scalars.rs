//! Scalar compatibility between GraphQL built-ins and protobuf field kinds

use prost_reflect::{FieldDescriptor, Kind};

/// Whether a GraphQL scalar accepts values of the given protobuf kind.
///
/// ID maps to string only; String additionally accepts bytes; Int accepts
/// every integer kind regardless of width or sign; Float accepts both float
/// widths. Any other pairing is incompatible.
pub fn scalar_accepts(gql_scalar: &str, kind: &Kind) -> bool {
    match gql_scalar {
        "ID" => matches!(kind, Kind::String),
        "String" => matches!(kind, Kind::String | Kind::Bytes),
        "Int" => matches!(
            kind,
            Kind::Int32
                | Kind::Int64
                | Kind::Uint32
                | Kind::Uint64
                | Kind::Sint32
                | Kind::Sint64
                | Kind::Fixed32
                | Kind::Fixed64
                | Kind::Sfixed32
                | Kind::Sfixed64
        ),
        "Float" => matches!(kind, Kind::Float | Kind::Double),
        "Boolean" => matches!(kind, Kind::Bool),
        _ => false,
    }
}

/// Whether the name is one of the GraphQL built-in scalars
pub fn is_builtin_scalar(name: &str) -> bool {
    matches!(name, "ID" | "String" | "Int" | "Float" | "Boolean")
}

/// Debug name for a protobuf kind, in the descriptor.proto spelling
/// (`TYPE_STRING`, `TYPE_INT32`, ...) used by error messages.
pub fn proto_kind_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Double => "TYPE_DOUBLE",
        Kind::Float => "TYPE_FLOAT",
        Kind::Int64 => "TYPE_INT64",
        Kind::Uint64 => "TYPE_UINT64",
        Kind::Int32 => "TYPE_INT32",
        Kind::Fixed64 => "TYPE_FIXED64",
        Kind::Fixed32 => "TYPE_FIXED32",
        Kind::Bool => "TYPE_BOOL",
        Kind::String => "TYPE_STRING",
        Kind::Bytes => "TYPE_BYTES",
        Kind::Uint32 => "TYPE_UINT32",
        Kind::Sfixed32 => "TYPE_SFIXED32",
        Kind::Sfixed64 => "TYPE_SFIXED64",
        Kind::Sint32 => "TYPE_SINT32",
        Kind::Sint64 => "TYPE_SINT64",
        Kind::Message(_) => "TYPE_MESSAGE",
        Kind::Enum(_) => "TYPE_ENUM",
    }
}

/// GraphQL scalar name synthesized for a protobuf scalar field.
///
/// String fields whose name ends in `id` or `ids` become `ID`, matching the
/// convention most services use for identifiers.
pub fn proto_scalar_to_graphql(field: &FieldDescriptor) -> Option<&'static str> {
    Some(match field.kind() {
        Kind::Double | Kind::Float => "Float",
        Kind::Int32
        | Kind::Int64
        | Kind::Uint32
        | Kind::Uint64
        | Kind::Sint32
        | Kind::Sint64
        | Kind::Fixed32
        | Kind::Fixed64
        | Kind::Sfixed32
        | Kind::Sfixed64 => "Int",
        Kind::Bool => "Boolean",
        Kind::Bytes => "String",
        Kind::String => {
            if field.name().ends_with("id") || field.name().ends_with("ids") {
                "ID"
            } else {
                "String"
            }
        }
        Kind::Message(_) | Kind::Enum(_) => return None,
    })
}

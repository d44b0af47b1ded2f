//! Conversions between dynamic protobuf messages and GraphQL values
//!
//! Response messages become GraphQL objects keyed by protobuf field names;
//! renames and wraps are applied later, at field-resolution time, so the
//! conversion itself stays schema-agnostic. Request construction goes the
//! other way: the caller hands an object tree whose keys are already protobuf
//! field names.

use crate::error::{Error, Result};
use async_graphql::indexmap::IndexMap;
use async_graphql::{Name, Value as ConstValue};
use base64::Engine;
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, ReflectMessage, Value,
};
use serde_json::Number;

/// Convert a response message into a GraphQL object value. Every declared
/// field is present, unset fields carrying their protobuf default.
pub fn message_to_value(msg: &DynamicMessage) -> ConstValue {
    let mut object = IndexMap::new();
    for field in msg.descriptor().fields() {
        let value = proto_to_value(msg.get_field(&field).as_ref(), &field);
        object.insert(Name::new(field.name()), value);
    }
    ConstValue::Object(object)
}

/// Convert one protobuf value. The field descriptor supplies enum and map
/// entry context.
pub fn proto_to_value(value: &Value, field: &FieldDescriptor) -> ConstValue {
    match value {
        Value::Bool(b) => ConstValue::Boolean(*b),
        Value::I32(n) => ConstValue::Number((*n).into()),
        Value::I64(n) => ConstValue::Number((*n).into()),
        Value::U32(n) => ConstValue::Number((*n).into()),
        Value::U64(n) => ConstValue::Number((*n).into()),
        Value::F32(n) => Number::from_f64(f64::from(*n))
            .map(ConstValue::Number)
            .unwrap_or(ConstValue::Null),
        Value::F64(n) => Number::from_f64(*n)
            .map(ConstValue::Number)
            .unwrap_or(ConstValue::Null),
        Value::String(s) => ConstValue::String(s.clone()),
        Value::Bytes(b) => {
            ConstValue::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        Value::EnumNumber(number) => match field.kind() {
            Kind::Enum(en) => match en.get_value(*number) {
                Some(v) => ConstValue::String(v.name().to_string()),
                None => ConstValue::String(number.to_string()),
            },
            _ => ConstValue::Number((*number).into()),
        },
        Value::Message(msg) => message_to_value(msg),
        Value::List(items) => ConstValue::List(
            items
                .iter()
                .map(|item| proto_to_value(item, field))
                .collect(),
        ),
        Value::Map(map) => {
            let mut object = IndexMap::new();
            let Kind::Message(entry) = field.kind() else {
                return ConstValue::Null;
            };
            let value_field = entry.map_entry_value_field();
            for (key, value) in map {
                object.insert(
                    Name::new(map_key_string(key)),
                    proto_to_value(value, &value_field),
                );
            }
            ConstValue::Object(object)
        }
    }
}

fn map_key_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::I32(n) => n.to_string(),
        MapKey::I64(n) => n.to_string(),
        MapKey::U32(n) => n.to_string(),
        MapKey::U64(n) => n.to_string(),
        MapKey::String(s) => s.clone(),
    }
}

/// Build a request message from an object tree whose keys are protobuf field
/// names. Keys with no matching request field are ignored.
pub fn build_message(
    desc: &MessageDescriptor,
    entries: &IndexMap<Name, ConstValue>,
) -> Result<DynamicMessage> {
    let mut msg = DynamicMessage::new(desc.clone());
    for (name, value) in entries {
        let Some(field) = desc.get_field_by_name(name.as_str()) else {
            continue;
        };
        if matches!(value, ConstValue::Null) {
            continue;
        }
        msg.set_field(&field, value_to_proto(value, &field)?);
    }
    Ok(msg)
}

/// Convert one GraphQL value into a protobuf value for the given field
pub fn value_to_proto(value: &ConstValue, field: &FieldDescriptor) -> Result<Value> {
    if field.is_map() {
        let ConstValue::Object(entries) = value else {
            return Err(Error::InvalidRequest(format!(
                "field {} expects a map",
                field.name()
            )));
        };
        let Kind::Message(entry) = field.kind() else {
            return Err(Error::Internal(format!(
                "map field {} has no entry type",
                field.name()
            )));
        };
        let key_field = entry.map_entry_key_field();
        let value_field = entry.map_entry_value_field();
        let mut map = std::collections::HashMap::new();
        for (key, item) in entries {
            map.insert(
                parse_map_key(key.as_str(), &key_field)?,
                value_to_proto(item, &value_field)?,
            );
        }
        return Ok(Value::Map(map));
    }

    if field.is_list() {
        let items = match value {
            ConstValue::List(items) => items
                .iter()
                .map(|item| scalar_to_proto(item, field))
                .collect::<Result<Vec<_>>>()?,
            // single values coerce to one-element lists, as in GraphQL input
            // coercion
            other => vec![scalar_to_proto(other, field)?],
        };
        return Ok(Value::List(items));
    }

    scalar_to_proto(value, field)
}

fn scalar_to_proto(value: &ConstValue, field: &FieldDescriptor) -> Result<Value> {
    let mismatch = || {
        Error::InvalidRequest(format!(
            "cannot convert {value} for request field {}",
            field.name()
        ))
    };

    match field.kind() {
        Kind::Bool => match value {
            ConstValue::Boolean(b) => Ok(Value::Bool(*b)),
            _ => Err(mismatch()),
        },
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            let n = as_i64(value).ok_or_else(mismatch)?;
            Ok(Value::I32(i32::try_from(n).map_err(|_| mismatch())?))
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            Ok(Value::I64(as_i64(value).ok_or_else(mismatch)?))
        }
        Kind::Uint32 | Kind::Fixed32 => {
            let n = as_u64(value).ok_or_else(mismatch)?;
            Ok(Value::U32(u32::try_from(n).map_err(|_| mismatch())?))
        }
        Kind::Uint64 | Kind::Fixed64 => Ok(Value::U64(as_u64(value).ok_or_else(mismatch)?)),
        Kind::Float => Ok(Value::F32(as_f64(value).ok_or_else(mismatch)? as f32)),
        Kind::Double => Ok(Value::F64(as_f64(value).ok_or_else(mismatch)?)),
        Kind::String => match value {
            ConstValue::String(s) => Ok(Value::String(s.clone())),
            ConstValue::Enum(name) => Ok(Value::String(name.to_string())),
            ConstValue::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(mismatch()),
        },
        Kind::Bytes => match value {
            ConstValue::String(s) => Ok(Value::Bytes(
                base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(|_| mismatch())?
                    .into(),
            )),
            ConstValue::Binary(b) => Ok(Value::Bytes(b.clone())),
            _ => Err(mismatch()),
        },
        Kind::Enum(en) => {
            let name = match value {
                ConstValue::String(s) => s.clone(),
                ConstValue::Enum(name) => name.to_string(),
                _ => return Err(mismatch()),
            };
            en.values()
                .find(|v| v.name() == name)
                .map(|v| Value::EnumNumber(v.number()))
                .ok_or_else(|| {
                    Error::InvalidRequest(format!(
                        "{name} is not a value of enum {}",
                        en.name()
                    ))
                })
        }
        Kind::Message(desc) => match value {
            ConstValue::Object(entries) => Ok(Value::Message(build_message(&desc, entries)?)),
            _ => Err(mismatch()),
        },
    }
}

fn parse_map_key(key: &str, field: &FieldDescriptor) -> Result<MapKey> {
    let bad = || Error::InvalidRequest(format!("invalid map key `{key}`"));
    match field.kind() {
        Kind::String => Ok(MapKey::String(key.to_string())),
        Kind::Bool => Ok(MapKey::Bool(key.parse().map_err(|_| bad())?)),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            Ok(MapKey::I32(key.parse().map_err(|_| bad())?))
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            Ok(MapKey::I64(key.parse().map_err(|_| bad())?))
        }
        Kind::Uint32 | Kind::Fixed32 => Ok(MapKey::U32(key.parse().map_err(|_| bad())?)),
        Kind::Uint64 | Kind::Fixed64 => Ok(MapKey::U64(key.parse().map_err(|_| bad())?)),
        _ => Err(bad()),
    }
}

fn as_i64(value: &ConstValue) -> Option<i64> {
    match value {
        ConstValue::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn as_u64(value: &ConstValue) -> Option<u64> {
    match value {
        ConstValue::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn as_f64(value: &ConstValue) -> Option<f64> {
    match value {
        ConstValue::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Follow a dotted path through object values, the value-level counterpart of
/// digging through message descriptors. `None` when any segment misses.
pub fn dig_value(value: &ConstValue, path: &str) -> Option<ConstValue> {
    let mut current = value;
    for segment in path.split('.') {
        match current {
            ConstValue::Object(entries) => current = entries.get(segment)?,
            _ => return None,
        }
    }
    Some(current.clone())
}

/// A GraphQL value with structural equality and hashing, usable as a batch
/// cache key. Object entries compare order-independently.
#[derive(Debug, Clone)]
pub struct NormalizedValue {
    value: ConstValue,
    canonical: String,
}

impl NormalizedValue {
    pub fn new(value: ConstValue) -> Self {
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical);
        Self { value, canonical }
    }

    pub fn value(&self) -> &ConstValue {
        &self.value
    }
}

impl PartialEq for NormalizedValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for NormalizedValue {}

impl std::hash::Hash for NormalizedValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

fn write_canonical(value: &ConstValue, out: &mut String) {
    match value {
        ConstValue::Null => out.push_str("null"),
        ConstValue::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        ConstValue::Number(n) => out.push_str(&n.to_string()),
        ConstValue::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        ConstValue::Enum(name) => out.push_str(name.as_str()),
        ConstValue::Binary(b) => {
            out.push_str("b:");
            out.push_str(&base64::engine::general_purpose::STANDARD.encode(b));
        }
        ConstValue::List(items) => {
            out.push('[');
            for item in items {
                write_canonical(item, out);
                out.push(',');
            }
            out.push(']');
        }
        ConstValue::Object(entries) => {
            let mut keys: Vec<_> = entries.keys().collect();
            keys.sort();
            out.push('{');
            for key in keys {
                out.push_str(key.as_str());
                out.push(':');
                write_canonical(&entries[key.as_str()], out);
                out.push(',');
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::DescriptorPool;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{
        DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
        FileDescriptorProto, FileDescriptorSet,
    };

    fn field(
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

    fn pool() -> DescriptorPool {
        let file = FileDescriptorProto {
            name: Some("items.proto".to_string()),
            package: Some("items".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Item".to_string()),
                field: vec![
                    field("id", 1, Type::String, None, false),
                    field("count", 2, Type::Int32, None, false),
                    field("state", 3, Type::Enum, Some(".items.State"), false),
                    field("tags", 4, Type::String, None, true),
                ],
                ..Default::default()
            }],
            enum_type: vec![EnumDescriptorProto {
                name: Some("State".to_string()),
                value: vec![
                    EnumValueDescriptorProto {
                        name: Some("STATE_UNKNOWN".to_string()),
                        number: Some(0),
                        ..Default::default()
                    },
                    EnumValueDescriptorProto {
                        name: Some("STATE_ACTIVE".to_string()),
                        number: Some(1),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![file] })
            .expect("valid descriptor set")
    }

    #[test]
    fn test_message_to_value_includes_defaults_and_enum_names() {
        let pool = pool();
        let desc = pool.get_message_by_name("items.Item").unwrap();
        let mut msg = DynamicMessage::new(desc.clone());
        msg.set_field_by_name("id", Value::String("a1".to_string()));
        msg.set_field_by_name("state", Value::EnumNumber(1));

        let ConstValue::Object(obj) = message_to_value(&msg) else {
            panic!("expected object");
        };
        assert_eq!(obj["id"], ConstValue::String("a1".to_string()));
        assert_eq!(obj["count"], ConstValue::Number(0.into()));
        assert_eq!(obj["state"], ConstValue::String("STATE_ACTIVE".to_string()));
        assert_eq!(obj["tags"], ConstValue::List(vec![]));
    }

    #[test]
    fn test_build_message_roundtrips_fields() {
        let pool = pool();
        let desc = pool.get_message_by_name("items.Item").unwrap();

        let mut entries = IndexMap::new();
        entries.insert(Name::new("id"), ConstValue::String("a1".to_string()));
        entries.insert(Name::new("count"), ConstValue::Number(3.into()));
        entries.insert(Name::new("state"), ConstValue::String("STATE_ACTIVE".to_string()));
        entries.insert(
            Name::new("tags"),
            ConstValue::List(vec![ConstValue::String("x".to_string())]),
        );
        entries.insert(Name::new("unknown"), ConstValue::String("ignored".to_string()));

        let msg = build_message(&desc, &entries).unwrap();
        assert_eq!(
            msg.get_field_by_name("id").unwrap().as_str(),
            Some("a1")
        );
        assert_eq!(msg.get_field_by_name("count").unwrap().as_i32(), Some(3));
        assert_eq!(
            msg.get_field_by_name("state").unwrap().as_enum_number(),
            Some(1)
        );
    }

    #[test]
    fn test_single_value_coerces_to_list() {
        let pool = pool();
        let desc = pool.get_message_by_name("items.Item").unwrap();
        let tags = desc.get_field_by_name("tags").unwrap();
        let value = value_to_proto(&ConstValue::String("solo".to_string()), &tags).unwrap();
        assert_eq!(
            value,
            Value::List(vec![Value::String("solo".to_string())])
        );
    }

    #[test]
    fn test_unknown_enum_name_is_rejected() {
        let pool = pool();
        let desc = pool.get_message_by_name("items.Item").unwrap();
        let state = desc.get_field_by_name("state").unwrap();
        let err = value_to_proto(&ConstValue::String("NOPE".to_string()), &state).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn test_dig_value() {
        let value: ConstValue = ConstValue::from_json(serde_json::json!({
            "data": { "posts": [1, 2, 3] }
        }))
        .unwrap();
        assert_eq!(
            dig_value(&value, "data.posts"),
            Some(ConstValue::List(vec![
                ConstValue::Number(1.into()),
                ConstValue::Number(2.into()),
                ConstValue::Number(3.into()),
            ]))
        );
        assert_eq!(dig_value(&value, "data.missing"), None);
        assert_eq!(dig_value(&value, "data.posts.deeper"), None);
    }

    #[test]
    fn test_normalized_value_ignores_object_order() {
        let a = NormalizedValue::new(ConstValue::Object({
            let mut m = IndexMap::new();
            m.insert(Name::new("x"), ConstValue::Number(1.into()));
            m.insert(Name::new("y"), ConstValue::Number(2.into()));
            m
        }));
        let b = NormalizedValue::new(ConstValue::Object({
            let mut m = IndexMap::new();
            m.insert(Name::new("y"), ConstValue::Number(2.into()));
            m.insert(Name::new("x"), ConstValue::Number(1.into()));
            m
        }));
        assert_eq!(a, b);

        let c = NormalizedValue::new(ConstValue::String("x".to_string()));
        assert_ne!(a, c);
    }
}

//! Schema synthesis: SDL scaffolding generated from protobuf service
//! descriptors
//!
//! Every RPC becomes a `Mutation` field already annotated with
//! `@grpc__fetch`, response messages become object types, request messages
//! become arguments (with input object types for nested messages), and enums
//! carry the protobuf value names verbatim. The output is a starting point
//! meant to be hand-edited afterwards; a dummy `Query._removeMe` keeps it a
//! valid schema until real query fields exist.

use crate::descriptor::ProtoService;
use crate::directives::PRELUDE;
use crate::error::{Error, Result};
use crate::scalars::proto_scalar_to_graphql;
use async_graphql::indexmap::IndexMap;
use prost_reflect::{EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor};
use std::collections::HashSet;
use std::sync::Arc;

/// Synthesize SDL for the given services, in the order given
pub fn generate(services: &[Arc<ProtoService>]) -> Result<String> {
    let mut recorder = TypeRecorder::default();
    let mut mutation_fields = Vec::new();

    for service in services {
        for rpc in service.rpcs() {
            let args = recorder.request_args(&rpc.input(), service)?;
            let response = rpc.output();
            recorder.record_object(&response, response.name(), service)?;
            mutation_fields.push(format!(
                "  {name}{args}: {response}! @grpc__fetch(service: {service}, rpc: \"{name}\")",
                name = rpc.name(),
                args = args,
                response = response.name(),
                service = service.name,
            ));
        }
    }

    let mut out = String::new();
    out.push_str(PRELUDE);
    out.push('\n');
    out.push_str(&service_enum(services));
    out.push_str("\ntype Query {\n  _removeMe: String\n}\n");
    out.push_str("\ntype Mutation {\n");
    out.push_str(&mutation_fields.join("\n"));
    out.push_str("\n}\n");
    for def in recorder.defs.values() {
        out.push('\n');
        out.push_str(def);
    }
    Ok(out)
}

fn service_enum(services: &[Arc<ProtoService>]) -> String {
    let mut out = String::from("enum grpc__Service {\n");
    for service in services {
        let mut directive = format!(
            "@grpc(protoFile: \"{}\", serviceName: \"{}\", address: \"{}\"",
            escape(&service.proto_file),
            escape(&service.service_name),
            escape(&service.address),
        );
        if !service.metadata.is_empty() {
            let entries: Vec<String> = service
                .metadata
                .iter()
                .map(|rule| {
                    let mut entry = format!("{{name: \"{}\"", escape(&rule.name));
                    if let Some(value) = &rule.value {
                        entry.push_str(&format!(", value: \"{}\"", escape(value)));
                    }
                    if let Some(from) = &rule.value_from {
                        entry.push_str(&format!(", valueFrom: \"{}\"", escape(from)));
                    }
                    entry.push('}');
                    entry
                })
                .collect();
            directive.push_str(&format!(", metadata: [{}]", entries.join(", ")));
        }
        directive.push(')');
        out.push_str(&format!("  {} {}\n", service.name, directive));
    }
    out.push_str("}\n");
    out
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Accumulates emitted type definitions, keyed by GraphQL type name. A name
/// is marked seen before its fields are walked so recursive messages
/// terminate.
#[derive(Default)]
struct TypeRecorder {
    defs: IndexMap<String, String>,
    seen: HashSet<String>,
}

impl TypeRecorder {
    /// Argument list for a mutation field, e.g. `(id: ID, tags: [String])`.
    /// Empty request messages produce no parentheses.
    fn request_args(&mut self, request: &MessageDescriptor, service: &ProtoService) -> Result<String> {
        let mut args = Vec::new();
        for field in request.fields() {
            let ty = self.type_ref(&field, request, service, true)?;
            args.push(format!("{}: {}", field.name(), ty));
        }
        if args.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("({})", args.join(", ")))
        }
    }

    /// The GraphQL type reference for one protobuf field, recording any
    /// object/input/enum definitions it requires
    fn type_ref(
        &mut self,
        field: &FieldDescriptor,
        parent: &MessageDescriptor,
        service: &ProtoService,
        input: bool,
    ) -> Result<String> {
        let base = match field.kind() {
            Kind::Message(msg) => {
                let mut name = composed_name(&msg, parent);
                if input {
                    name.push_str("Input");
                    self.record_input(&msg, &name, service)?;
                } else {
                    self.record_object(&msg, &name, service)?;
                }
                name
            }
            Kind::Enum(en) => {
                let name = composed_enum_name(&en, parent);
                self.record_enum(&en, &name);
                name
            }
            _ => proto_scalar_to_graphql(field)
                .ok_or_else(|| {
                    Error::Descriptor(format!("field {} has no scalar mapping", field.name()))
                })?
                .to_string(),
        };

        if field.is_list() || field.is_map() {
            Ok(format!("[{base}]"))
        } else {
            Ok(base)
        }
    }

    fn record_object(
        &mut self,
        msg: &MessageDescriptor,
        name: &str,
        service: &ProtoService,
    ) -> Result<()> {
        if !self.seen.insert(name.to_string()) {
            return Ok(());
        }
        let mut body = String::new();
        for field in msg.fields() {
            let ty = self.type_ref(&field, msg, service, false)?;
            body.push_str(&format!("  {}: {}\n", field.name(), ty));
        }
        self.defs
            .insert(name.to_string(), format!("type {name} {{\n{body}}}\n"));
        Ok(())
    }

    fn record_input(
        &mut self,
        msg: &MessageDescriptor,
        name: &str,
        service: &ProtoService,
    ) -> Result<()> {
        if !self.seen.insert(name.to_string()) {
            return Ok(());
        }
        let mut body = String::new();
        for field in msg.fields() {
            let ty = self.type_ref(&field, msg, service, true)?;
            body.push_str(&format!("  {}: {}\n", field.name(), ty));
        }
        self.defs
            .insert(name.to_string(), format!("input {name} {{\n{body}}}\n"));
        Ok(())
    }

    fn record_enum(&mut self, en: &EnumDescriptor, name: &str) {
        if !self.seen.insert(name.to_string()) {
            return;
        }
        let mut body = String::new();
        for value in en.values() {
            body.push_str(&format!("  {}\n", value.name()));
        }
        self.defs
            .insert(name.to_string(), format!("enum {name} {{\n{body}}}\n"));
    }
}

/// Nested messages are prefixed with their lexical parent's name, matching
/// how references inside that parent see them.
fn composed_name(msg: &MessageDescriptor, parent: &MessageDescriptor) -> String {
    match msg.parent_message() {
        Some(p) if p.full_name() == parent.full_name() => {
            format!("{}_{}", parent.name(), msg.name())
        }
        _ => msg.name().to_string(),
    }
}

fn composed_enum_name(en: &EnumDescriptor, parent: &MessageDescriptor) -> String {
    match en.parent_message() {
        Some(p) if p.full_name() == parent.full_name() => {
            format!("{}_{}", parent.name(), en.name())
        }
        _ => en.name().to_string(),
    }
}

//! Compatibility validation: the schema-vs-message path walker
//!
//! Every fetch root is walked in parallel over the GraphQL type graph and the
//! protobuf message graph its RPC binds it to. The walk records every
//! structural mismatch it can reach instead of stopping at the first one, so
//! one run reports all problems. Recoverable mismatches become accumulated
//! [`ValidationError`]s; only schema-grammar violations (an unknown service,
//! an undefined type) abort the run.
//!
//! Two passes: pass one walks response shapes, simultaneously recording which
//! protobuf message types can act as the `$source` object of each nested
//! fetch root. Pass two validates every root's own inputs (arguments, input
//! maps, dataloader keys) against the request message and that recorded
//! source set. A mapping is accepted only when it is valid against every
//! possible source type.

use crate::descriptor::{ProtoService, ServiceRegistry};
use crate::error::{Error, Result};
use crate::report::{
    consolidate, ConsolidatedError, ErrorCode, Path, PathRoot, PathStep, ValidationError,
};
use crate::scalars::{is_builtin_scalar, proto_kind_name, scalar_accepts};
use crate::schema::{FetchRoot, FieldDef, ObjectDef, RootKind, SchemaIndex};
use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Validate a schema against the services declared in it. Returns the
/// consolidated error list; an empty list means the schema is compatible.
pub fn validate(
    index: &SchemaIndex,
    registry: &ServiceRegistry,
) -> Result<Vec<ConsolidatedError>> {
    let roots = index.fetch_roots();
    debug!(roots = roots.len(), "validating fetch roots");

    let mut walk = Walk {
        index,
        errors: Vec::new(),
        sources: HashMap::new(),
    };

    for root in &roots {
        walk.walk_root(root, registry)?;
    }
    for root in &roots {
        walk.check_inputs(root, registry)?;
    }

    Ok(consolidate(walk.errors))
}

/// Parse SDL, load its declared descriptor set files, and validate
pub fn validate_sdl(sdl: &str) -> Result<Vec<ConsolidatedError>> {
    let index = SchemaIndex::parse(sdl)?;
    let registry = ServiceRegistry::load(&index.services)?;
    validate(&index, &registry)
}

struct Walk<'a> {
    index: &'a SchemaIndex,
    errors: Vec<ValidationError>,
    /// Fetch root id -> protobuf message types observed as its `$source`
    sources: HashMap<(String, String), Vec<MessageDescriptor>>,
}

impl<'a> Walk<'a> {
    fn emit(&mut self, code: ErrorCode, key: String, message: String, path: Path) {
        self.errors.push(ValidationError {
            code,
            key,
            message,
            path,
        });
    }

    fn service(
        &self,
        root: &FetchRoot,
        registry: &'a ServiceRegistry,
    ) -> Result<&'a Arc<ProtoService>> {
        registry.get(&root.fetch.service).ok_or_else(|| {
            Error::Schema(format!("no service named {}", root.fetch.service))
        })
    }

    fn path_root(&self, root: &FetchRoot, service: &ProtoService) -> PathRoot {
        PathRoot {
            parent_type: root.parent_type.clone(),
            field_name: root.field_name.clone(),
            return_type: root.shape.display.clone(),
            service: service.short_name().to_string(),
            rpc: root.fetch.rpc.clone(),
        }
    }

    /// Pass one: walk one root's response shape
    fn walk_root(&mut self, root: &FetchRoot, registry: &ServiceRegistry) -> Result<()> {
        let service = self.service(root, registry)?.clone();
        let path_root = self.path_root(root, &service);

        let Some(rpc) = service.rpc(&root.fetch.rpc) else {
            self.emit(
                ErrorCode::MissingRpc,
                format!("{}/{}", service.short_name(), root.fetch.rpc),
                format!(
                    "rpc {} does not exist on service {}",
                    root.fetch.rpc,
                    service.short_name()
                ),
                Path::root_only(path_root),
            );
            return Ok(());
        };

        let mut message = rpc.output();
        if let Some(dig) = &root.fetch.dig {
            match service.dig_from(&message, dig) {
                Some(dug) => message = dug,
                None => {
                    self.emit(
                        ErrorCode::InvalidFetchDig,
                        format!("{}.{}", root.parent_type, root.field_name),
                        format!(
                            "{}.{} cannot dig `{}` from rpc {} return type {}",
                            root.parent_type,
                            root.field_name,
                            dig,
                            root.fetch.rpc,
                            rpc.output().name()
                        ),
                        Path::root_only(path_root),
                    );
                    return Ok(());
                }
            }
        }

        let index = self.index;
        if let Some(object) = index.object(&root.shape.name) {
            let mut visited = vec![root.shape.name.clone()];
            let mut steps = Vec::new();
            self.walk_object(object, &message, &service, &path_root, &mut steps, &mut visited)?;
        }
        Ok(())
    }

    fn walk_object(
        &mut self,
        object: &ObjectDef,
        message: &MessageDescriptor,
        service: &ProtoService,
        root: &PathRoot,
        steps: &mut Vec<PathStep>,
        visited: &mut Vec<String>,
    ) -> Result<()> {
        for field in object.fields.values() {
            // nested fetch roots are validated independently; only record
            // which message type acts as their source object
            if field.fetch.is_some() {
                let entry = self
                    .sources
                    .entry((object.name.clone(), field.name.clone()))
                    .or_default();
                if !entry.iter().any(|m| m.full_name() == message.full_name()) {
                    entry.push(message.clone());
                }
                continue;
            }

            if !field.wraps.is_empty() {
                self.walk_wrapped(object, field, message, service, root, steps, visited)?;
                continue;
            }

            self.walk_field(object, field, None, message, service, root, steps, visited)?;
        }
        Ok(())
    }

    /// A wrapped field assembles sub-fields from the parent message instead
    /// of matching one field by name: each pair binds a sub-field of the
    /// wrapping object type to a named field of the parent message.
    #[allow(clippy::too_many_arguments)]
    fn walk_wrapped(
        &mut self,
        object: &ObjectDef,
        field: &FieldDef,
        message: &MessageDescriptor,
        service: &ProtoService,
        root: &PathRoot,
        steps: &mut Vec<PathStep>,
        visited: &mut Vec<String>,
    ) -> Result<()> {
        let index = self.index;
        let wrapped = index.object(&field.shape.name);

        for pair in &field.wraps {
            if message.get_field_by_name(&pair.proto).is_none() {
                let mut path_steps = steps.clone();
                path_steps.push(PathStep {
                    gql_parent: object.name.clone(),
                    gql_field: field.name.clone(),
                    proto_message: message.name().to_string(),
                });
                self.emit(
                    ErrorCode::WrappedFieldNotFound,
                    format!("{}.{}({})", object.name, field.name, pair.proto),
                    format!(
                        "{}.{} wraps field {} which does not exist on {}",
                        object.name,
                        field.name,
                        pair.proto,
                        message.name()
                    ),
                    Path {
                        root: root.clone(),
                        steps: path_steps,
                    },
                );
                continue;
            }

            if let Some(wrapped) = wrapped {
                if let Some(sub_field) = wrapped.fields.get(&pair.gql) {
                    steps.push(PathStep {
                        gql_parent: object.name.clone(),
                        gql_field: field.name.clone(),
                        proto_message: message.name().to_string(),
                    });
                    self.walk_field(
                        wrapped,
                        sub_field,
                        Some(&pair.proto),
                        message,
                        service,
                        root,
                        steps,
                        visited,
                    )?;
                    steps.pop();
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_field(
        &mut self,
        parent: &ObjectDef,
        field: &FieldDef,
        proto_override: Option<&str>,
        message: &MessageDescriptor,
        service: &ProtoService,
        root: &PathRoot,
        steps: &mut Vec<PathStep>,
        visited: &mut Vec<String>,
    ) -> Result<()> {
        let index = self.index;

        steps.push(PathStep {
            gql_parent: parent.name.clone(),
            gql_field: field.name.clone(),
            proto_message: message.name().to_string(),
        });
        let path = |steps: &[PathStep]| Path {
            root: root.clone(),
            steps: steps.to_vec(),
        };

        let proto_name = proto_override.unwrap_or_else(|| field.proto_name());
        let Some(proto_field) = message.get_field_by_name(proto_name) else {
            let key = format!("{}.{}", message.name(), proto_name);
            let p = path(steps);
            self.emit(
                ErrorCode::MissingField,
                key.clone(),
                format!("{key} not found"),
                p,
            );
            steps.pop();
            return Ok(());
        };

        // the walk stops at a type it has already visited on this path; a
        // recursive field must be nullable since nothing deeper is verified
        if index.objects.contains_key(&field.shape.name) && visited.contains(&field.shape.name) {
            if field.shape.non_null {
                let p = path(steps);
                self.emit(
                    ErrorCode::NonNullableRecursiveField,
                    format!("{}.{}", parent.name, field.name),
                    format!(
                        "{}.{} is recursive and must be nullable",
                        parent.name, field.name
                    ),
                    p,
                );
            }
            steps.pop();
            return Ok(());
        }

        let proto_is_list = proto_field.is_list() || proto_field.is_map();
        if field.shape.is_list && !proto_is_list {
            let p = path(steps);
            self.emit(
                ErrorCode::ProtobufIsNotList,
                format!("{}.{}", parent.name, field.name),
                format!(
                    "{}.{} is a list, but {}.{} is not repeated",
                    parent.name,
                    field.name,
                    message.name(),
                    proto_field.name()
                ),
                p,
            );
        } else if !field.shape.is_list && proto_is_list {
            let p = path(steps);
            self.emit(
                ErrorCode::ProtobufIsList,
                format!("{}.{}", parent.name, field.name),
                format!(
                    "{}.{} is not a list, but {}.{} is repeated",
                    parent.name,
                    field.name,
                    message.name(),
                    proto_field.name()
                ),
                p,
            );
        }

        let type_name = field.shape.name.clone();
        if is_builtin_scalar(&type_name) || index.custom_scalars.contains(&type_name) {
            if !scalar_accepts(&type_name, &proto_field.kind()) {
                self.emit_incorrect_type(parent, field, message, &proto_field, root, steps);
            }
        } else if let Some(gql_enum) = index.enum_def(&type_name) {
            match proto_field.kind() {
                Kind::Enum(proto_enum) => {
                    let p = path(steps);
                    let proto_values: Vec<String> =
                        proto_enum.values().map(|v| v.name().to_string()).collect();
                    for value in &gql_enum.values {
                        if !proto_values.iter().any(|v| v == value.proto_name()) {
                            self.emit(
                                ErrorCode::ExtraneousEnumValue,
                                format!("{}.{}", gql_enum.name, value.name),
                                format!(
                                    "{}.{} not found in {}",
                                    gql_enum.name,
                                    value.name,
                                    proto_enum.name()
                                ),
                                p.clone(),
                            );
                        }
                    }
                    for proto_value in &proto_values {
                        if !gql_enum.values.iter().any(|v| v.proto_name() == proto_value) {
                            self.emit(
                                ErrorCode::MissingEnumValue,
                                format!("{}.{}", gql_enum.name, proto_value),
                                format!(
                                    "{} is missing value {}.{}",
                                    gql_enum.name,
                                    proto_enum.name(),
                                    proto_value
                                ),
                                p.clone(),
                            );
                        }
                    }
                }
                _ => self.emit_incorrect_type(parent, field, message, &proto_field, root, steps),
            }
        } else if let Some(object) = index.object(&type_name) {
            match proto_field.kind() {
                Kind::Message(next) => {
                    visited.push(type_name.clone());
                    self.walk_object(object, &next, service, root, steps, visited)?;
                    visited.pop();
                }
                _ => self.emit_incorrect_type(parent, field, message, &proto_field, root, steps),
            }
        } else if let Some(members) = index.unions.get(&type_name) {
            match proto_field.kind() {
                Kind::Message(next) => {
                    for member in members.clone() {
                        if let Some(object) = index.object(&member) {
                            visited.push(member.clone());
                            self.walk_object(object, &next, service, root, steps, visited)?;
                            visited.pop();
                        }
                    }
                }
                _ => self.emit_incorrect_type(parent, field, message, &proto_field, root, steps),
            }
        } else {
            // interface types carry no fetch mapping of their own; leave
            // their concrete implementors to be checked at their own roots
            debug!(
                field = %format!("{}.{}", parent.name, field.name),
                type_name = %type_name,
                "skipping field with unmapped type"
            );
        }

        steps.pop();
        Ok(())
    }

    fn emit_incorrect_type(
        &mut self,
        parent: &ObjectDef,
        field: &FieldDef,
        message: &MessageDescriptor,
        proto_field: &FieldDescriptor,
        root: &PathRoot,
        steps: &[PathStep],
    ) {
        let key = format!("{}.{}", parent.name, field.name);
        self.emit(
            ErrorCode::IncorrectType,
            key.clone(),
            format!(
                "{key} returns a {}, but {}.{} returns a {}",
                field.shape.name,
                message.name(),
                proto_field.name(),
                proto_kind_name(&proto_field.kind())
            ),
            Path {
                root: root.clone(),
                steps: steps.to_vec(),
            },
        );
    }

    /// Pass two: arguments, input maps, and dataloader keys of one root
    fn check_inputs(&mut self, root: &FetchRoot, registry: &ServiceRegistry) -> Result<()> {
        let service = self.service(root, registry)?.clone();
        let Some(rpc) = service.rpc(&root.fetch.rpc) else {
            return Ok(()); // MissingRpc already reported
        };
        let request = rpc.input();
        let path = Path::root_only(self.path_root(root, &service));
        let coordinate = format!("{}.{}", root.parent_type, root.field_name);

        let batch_arg_key = root.fetch.dataloader.as_ref().and_then(|dl| {
            match dl.batch_key() {
                Some(crate::directives::BatchKey::Args(name)) => Some(name),
                _ => None,
            }
        });

        for arg in &root.args {
            if arg.name == "representations" {
                continue;
            }
            if batch_arg_key.as_deref() == Some(arg.name.as_str()) {
                continue;
            }

            let display = match &arg.renamed {
                Some(renamed) => format!("{renamed} (renamed from {})", arg.name),
                None => arg.name.clone(),
            };
            let Some(request_field) = request.get_field_by_name(arg.proto_name()) else {
                self.emit(
                    ErrorCode::IncorrectArgument,
                    format!("{coordinate}({})", arg.name),
                    format!(
                        "Argument {display} on {coordinate} does not exist on rpc {} request type {}",
                        root.fetch.rpc,
                        request.name()
                    ),
                    path.clone(),
                );
                continue;
            };

            let kind = request_field.kind();
            if is_builtin_scalar(&arg.shape.name)
                && !matches!(kind, Kind::Message(_) | Kind::Enum(_))
                && !scalar_accepts(&arg.shape.name, &kind)
            {
                self.emit(
                    ErrorCode::IncorrectArgument,
                    format!("{coordinate}({})", arg.name),
                    format!(
                        "Argument {display}:{} on {coordinate} does not match {}:{} on rpc {} request type {}",
                        arg.shape.name,
                        request_field.name(),
                        proto_kind_name(&kind),
                        root.fetch.rpc,
                        request.name()
                    ),
                    path.clone(),
                );
            }
        }

        self.check_input_maps(root, &request, &path, &coordinate);
        self.check_dataloader(root, &service, &rpc.output(), &request, &path, &coordinate);
        Ok(())
    }

    fn check_input_maps(
        &mut self,
        root: &FetchRoot,
        request: &MessageDescriptor,
        path: &Path,
        coordinate: &str,
    ) {
        let sources = self.sources.get(&root.id()).cloned().unwrap_or_default();

        for map in &root.fetch.map_arguments {
            let map_key = format!("{coordinate}({} => {})", map.source_field, map.arg);
            let request_field = request.get_field_by_name(&map.arg);

            if request_field.is_none() {
                self.emit(
                    ErrorCode::InputMapIncorrectArg,
                    map_key.clone(),
                    format!(
                        "{coordinate} (calling rpc {}) maps {} to request field {}.{}, but {}.{} does not exist",
                        root.fetch.rpc,
                        map.source_field,
                        request.name(),
                        map.arg,
                        request.name(),
                        map.arg
                    ),
                    path.clone(),
                );
            }

            // conservative: the source field must exist with a matching type
            // on every message observed as a possible source of this root
            for source in &sources {
                match source.get_field_by_name(&map.source_field) {
                    None => {
                        self.emit(
                            ErrorCode::InputMapMissingSourceField,
                            format!("{map_key} on {}", source.name()),
                            format!(
                                "{coordinate} (calling rpc {}) maps {} to request field {}.{}, but {} does not exist on {}",
                                root.fetch.rpc,
                                map.source_field,
                                request.name(),
                                map.arg,
                                map.source_field,
                                source.name()
                            ),
                            path.clone(),
                        );
                    }
                    Some(source_field) => {
                        if let Some(request_field) = &request_field {
                            let (a, b) = (source_field.kind(), request_field.kind());
                            if let (Some(fa), Some(fb)) = (kind_family(&a), kind_family(&b)) {
                                if fa != fb {
                                    self.emit(
                                        ErrorCode::InputMapIncorrectType,
                                        format!("{map_key} on {}", source.name()),
                                        format!(
                                            "{coordinate} (calling rpc {}) maps {}.{}:{} to request field {}.{}:{}, but the types do not match",
                                            root.fetch.rpc,
                                            source.name(),
                                            map.source_field,
                                            proto_kind_name(&a),
                                            request.name(),
                                            map.arg,
                                            proto_kind_name(&b)
                                        ),
                                        path.clone(),
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_dataloader(
        &mut self,
        root: &FetchRoot,
        service: &ProtoService,
        response: &MessageDescriptor,
        request: &MessageDescriptor,
        path: &Path,
        coordinate: &str,
    ) {
        let Some(dl) = &root.fetch.dataloader else {
            return;
        };

        match dl.batch_key() {
            None => {
                self.emit(
                    ErrorCode::DataloaderIncorrectKeyFormat,
                    coordinate.to_string(),
                    format!(
                        "Dataloader key `{}` must start with $source. or $args.",
                        dl.key
                    ),
                    path.clone(),
                );
            }
            Some(crate::directives::BatchKey::Source(field)) => {
                let sources = self.sources.get(&root.id()).cloned().unwrap_or_default();
                for source in &sources {
                    if source.get_field_by_name(&field).is_none() {
                        self.emit(
                            ErrorCode::DataloaderIncorrectSourceKey,
                            format!("{coordinate}({field}) on {}", source.name()),
                            format!(
                                "Dataloader cache key {field} does not exist on message {}",
                                source.name()
                            ),
                            path.clone(),
                        );
                    }
                }
            }
            Some(crate::directives::BatchKey::Args(name)) => match root.kind {
                RootKind::Entity => {
                    let declared: Vec<&str> = root
                        .entity_keys
                        .iter()
                        .flatten()
                        .map(String::as_str)
                        .collect();
                    if !declared.contains(&name.as_str()) {
                        self.emit(
                            ErrorCode::DataloaderIncorrectArgKey,
                            format!("{coordinate}({name})"),
                            format!(
                                "Dataloader cache key {name} does not match the @key directives ({})",
                                declared.join(", ")
                            ),
                            path.clone(),
                        );
                    }
                }
                RootKind::Field => {
                    if !root.args.iter().any(|a| a.name == name) {
                        self.emit(
                            ErrorCode::DataloaderIncorrectArgKey,
                            format!("{coordinate}({name})"),
                            format!(
                                "Dataloader cache key {name} does not match the arguments of {coordinate}"
                            ),
                            path.clone(),
                        );
                    }
                }
            },
        }

        match request.get_field_by_name(&dl.list_argument) {
            None => {
                self.emit(
                    ErrorCode::DataloaderIncorrectListArgument,
                    format!("{}.{}", request.name(), dl.list_argument),
                    format!(
                        "Field {} not found on {} for dataloader listArgument",
                        dl.list_argument,
                        request.name()
                    ),
                    path.clone(),
                );
            }
            Some(field) if !field.is_list() => {
                self.emit(
                    ErrorCode::DataloaderIncorrectListArgument,
                    format!("{}.{}", request.name(), dl.list_argument),
                    format!(
                        "Field {} on {} must be repeated to be a dataloader listArgument",
                        dl.list_argument,
                        request.name()
                    ),
                    path.clone(),
                );
            }
            Some(_) => {}
        }

        if let Some(response_key) = &dl.response_key {
            let target = root
                .fetch
                .dig
                .as_ref()
                .and_then(|dig| service.dig_from(response, dig))
                .unwrap_or_else(|| response.clone());
            if target.get_field_by_name(response_key).is_none() {
                self.emit(
                    ErrorCode::DataloaderIncorrectResponseKey,
                    format!("{}.{}", target.name(), response_key),
                    format!(
                        "Response key {response_key} not found on message {}",
                        target.name()
                    ),
                    path.clone(),
                );
            }
        }
    }
}

/// Protobuf scalar kinds grouped into the families the input-map check
/// compares. Message and enum kinds have no family and are skipped.
fn kind_family(kind: &Kind) -> Option<&'static str> {
    match kind {
        Kind::String | Kind::Bytes => Some("string"),
        Kind::Bool => Some("bool"),
        Kind::Float | Kind::Double => Some("float"),
        Kind::Message(_) | Kind::Enum(_) => None,
        _ => Some("int"),
    }
}

//! Executable schema construction: every field gets a resolution plan derived
//! from its mapping directives
//!
//! The SDL is compiled once into a dynamic schema. Each field resolver
//! interprets a precomputed [`FieldPlan`]: dispatch an RPC, register a key
//! with the request's batch dispatcher, project a renamed or wrapped field
//! from the parent value, or translate an enum value. Resolved protobuf
//! messages travel through execution as plain GraphQL values, so child
//! resolvers are ordinary object projections.

use crate::dataloader::{BatchDispatcher, BatchLoader};
use crate::descriptor::{ProtoService, RequestContext, ServiceRegistry};
use crate::directives::{BatchKey, FetchDirective, WrapPair};
use crate::error::{Error, Result};
use crate::schema::{FieldDef, SchemaIndex, TypeShape};
use crate::value::{self, NormalizedValue};
use async_graphql::dynamic::{
    Enum, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext,
    Scalar, Schema, TypeRef, Union,
};
use async_graphql::indexmap::IndexMap;
use async_graphql::{Name, Value as ConstValue};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Build the executable schema for an indexed SDL document and its loaded
/// services.
#[instrument(skip_all)]
pub fn build_schema(index: &SchemaIndex, registry: &ServiceRegistry) -> Result<Schema> {
    let entity_plans = entity_plans(index, registry)?;
    let federated = !entity_plans.is_empty();

    let mutation = index
        .mutation_type
        .as_deref()
        .filter(|name| index.objects.contains_key(*name));
    let mut builder = Schema::build(index.query_type.as_str(), mutation, None);

    for object in index.objects.values() {
        let mut dynamic_object = Object::new(object.name.clone());
        for field in object.fields.values() {
            dynamic_object = dynamic_object.field(make_field(field, index, registry)?);
        }

        if federated && object.name == index.query_type {
            dynamic_object = dynamic_object
                .field(entities_field(Arc::new(entity_plans.clone())))
                .field(service_field());
        }
        builder = builder.register(dynamic_object);
    }

    for en in index.enums.values() {
        let mut dynamic_enum = Enum::new(en.name.clone());
        for value in &en.values {
            dynamic_enum = dynamic_enum.item(value.name.clone());
        }
        builder = builder.register(dynamic_enum);
    }

    for input in index.input_objects.values() {
        let mut dynamic_input = InputObject::new(input.name.clone());
        for field in &input.fields {
            dynamic_input =
                dynamic_input.field(InputValue::new(field.name.clone(), type_ref(&field.shape)));
        }
        builder = builder.register(dynamic_input);
    }

    for scalar in &index.custom_scalars {
        builder = builder.register(Scalar::new(scalar.clone()));
    }

    for (name, members) in &index.unions {
        let mut dynamic_union = Union::new(name.clone());
        for member in members {
            dynamic_union = dynamic_union.possible_type(member.clone());
        }
        builder = builder.register(dynamic_union);
    }

    if federated {
        builder = builder.data(ServiceSdl(crate::federation::federated_sdl(index)?));
        builder = builder.register(Scalar::new("_Any"));
        let mut entity_union = Union::new("_Entity");
        for type_name in entity_plans.keys() {
            entity_union = entity_union.possible_type(type_name.clone());
        }
        builder = builder.register(entity_union);
        builder = builder.register(
            Object::new("_Service").field(Field::new("sdl", TypeRef::named(TypeRef::STRING), |ctx| {
                FieldFuture::new(async move {
                    let sdl = ctx.data::<ServiceSdl>()?;
                    Ok(Some(FieldValue::value(sdl.0.clone())))
                })
            })),
        );
    }

    debug!(objects = index.objects.len(), federated, "building executable schema");
    builder
        .finish()
        .map_err(|e| Error::Schema(format!("schema build failed: {e}")))
}

fn type_ref(shape: &TypeShape) -> TypeRef {
    let base = TypeRef::Named(shape.name.clone().into());
    let inner = if shape.is_list {
        TypeRef::List(Box::new(base))
    } else {
        base
    };
    if shape.non_null {
        TypeRef::NonNull(Box::new(inner))
    } else {
        inner
    }
}

/// The SDL served by `_service { sdl }`, stored in schema data
struct ServiceSdl(String);

fn make_field(field: &FieldDef, index: &SchemaIndex, registry: &ServiceRegistry) -> Result<Field> {
    let plan = Arc::new(make_plan(field, index, registry)?);
    let mut dynamic_field = Field::new(field.name.clone(), type_ref(&field.shape), move |ctx| {
        let plan = plan.clone();
        FieldFuture::new(async move { plan.resolve(ctx).await })
    });
    for arg in &field.args {
        dynamic_field =
            dynamic_field.argument(InputValue::new(arg.name.clone(), type_ref(&arg.shape)));
    }
    Ok(dynamic_field)
}

struct ArgPlan {
    name: String,
    proto_name: String,
    /// GraphQL enum value name -> protobuf enum value name
    enum_reverse: Option<HashMap<String, String>>,
}

enum FieldPlan {
    /// Plain projection from the parent value
    Project { key: String },
    /// `@grpc__renamed`: project the protobuf-named field
    Rename { from: String },
    /// Enum-typed projection applying the value rename map
    Enum {
        key: String,
        /// protobuf value name -> GraphQL value name
        map: HashMap<String, String>,
    },
    /// `@grpc__wrap`: assemble an object from sibling fields of the parent
    Wrap { pairs: Vec<WrapPair> },
    /// `@grpc__fetch` without batching: one RPC per resolution
    Fetch {
        service: Arc<ProtoService>,
        fetch: FetchDirective,
        args: Vec<ArgPlan>,
    },
    /// `@grpc__fetch(dataloader: ...)`: register with the request's batch
    Batch {
        service: Arc<ProtoService>,
        fetch: FetchDirective,
        response_type: String,
    },
}

fn make_plan(field: &FieldDef, index: &SchemaIndex, registry: &ServiceRegistry) -> Result<FieldPlan> {
    if let Some(fetch) = &field.fetch {
        let service = registry
            .get(&fetch.service)
            .ok_or_else(|| Error::Schema(format!("no service named {}", fetch.service)))?
            .clone();
        if fetch.dataloader.is_some() {
            return Ok(FieldPlan::Batch {
                service,
                fetch: fetch.clone(),
                response_type: field.shape.name.clone(),
            });
        }
        let args = field
            .args
            .iter()
            .map(|arg| ArgPlan {
                name: arg.name.clone(),
                proto_name: arg.proto_name().to_string(),
                enum_reverse: index.enum_def(&arg.shape.name).map(|en| {
                    en.values
                        .iter()
                        .map(|v| (v.name.clone(), v.proto_name().to_string()))
                        .collect()
                }),
            })
            .collect();
        return Ok(FieldPlan::Fetch {
            service,
            fetch: fetch.clone(),
            args,
        });
    }

    if !field.wraps.is_empty() {
        return Ok(FieldPlan::Wrap {
            pairs: field.wraps.clone(),
        });
    }

    if let Some(en) = index.enum_def(&field.shape.name) {
        return Ok(FieldPlan::Enum {
            key: field.proto_name().to_string(),
            map: en.rename_map(),
        });
    }

    if let Some(from) = &field.renamed {
        return Ok(FieldPlan::Rename { from: from.clone() });
    }

    Ok(FieldPlan::Project {
        key: field.name.clone(),
    })
}

impl FieldPlan {
    async fn resolve<'a>(
        self: Arc<Self>,
        ctx: ResolverContext<'a>,
    ) -> async_graphql::Result<Option<FieldValue<'a>>> {
        match &*self {
            FieldPlan::Project { key } => Ok(done(source_field(&ctx, key))),
            FieldPlan::Rename { from } => Ok(done(source_field(&ctx, from))),
            FieldPlan::Enum { key, map } => match source_field(&ctx, key) {
                ConstValue::Null => Ok(None),
                ConstValue::List(items) => Ok(done(ConstValue::List(
                    items.into_iter().map(|item| rename_symbol(item, map)).collect(),
                ))),
                other => Ok(done(rename_symbol(other, map))),
            },
            FieldPlan::Wrap { pairs } => {
                let mut object = IndexMap::new();
                for pair in pairs {
                    object.insert(Name::new(&pair.gql), source_field(&ctx, &pair.proto));
                }
                Ok(done(ConstValue::Object(object)))
            }
            FieldPlan::Fetch {
                service,
                fetch,
                args,
            } => {
                let entries = if fetch.map_arguments.is_empty() {
                    call_args(&ctx, args)
                } else {
                    let mut entries = IndexMap::new();
                    for map in &fetch.map_arguments {
                        entries.insert(Name::new(&map.arg), source_field(&ctx, &map.source_field));
                    }
                    entries
                };
                let request_ctx = ctx.data::<RequestContext>()?;
                let result = single_fetch(service, fetch, entries, request_ctx).await?;
                Ok(done(result))
            }
            FieldPlan::Batch {
                service,
                fetch,
                response_type,
            } => {
                let params = fetch
                    .dataloader
                    .as_ref()
                    .ok_or_else(|| async_graphql::Error::new("missing dataloader parameters"))?;
                let key = match params.batch_key() {
                    Some(BatchKey::Source(field)) => source_field(&ctx, &field),
                    Some(BatchKey::Args(name)) => {
                        ctx.args.as_index_map().get(name.as_str()).cloned().unwrap_or(ConstValue::Null)
                    }
                    None => {
                        return Err(async_graphql::Error::new(format!(
                            "dataloader key `{}` must start with $source. or $args.",
                            params.key
                        )))
                    }
                };
                if key == ConstValue::Null {
                    return Ok(None);
                }

                let dispatcher = ctx.data::<BatchDispatcher>()?;
                let request_ctx = ctx.data::<RequestContext>()?.clone();
                let loader = dispatcher.loader(response_type, || {
                    BatchLoader::new(service.clone(), fetch.clone(), request_ctx)
                });
                let loaded = loader
                    .load_one(NormalizedValue::new(key))
                    .await
                    .map_err(|e| async_graphql::Error::new(e.to_string()))?;
                Ok(loaded.and_then(done))
            }
        }
    }
}

/// Perform one unbatched fetch: build the request from already-proto-named
/// entries, invoke, convert, and apply the dig path.
async fn single_fetch(
    service: &Arc<ProtoService>,
    fetch: &FetchDirective,
    entries: IndexMap<Name, ConstValue>,
    request_ctx: &RequestContext,
) -> async_graphql::Result<ConstValue> {
    let rpc = service.rpc(&fetch.rpc).ok_or_else(|| {
        async_graphql::Error::new(format!(
            "no rpc named {} on service {}",
            fetch.rpc, service.service_name
        ))
    })?;
    let request = value::build_message(&rpc.input(), &entries).map_err(Error::into_field_error)?;
    let response = service
        .invoke(&fetch.rpc, request, request_ctx)
        .await
        .map_err(Error::into_field_error)?;
    let mut result = value::message_to_value(&response);
    if let Some(dig) = &fetch.dig {
        result = value::dig_value(&result, dig).unwrap_or(ConstValue::Null);
    }
    Ok(result)
}

/// Project one field out of the parent value
fn source_field(ctx: &ResolverContext<'_>, key: &str) -> ConstValue {
    match ctx.parent_value.as_value() {
        Some(ConstValue::Object(entries)) => entries.get(key).cloned().unwrap_or(ConstValue::Null),
        _ => ConstValue::Null,
    }
}

/// Collect call arguments into request entries, applying argument renames and
/// reverse enum value mappings
fn call_args(ctx: &ResolverContext<'_>, args: &[ArgPlan]) -> IndexMap<Name, ConstValue> {
    let provided = ctx.args.as_index_map();
    let mut entries = IndexMap::new();
    for plan in args {
        let Some(mut value) = provided.get(plan.name.as_str()).cloned() else {
            continue;
        };
        if let Some(reverse) = &plan.enum_reverse {
            value = reverse_enum(value, reverse);
        }
        entries.insert(Name::new(&plan.proto_name), value);
    }
    entries
}

/// Apply the proto-to-GraphQL enum value rename to one symbol. Lists are
/// handled by the caller so nested non-symbol values pass through untouched.
fn rename_symbol(value: ConstValue, map: &HashMap<String, String>) -> ConstValue {
    let raw = match value {
        ConstValue::String(s) => s,
        ConstValue::Enum(name) => name.to_string(),
        other => return other,
    };
    ConstValue::Enum(Name::new(map.get(&raw).cloned().unwrap_or(raw)))
}

fn reverse_enum(value: ConstValue, reverse: &HashMap<String, String>) -> ConstValue {
    match value {
        ConstValue::Enum(name) => {
            let proto = reverse
                .get(name.as_str())
                .cloned()
                .unwrap_or_else(|| name.to_string());
            ConstValue::String(proto)
        }
        ConstValue::String(s) => {
            let proto = reverse.get(&s).cloned().unwrap_or(s);
            ConstValue::String(proto)
        }
        ConstValue::List(items) => ConstValue::List(
            items
                .into_iter()
                .map(|item| reverse_enum(item, reverse))
                .collect(),
        ),
        other => other,
    }
}

fn done(value: ConstValue) -> Option<FieldValue<'static>> {
    match value {
        ConstValue::Null => None,
        other => Some(FieldValue::value(other)),
    }
}

/// Per-entity-type resolution plan for `_entities`
#[derive(Clone)]
struct EntityPlan {
    service: Arc<ProtoService>,
    fetch: FetchDirective,
    type_name: String,
}

fn entity_plans(
    index: &SchemaIndex,
    registry: &ServiceRegistry,
) -> Result<HashMap<String, EntityPlan>> {
    let mut plans = HashMap::new();
    for object in index.objects.values() {
        let Some(fetch) = &object.fetch else { continue };
        let service = registry
            .get(&fetch.service)
            .ok_or_else(|| Error::Schema(format!("no service named {}", fetch.service)))?
            .clone();
        plans.insert(
            object.name.clone(),
            EntityPlan {
                service,
                fetch: fetch.clone(),
                type_name: object.name.clone(),
            },
        );
    }
    Ok(plans)
}

/// `Query._entities(representations: [_Any!]!): [_Entity]!`. Fans out over
/// the representations, resolves each through its type's fetch binding, and
/// returns results in input order tagged with their concrete type.
fn entities_field(plans: Arc<HashMap<String, EntityPlan>>) -> Field {
    let mut field = Field::new(
        "_entities",
        TypeRef::NonNull(Box::new(TypeRef::List(Box::new(TypeRef::Named(
            "_Entity".into(),
        ))))),
        move |ctx| {
            let plans = plans.clone();
            FieldFuture::new(async move {
                let representations = match ctx.args.as_index_map().get("representations") {
                    Some(ConstValue::List(reps)) => reps.clone(),
                    _ => Vec::new(),
                };

                let futures = representations.into_iter().map(|rep| {
                    let plans = plans.clone();
                    let ctx = &ctx;
                    async move { resolve_entity(ctx, &plans, rep).await }
                });
                let resolved: Vec<FieldValue<'static>> = join_all(futures)
                    .await
                    .into_iter()
                    .collect::<async_graphql::Result<Vec<_>>>()?;
                Ok(Some(FieldValue::list(resolved)))
            })
        },
    );
    field = field.argument(InputValue::new(
        "representations",
        TypeRef::NonNull(Box::new(TypeRef::List(Box::new(TypeRef::NonNull(
            Box::new(TypeRef::Named("_Any".into())),
        ))))),
    ));
    field
}

async fn resolve_entity(
    ctx: &ResolverContext<'_>,
    plans: &HashMap<String, EntityPlan>,
    representation: ConstValue,
) -> async_graphql::Result<FieldValue<'static>> {
    let ConstValue::Object(rep) = representation else {
        return Ok(FieldValue::NULL);
    };
    let Some(ConstValue::String(type_name)) = rep.get("__typename").cloned() else {
        return Err(async_graphql::Error::new(
            "representation is missing __typename",
        ));
    };
    let Some(plan) = plans.get(&type_name) else {
        return Err(async_graphql::Error::new(format!(
            "no entity fetch configured for type {type_name}"
        )));
    };

    let request_ctx = ctx.data::<RequestContext>()?;
    let resolved = match &plan.fetch.dataloader {
        Some(params) => {
            // representation fields are both the `$args` key space and the
            // `$source` object for entity lookups
            let key = match params.batch_key() {
                Some(BatchKey::Args(name)) | Some(BatchKey::Source(name)) => {
                    rep.get(name.as_str()).cloned().unwrap_or(ConstValue::Null)
                }
                None => {
                    return Err(async_graphql::Error::new(format!(
                        "dataloader key `{}` must start with $source. or $args.",
                        params.key
                    )))
                }
            };
            if key == ConstValue::Null {
                return Ok(FieldValue::NULL);
            }
            let dispatcher = ctx.data::<BatchDispatcher>()?;
            let loader = dispatcher.loader(&plan.type_name, || {
                BatchLoader::new(plan.service.clone(), plan.fetch.clone(), request_ctx.clone())
            });
            loader
                .load_one(NormalizedValue::new(key))
                .await
                .map_err(|e| async_graphql::Error::new(e.to_string()))?
                .unwrap_or(ConstValue::Null)
        }
        None => {
            let mut entries = IndexMap::new();
            if plan.fetch.map_arguments.is_empty() {
                for (name, value) in &rep {
                    if name.as_str() != "__typename" {
                        entries.insert(name.clone(), value.clone());
                    }
                }
            } else {
                for map in &plan.fetch.map_arguments {
                    entries.insert(
                        Name::new(&map.arg),
                        rep.get(map.source_field.as_str())
                            .cloned()
                            .unwrap_or(ConstValue::Null),
                    );
                }
            }
            single_fetch(&plan.service, &plan.fetch, entries, request_ctx).await?
        }
    };

    match resolved {
        ConstValue::Null => Ok(FieldValue::NULL),
        value => Ok(FieldValue::value(value).with_type(type_name)),
    }
}

fn service_field() -> Field {
    // the sdl itself lives in schema data; this just provides the container
    Field::new("_service", TypeRef::named_nn("_Service"), |_ctx| {
        FieldFuture::new(async move {
            Ok(Some(FieldValue::value(ConstValue::Object(IndexMap::new()))))
        })
    })
}

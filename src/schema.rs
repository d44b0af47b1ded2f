//! Indexed view over a parsed GraphQL SDL document
//!
//! Both the validator and the resolver need the same lookups: object fields
//! with their directive bindings, enum rename maps, service declarations, and
//! the set of fetch roots. [`SchemaIndex`] builds all of that once from the
//! SDL and is immutable afterwards.

use crate::directives::{self, FetchDirective, ServiceDecl, WrapPair};
use crate::error::{Error, Result};
use async_graphql::indexmap::IndexMap;
use async_graphql::parser::types::{
    BaseType, ServiceDocument, Type, TypeKind, TypeSystemDefinition,
};
use async_graphql::parser::parse_schema;
use std::collections::HashMap;

/// The shape of a GraphQL type reference: named type plus outer list/non-null
/// markers. Inner list nullability is not tracked; the validator only needs
/// list-ness and outer nullability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeShape {
    pub name: String,
    pub is_list: bool,
    pub non_null: bool,
    /// Original type text, e.g. `[_Entity]!`
    pub display: String,
}

impl TypeShape {
    pub fn of(ty: &Type) -> Self {
        let non_null = !ty.nullable;
        let (name, is_list) = Self::unwrap(&ty.base);
        Self {
            name,
            is_list,
            non_null,
            display: ty.to_string(),
        }
    }

    fn unwrap(base: &BaseType) -> (String, bool) {
        match base {
            BaseType::Named(name) => (name.to_string(), false),
            BaseType::List(inner) => (Self::unwrap(&inner.base).0, true),
        }
    }

    /// A bare named reference, used for synthesized roots like entity types
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_list: false,
            non_null: false,
            display: name.to_string(),
        }
    }
}

/// An argument of an object field
#[derive(Debug, Clone)]
pub struct ArgDef {
    pub name: String,
    pub shape: TypeShape,
    /// `@grpc__renamed(from:)`: the protobuf request field this argument maps to
    pub renamed: Option<String>,
}

impl ArgDef {
    /// The protobuf request field name this argument targets
    pub fn proto_name(&self) -> &str {
        self.renamed.as_deref().unwrap_or(&self.name)
    }
}

/// A field of an object type with its parsed mapping directives
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub shape: TypeShape,
    pub args: Vec<ArgDef>,
    pub fetch: Option<FetchDirective>,
    pub renamed: Option<String>,
    pub wraps: Vec<WrapPair>,
}

impl FieldDef {
    /// The protobuf field name this field matches against
    pub fn proto_name(&self) -> &str {
        self.renamed.as_deref().unwrap_or(&self.name)
    }
}

/// An object type definition
#[derive(Debug, Clone)]
pub struct ObjectDef {
    pub name: String,
    pub fields: IndexMap<String, FieldDef>,
    /// Type-level `@grpc__fetch` (federation entity resolution)
    pub fetch: Option<FetchDirective>,
    /// `@key(fields:)` declarations
    pub keys: Vec<Vec<String>>,
}

/// An input object type definition, kept for executable-schema registration
#[derive(Debug, Clone)]
pub struct InputObjectDef {
    pub name: String,
    pub fields: Vec<ArgDef>,
}

/// One GraphQL enum value with its optional protobuf rename
#[derive(Debug, Clone)]
pub struct EnumValueDef {
    pub name: String,
    pub renamed_from: Option<String>,
}

impl EnumValueDef {
    pub fn proto_name(&self) -> &str {
        self.renamed_from.as_deref().unwrap_or(&self.name)
    }
}

/// A GraphQL enum definition
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<EnumValueDef>,
}

impl EnumDef {
    /// Map from protobuf enum value name to GraphQL value name
    pub fn rename_map(&self) -> HashMap<String, String> {
        self.values
            .iter()
            .map(|v| (v.proto_name().to_string(), v.name.clone()))
            .collect()
    }
}

/// Which schema element a fetch root is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// An ordinary field with `@grpc__fetch`
    Field,
    /// An object type with `@key` + type-level `@grpc__fetch`; resolved
    /// through `Query._entities`
    Entity,
}

/// A schema element bound to one RPC call
#[derive(Debug, Clone)]
pub struct FetchRoot {
    pub kind: RootKind,
    /// Containing type for field roots; the entity type itself for entities
    pub parent_type: String,
    pub field_name: String,
    /// The GraphQL return type the walk starts from
    pub shape: TypeShape,
    pub args: Vec<ArgDef>,
    pub fetch: FetchDirective,
    /// Declared `@key` field sets (entities only)
    pub entity_keys: Vec<Vec<String>>,
}

impl FetchRoot {
    /// Stable identity used to record possible source message types
    pub fn id(&self) -> (String, String) {
        (self.parent_type.clone(), self.field_name.clone())
    }
}

/// Immutable index over one SDL document
pub struct SchemaIndex {
    pub doc: ServiceDocument,
    pub objects: IndexMap<String, ObjectDef>,
    pub enums: IndexMap<String, EnumDef>,
    pub unions: IndexMap<String, Vec<String>>,
    pub input_objects: IndexMap<String, InputObjectDef>,
    pub custom_scalars: Vec<String>,
    pub services: Vec<ServiceDecl>,
    pub query_type: String,
    pub mutation_type: Option<String>,
}

impl SchemaIndex {
    pub fn parse(sdl: &str) -> Result<Self> {
        let doc = parse_schema(sdl).map_err(|e| Error::Schema(e.to_string()))?;
        Self::build(doc)
    }

    pub fn build(doc: ServiceDocument) -> Result<Self> {
        let mut objects = IndexMap::new();
        let mut enums = IndexMap::new();
        let mut unions = IndexMap::new();
        let mut input_objects = IndexMap::new();
        let mut custom_scalars = Vec::new();
        let mut services = Vec::new();
        let mut query_type = "Query".to_string();
        let mut mutation_type = None;

        for def in &doc.definitions {
            match def {
                TypeSystemDefinition::Schema(schema) => {
                    if let Some(query) = &schema.node.query {
                        query_type = query.node.to_string();
                    }
                    if let Some(mutation) = &schema.node.mutation {
                        mutation_type = Some(mutation.node.to_string());
                    }
                }
                TypeSystemDefinition::Type(ty) => {
                    let name = ty.node.name.node.to_string();
                    match &ty.node.kind {
                        TypeKind::Object(obj) => {
                            let mut fields = IndexMap::new();
                            for field in &obj.fields {
                                let field = &field.node;
                                let mut args = Vec::new();
                                for arg in &field.arguments {
                                    let arg = &arg.node;
                                    args.push(ArgDef {
                                        name: arg.name.node.to_string(),
                                        shape: TypeShape::of(&arg.ty.node),
                                        renamed: directives::renamed_from(&arg.directives)?,
                                    });
                                }
                                let def = FieldDef {
                                    name: field.name.node.to_string(),
                                    shape: TypeShape::of(&field.ty.node),
                                    args,
                                    fetch: directives::fetch_directive(&field.directives)?,
                                    renamed: directives::renamed_from(&field.directives)?,
                                    wraps: directives::wrap_pairs(&field.directives)?,
                                };
                                fields.insert(def.name.clone(), def);
                            }
                            objects.insert(
                                name.clone(),
                                ObjectDef {
                                    name: name.clone(),
                                    fields,
                                    fetch: directives::fetch_directive(&ty.node.directives)?,
                                    keys: directives::entity_keys(&ty.node.directives)?,
                                },
                            );
                        }
                        TypeKind::Enum(en) => {
                            if name == "grpc__Service" {
                                for value in &en.values {
                                    let value = &value.node;
                                    if let Some(decl) = directives::service_decl(
                                        value.value.node.as_str(),
                                        &value.directives,
                                    )? {
                                        services.push(decl);
                                    }
                                }
                                continue;
                            }
                            let mut values = Vec::new();
                            for value in &en.values {
                                let value = &value.node;
                                values.push(EnumValueDef {
                                    name: value.value.node.to_string(),
                                    renamed_from: directives::renamed_from(&value.directives)?,
                                });
                            }
                            enums.insert(
                                name.clone(),
                                EnumDef {
                                    name: name.clone(),
                                    values,
                                },
                            );
                        }
                        TypeKind::Union(un) => {
                            unions.insert(
                                name.clone(),
                                un.members.iter().map(|m| m.node.to_string()).collect(),
                            );
                        }
                        TypeKind::InputObject(input) => {
                            let mut fields = Vec::new();
                            for field in &input.fields {
                                let field = &field.node;
                                fields.push(ArgDef {
                                    name: field.name.node.to_string(),
                                    shape: TypeShape::of(&field.ty.node),
                                    renamed: directives::renamed_from(&field.directives)?,
                                });
                            }
                            input_objects.insert(
                                name.clone(),
                                InputObjectDef {
                                    name: name.clone(),
                                    fields,
                                },
                            );
                        }
                        TypeKind::Scalar => custom_scalars.push(name.clone()),
                        TypeKind::Interface(_) => {}
                    }
                }
                TypeSystemDefinition::Directive(_) => {}
            }
        }

        Ok(Self {
            doc,
            objects,
            enums,
            unions,
            input_objects,
            custom_scalars,
            services,
            query_type,
            mutation_type,
        })
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        self.objects.get(name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.get(name)
    }

    /// Every fetch root in the schema: directive-marked fields plus federation
    /// entity types (object types carrying both `@key` and a type-level
    /// `@grpc__fetch`).
    pub fn fetch_roots(&self) -> Vec<FetchRoot> {
        let mut roots = Vec::new();

        for object in self.objects.values() {
            if let Some(fetch) = &object.fetch {
                roots.push(FetchRoot {
                    kind: RootKind::Entity,
                    parent_type: self.query_type.clone(),
                    field_name: "_entities".to_string(),
                    shape: TypeShape {
                        name: object.name.clone(),
                        is_list: false,
                        non_null: false,
                        display: "[_Entity]!".to_string(),
                    },
                    args: Vec::new(),
                    fetch: fetch.clone(),
                    entity_keys: object.keys.clone(),
                });
            }

            for field in object.fields.values() {
                if let Some(fetch) = &field.fetch {
                    roots.push(FetchRoot {
                        kind: RootKind::Field,
                        parent_type: object.name.clone(),
                        field_name: field.name.clone(),
                        shape: field.shape.clone(),
                        args: field.args.clone(),
                        fetch: fetch.clone(),
                        entity_keys: Vec::new(),
                    });
                }
            }
        }

        roots
    }
}

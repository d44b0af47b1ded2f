//! Conversions between plain SDL, federation-subgraph SDL, and the public
//! (mapping-free) contract
//!
//! The same schema exists in three renditions: the authored form with mapping
//! directives, a subgraph form served to federation gateways through
//! `_service { sdl }`, and a plain executable form where the federation
//! machinery types (`_Any`, `_Entity`, `_Service`) are spelled out. All three
//! are derived here by document surgery, then re-rendered by [`crate::print`].

use crate::error::{Error, Result};
use crate::print::print_document;
use crate::schema::SchemaIndex;
use async_graphql::parser::parse_schema;
use async_graphql::parser::types::{
    BaseType, FieldDefinition, InputValueDefinition, ObjectType, ServiceDocument, Type,
    TypeDefinition, TypeKind, TypeSystemDefinition, UnionType,
};
use async_graphql::{Name, Pos, Positioned};

/// The SDL served to federation gateways: the authored document with every
/// mapping directive and registry type removed, `@key` declarations kept.
pub fn federated_sdl(index: &SchemaIndex) -> Result<String> {
    Ok(print_document(&strip_mapping_doc(&index.doc)))
}

/// Remove all mapping directives and their supporting types, keeping the
/// GraphQL shape and `@key` declarations. This is the public contract of a
/// schema.
pub fn strip_mapping_sdl(sdl: &str) -> Result<String> {
    let doc = parse_schema(sdl).map_err(|e| Error::Schema(e.to_string()))?;
    Ok(print_document(&strip_mapping_doc(&doc)))
}

/// Spell out the federation machinery so the document stands alone: add
/// `_Any`, `_Entity`, `_Service`, and the `_entities`/`_service` query fields.
pub fn to_plain_sdl(sdl: &str) -> Result<String> {
    let mut doc = parse_schema(sdl).map_err(|e| Error::Schema(e.to_string()))?;
    let query_name = query_type_name(&doc);
    let entities = entity_type_names(&doc);

    let query = doc.definitions.iter_mut().find_map(|def| match def {
        TypeSystemDefinition::Type(ty) if ty.node.name.node == query_name.as_str() => {
            match &mut ty.node.kind {
                TypeKind::Object(object) => Some(object),
                _ => None,
            }
        }
        _ => None,
    });
    let Some(query) = query else {
        return Err(Error::Schema(format!(
            "schema has no query type named {query_name}"
        )));
    };

    if !entities.is_empty() {
        query.fields.push(pos(entities_field()));
    }
    query.fields.push(pos(field(
        "_service",
        Type {
            base: BaseType::Named(Name::new("_Service")),
            nullable: false,
        },
    )));

    if !entities.is_empty() {
        doc.definitions
            .push(type_def("_Any", TypeKind::Scalar));
        doc.definitions.push(type_def(
            "_Entity",
            TypeKind::Union(UnionType {
                members: entities.iter().map(|name| pos(Name::new(name))).collect(),
            }),
        ));
    }
    doc.definitions.push(type_def(
        "_Service",
        TypeKind::Object(ObjectType {
            implements: Vec::new(),
            fields: vec![pos(field(
                "sdl",
                Type {
                    base: BaseType::Named(Name::new("String")),
                    nullable: true,
                },
            ))],
        }),
    ));

    Ok(print_document(&doc))
}

/// Inverse of [`to_plain_sdl`]: drop the spelled-out federation machinery and
/// the mapping directives, leaving the subgraph form.
pub fn to_federated_sdl(sdl: &str) -> Result<String> {
    let mut doc = parse_schema(sdl).map_err(|e| Error::Schema(e.to_string()))?;
    let query_name = query_type_name(&doc);

    for def in &mut doc.definitions {
        let TypeSystemDefinition::Type(ty) = def else {
            continue;
        };
        if ty.node.name.node != query_name.as_str() {
            continue;
        }
        if let TypeKind::Object(object) = &mut ty.node.kind {
            object.fields.retain(|f| {
                f.node.name.node != "_entities" && f.node.name.node != "_service"
            });
        }
    }

    doc.definitions.retain(|def| match def {
        TypeSystemDefinition::Type(ty) => {
            let name = ty.node.name.node.as_str();
            if matches!(name, "_Any" | "_Entity" | "_Service") {
                return false;
            }
            // an emptied query type cannot be printed
            if name == query_name {
                if let TypeKind::Object(object) = &ty.node.kind {
                    return !object.fields.is_empty();
                }
            }
            true
        }
        _ => true,
    });

    Ok(print_document(&strip_mapping_doc(&doc)))
}

fn strip_mapping_doc(doc: &ServiceDocument) -> ServiceDocument {
    let mut doc = doc.clone();
    doc.definitions.retain(|def| match def {
        TypeSystemDefinition::Directive(directive) => {
            !directive.node.name.node.starts_with("grpc")
        }
        TypeSystemDefinition::Type(ty) => !ty.node.name.node.starts_with("grpc__"),
        TypeSystemDefinition::Schema(_) => true,
    });

    for def in &mut doc.definitions {
        let TypeSystemDefinition::Type(ty) = def else {
            continue;
        };
        strip_applied(&mut ty.node.directives);
        match &mut ty.node.kind {
            TypeKind::Object(object) => strip_fields(&mut object.fields),
            TypeKind::Interface(interface) => strip_fields(&mut interface.fields),
            TypeKind::Enum(en) => {
                for value in &mut en.values {
                    strip_applied(&mut value.node.directives);
                }
            }
            TypeKind::InputObject(input) => {
                for field in &mut input.fields {
                    strip_applied(&mut field.node.directives);
                }
            }
            TypeKind::Scalar | TypeKind::Union(_) => {}
        }
    }
    doc
}

fn strip_fields(fields: &mut [Positioned<FieldDefinition>]) {
    for field in fields {
        strip_applied(&mut field.node.directives);
        for arg in &mut field.node.arguments {
            strip_applied(&mut arg.node.directives);
        }
    }
}

fn strip_applied(directives: &mut Vec<Positioned<async_graphql::parser::types::ConstDirective>>) {
    directives.retain(|d| !d.node.name.node.starts_with("grpc"));
}

fn query_type_name(doc: &ServiceDocument) -> String {
    for def in &doc.definitions {
        if let TypeSystemDefinition::Schema(schema) = def {
            if let Some(query) = &schema.node.query {
                return query.node.to_string();
            }
        }
    }
    "Query".to_string()
}

fn entity_type_names(doc: &ServiceDocument) -> Vec<String> {
    let mut names = Vec::new();
    for def in &doc.definitions {
        let TypeSystemDefinition::Type(ty) = def else {
            continue;
        };
        if !matches!(ty.node.kind, TypeKind::Object(_)) {
            continue;
        }
        if ty.node.directives.iter().any(|d| d.node.name.node == "key") {
            names.push(ty.node.name.node.to_string());
        }
    }
    names
}

fn pos<T>(node: T) -> Positioned<T> {
    Positioned::new(node, Pos::default())
}

fn field(name: &str, ty: Type) -> FieldDefinition {
    FieldDefinition {
        description: None,
        name: pos(Name::new(name)),
        arguments: Vec::new(),
        ty: pos(ty),
        directives: Vec::new(),
    }
}

fn entities_field() -> FieldDefinition {
    let any = Type {
        base: BaseType::Named(Name::new("_Any")),
        nullable: false,
    };
    let representations = InputValueDefinition {
        description: None,
        name: pos(Name::new("representations")),
        ty: pos(Type {
            base: BaseType::List(Box::new(any)),
            nullable: false,
        }),
        default_value: None,
        directives: Vec::new(),
    };
    let entity = Type {
        base: BaseType::Named(Name::new("_Entity")),
        nullable: true,
    };
    FieldDefinition {
        description: None,
        name: pos(Name::new("_entities")),
        arguments: vec![pos(representations)],
        ty: pos(Type {
            base: BaseType::List(Box::new(entity)),
            nullable: false,
        }),
        directives: Vec::new(),
    }
}

fn type_def(name: &str, kind: TypeKind) -> TypeSystemDefinition {
    TypeSystemDefinition::Type(pos(TypeDefinition {
        extend: false,
        description: None,
        name: pos(Name::new(name)),
        directives: Vec::new(),
        kind,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
    directive @grpc__fetch(service: grpc__Service!, rpc: String!, dig: String) on FIELD_DEFINITION | OBJECT
    directive @key(fields: String!) repeatable on OBJECT

    enum grpc__Service {
      POSTS @grpc(protoFile: "posts.bin", serviceName: "posts.Posts", address: "localhost:50002")
    }

    type Query {
      posts: [Post] @grpc__fetch(service: POSTS, rpc: "ListPosts", dig: "posts")
    }

    type Post @key(fields: "id") @grpc__fetch(service: POSTS, rpc: "GetPost") {
      id: ID
      title: String @grpc__renamed(from: "subject")
    }
    "#;

    #[test]
    fn test_strip_removes_mapping_but_keeps_keys() {
        let stripped = strip_mapping_sdl(SDL).unwrap();
        assert!(!stripped.contains("grpc"));
        assert!(stripped.contains(r#"@key(fields: "id")"#));
        assert!(stripped.contains("title: String"));
        assert!(stripped.contains("posts: [Post]"));
    }

    #[test]
    fn test_plain_form_spells_out_federation_machinery() {
        let plain = to_plain_sdl(SDL).unwrap();
        assert!(plain.contains("_entities(representations: [_Any!]!): [_Entity]!"));
        assert!(plain.contains("_service: _Service!"));
        assert!(plain.contains("scalar _Any"));
        assert!(plain.contains("union _Entity = Post"));
        assert!(plain.contains("sdl: String"));
    }

    #[test]
    fn test_federated_form_drops_the_machinery_again() {
        let plain = to_plain_sdl(SDL).unwrap();
        let federated = to_federated_sdl(&plain).unwrap();
        assert!(!federated.contains("_entities"));
        assert!(!federated.contains("_Service"));
        assert!(!federated.contains("_Any"));
        assert!(!federated.contains("grpc"));
        assert!(federated.contains("posts: [Post]"));
        assert!(federated.contains(r#"@key(fields: "id")"#));
    }

    #[test]
    fn test_no_entities_means_no_entity_union() {
        let sdl = "type Query { hello: String }";
        let plain = to_plain_sdl(sdl).unwrap();
        assert!(!plain.contains("_Entity"));
        assert!(plain.contains("_service: _Service!"));
    }
}

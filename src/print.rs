//! SDL printer for parsed schema documents
//!
//! `async_graphql::parser` can parse SDL but offers no inverse, so the
//! federation conversions re-render documents here. Applied directives are
//! preserved verbatim, which is the whole point: the mapping directives must
//! survive a parse/print round trip.

use async_graphql::parser::types::{
    ConstDirective, DirectiveDefinition, EnumType, FieldDefinition, InputObjectType,
    InputValueDefinition, InterfaceType, ObjectType, SchemaDefinition, ServiceDocument,
    TypeDefinition, TypeKind, TypeSystemDefinition, UnionType,
};
use async_graphql::Positioned;
use std::fmt::Write;

/// Render a document back to SDL text
pub fn print_document(doc: &ServiceDocument) -> String {
    let mut out = String::new();
    let mut first = true;
    for def in &doc.definitions {
        if !first {
            out.push('\n');
        }
        first = false;
        match def {
            TypeSystemDefinition::Schema(schema) => print_schema(&mut out, &schema.node),
            TypeSystemDefinition::Type(ty) => print_type(&mut out, &ty.node),
            TypeSystemDefinition::Directive(directive) => {
                print_directive_definition(&mut out, &directive.node)
            }
        }
    }
    out
}

fn print_schema(out: &mut String, schema: &SchemaDefinition) {
    if schema.extend {
        out.push_str("extend ");
    }
    out.push_str("schema");
    print_directives(out, &schema.directives);
    out.push_str(" {\n");
    if let Some(query) = &schema.query {
        let _ = writeln!(out, "  query: {}", query.node);
    }
    if let Some(mutation) = &schema.mutation {
        let _ = writeln!(out, "  mutation: {}", mutation.node);
    }
    if let Some(subscription) = &schema.subscription {
        let _ = writeln!(out, "  subscription: {}", subscription.node);
    }
    out.push_str("}\n");
}

fn print_type(out: &mut String, ty: &TypeDefinition) {
    print_description(out, &ty.description, "");
    if ty.extend {
        out.push_str("extend ");
    }
    match &ty.kind {
        TypeKind::Scalar => {
            let _ = write!(out, "scalar {}", ty.name.node);
            print_directives(out, &ty.directives);
            out.push('\n');
        }
        TypeKind::Object(object) => {
            let _ = write!(out, "type {}", ty.name.node);
            print_object_body(out, &ty.directives, &object.implements, &object.fields);
        }
        TypeKind::Interface(interface) => {
            let _ = write!(out, "interface {}", ty.name.node);
            print_object_body(out, &ty.directives, &interface.implements, &interface.fields);
        }
        TypeKind::Union(union) => {
            let _ = write!(out, "union {}", ty.name.node);
            print_directives(out, &ty.directives);
            print_union_members(out, union);
        }
        TypeKind::Enum(en) => {
            let _ = write!(out, "enum {}", ty.name.node);
            print_directives(out, &ty.directives);
            print_enum_values(out, en);
        }
        TypeKind::InputObject(input) => {
            let _ = write!(out, "input {}", ty.name.node);
            print_directives(out, &ty.directives);
            print_input_fields(out, input);
        }
    }
}

fn print_object_body(
    out: &mut String,
    directives: &[Positioned<ConstDirective>],
    implements: &[Positioned<async_graphql::Name>],
    fields: &[Positioned<FieldDefinition>],
) {
    if !implements.is_empty() {
        let names: Vec<&str> = implements.iter().map(|n| n.node.as_str()).collect();
        let _ = write!(out, " implements {}", names.join(" & "));
    }
    print_directives(out, directives);
    out.push_str(" {\n");
    for field in fields {
        print_field(out, &field.node);
    }
    out.push_str("}\n");
}

fn print_field(out: &mut String, field: &FieldDefinition) {
    print_description(out, &field.description, "  ");
    let _ = write!(out, "  {}", field.name.node);
    print_arguments(out, &field.arguments);
    let _ = write!(out, ": {}", field.ty.node);
    print_directives(out, &field.directives);
    out.push('\n');
}

fn print_arguments(out: &mut String, arguments: &[Positioned<InputValueDefinition>]) {
    if arguments.is_empty() {
        return;
    }
    out.push('(');
    for (i, arg) in arguments.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        print_input_value(out, &arg.node);
    }
    out.push(')');
}

fn print_input_value(out: &mut String, value: &InputValueDefinition) {
    let _ = write!(out, "{}: {}", value.name.node, value.ty.node);
    if let Some(default) = &value.default_value {
        let _ = write!(out, " = {}", default.node);
    }
    print_directives(out, &value.directives);
}

fn print_union_members(out: &mut String, union: &UnionType) {
    let members: Vec<&str> = union.members.iter().map(|m| m.node.as_str()).collect();
    let _ = writeln!(out, " = {}", members.join(" | "));
}

fn print_enum_values(out: &mut String, en: &EnumType) {
    out.push_str(" {\n");
    for value in &en.values {
        print_description(out, &value.node.description, "  ");
        let _ = write!(out, "  {}", value.node.value.node);
        print_directives(out, &value.node.directives);
        out.push('\n');
    }
    out.push_str("}\n");
}

fn print_input_fields(out: &mut String, input: &InputObjectType) {
    out.push_str(" {\n");
    for field in &input.fields {
        print_description(out, &field.node.description, "  ");
        out.push_str("  ");
        print_input_value(out, &field.node);
        out.push('\n');
    }
    out.push_str("}\n");
}

fn print_directive_definition(out: &mut String, directive: &DirectiveDefinition) {
    print_description(out, &directive.description, "");
    let _ = write!(out, "directive @{}", directive.name.node);
    print_arguments(out, &directive.arguments);
    if directive.is_repeatable {
        out.push_str(" repeatable");
    }
    let locations: Vec<String> = directive
        .locations
        .iter()
        .map(|l| location_name(&format!("{:?}", l.node)))
        .collect();
    let _ = writeln!(out, " on {}", locations.join(" | "));
}

/// CamelCase variant name to the SDL spelling, e.g. `FieldDefinition` ->
/// `FIELD_DEFINITION`
fn location_name(variant: &str) -> String {
    let mut name = String::new();
    for (i, c) in variant.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            name.push('_');
        }
        name.push(c.to_ascii_uppercase());
    }
    name
}

fn print_directives(out: &mut String, directives: &[Positioned<ConstDirective>]) {
    for directive in directives {
        let _ = write!(out, " @{}", directive.node.name.node);
        if !directive.node.arguments.is_empty() {
            out.push('(');
            for (i, (name, value)) in directive.node.arguments.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: {}", name.node, value.node);
            }
            out.push(')');
        }
    }
}

fn print_description(out: &mut String, description: &Option<Positioned<String>>, indent: &str) {
    if let Some(description) = description {
        let _ = writeln!(out, "{indent}\"\"\"{}\"\"\"", description.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::parser::parse_schema;

    const SDL: &str = r#"
    directive @grpc__wrap(gql: String!, proto: String!) repeatable on FIELD_DEFINITION

    enum grpc__Service {
      POSTS @grpc(protoFile: "posts.bin", serviceName: "posts.Posts", address: "localhost:50002")
    }

    type Query {
      post(id: ID!): Post @grpc__fetch(service: POSTS, rpc: "GetPost", dig: "post")
    }

    type Post @key(fields: "id") {
      id: ID
      state: PostState
      meta: PostMeta @grpc__wrap(gql: "likes", proto: "like_count")
    }

    enum PostState {
      DRAFT @grpc__renamed(from: "POST_STATE_DRAFT")
    }

    union Content = Post

    input PostFilter {
      state: PostState
      limit: Int = 10
    }
    "#;

    #[test]
    fn test_print_is_stable_after_reparse() {
        let doc = parse_schema(SDL).unwrap();
        let printed = print_document(&doc);
        let reprinted = print_document(&parse_schema(&printed).unwrap());
        assert_eq!(printed, reprinted);
    }

    #[test]
    fn test_directives_survive_the_round_trip() {
        let doc = parse_schema(SDL).unwrap();
        let printed = print_document(&doc);

        assert!(printed.contains(r#"@grpc__fetch(service: POSTS, rpc: "GetPost", dig: "post")"#));
        assert!(printed.contains(r#"@grpc__renamed(from: "POST_STATE_DRAFT")"#));
        assert!(printed.contains(r#"@grpc__wrap(gql: "likes", proto: "like_count")"#));
        assert!(printed.contains(r#"@key(fields: "id")"#));
        assert!(printed
            .contains("directive @grpc__wrap(gql: String!, proto: String!) repeatable on FIELD_DEFINITION"));
        assert!(printed.contains("union Content = Post"));
        assert!(printed.contains("limit: Int = 10"));
        assert!(printed.contains("post(id: ID!): Post"));
    }
}

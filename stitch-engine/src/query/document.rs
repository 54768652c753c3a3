//! Prints a query tree as a GraphQL document.

use std::collections::BTreeMap;
use std::fmt::Write;

use itertools::Itertools;

use super::FieldId;
use super::FieldNode;
use super::QueryTree;
use crate::json_ext::Value;

/// Prints `tree` on a single line, e.g. `query { foo { baz } }`.
pub(crate) fn print(tree: &QueryTree, operation_name: Option<&str>) -> String {
    let mut document = String::from(tree.kind().as_str());
    if let Some(name) = operation_name {
        document.push(' ');
        document.push_str(name);
    }
    document.push(' ');
    print_selection_set(tree, None, tree.roots(), &mut document);
    document
}

/// Fields whose types cover every possible type of `parent` are printed as is, the rest are
/// grouped in `... on T` fragments. Root fields are never conditional.
fn print_selection_set(
    tree: &QueryTree,
    parent: Option<&FieldNode>,
    fields: &[FieldId],
    out: &mut String,
) {
    let mut unconditional = Vec::new();
    let mut fragments: BTreeMap<&String, Vec<&FieldNode>> = BTreeMap::new();
    for node in fields.iter().map(|id| tree.node(*id)) {
        let selected_everywhere = match parent {
            None => true,
            Some(parent) => {
                node.object_types.is_empty()
                    || (!parent.possible_types.is_empty()
                        && node.object_types.is_superset(&parent.possible_types))
            }
        };
        if selected_everywhere {
            unconditional.push(node);
        } else {
            for object_type in &node.object_types {
                fragments.entry(object_type).or_default().push(node);
            }
        }
    }

    out.push_str("{ ");
    for node in unconditional {
        print_field(tree, node, out);
        out.push(' ');
    }
    for (object_type, nodes) in fragments {
        let _ = write!(out, "... on {object_type} {{ ");
        for node in nodes {
            print_field(tree, node, out);
            out.push(' ');
        }
        out.push_str("} ");
    }
    out.push('}');
}

fn print_field(tree: &QueryTree, node: &FieldNode, out: &mut String) {
    if let Some(alias) = &node.alias {
        let _ = write!(out, "{alias}: ");
    }
    out.push_str(&node.name);
    if !node.arguments.is_empty() {
        let arguments = node
            .arguments
            .iter()
            .map(|(name, value)| format!("{}: {}", name.as_str(), print_value(value)))
            .join(", ");
        let _ = write!(out, "({arguments})");
    }
    if !node.children().is_empty() {
        out.push(' ');
        print_selection_set(tree, Some(node), node.children(), out);
    }
}

/// Prints a resolved argument as a GraphQL input literal.
fn print_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            serde_json::to_string(s.as_str()).unwrap_or_else(|_| format!("\"{}\"", s.as_str()))
        }
        Value::Array(items) => format!("[{}]", items.iter().map(print_value).join(", ")),
        Value::Object(object) => format!(
            "{{{}}}",
            object
                .iter()
                .map(|(key, value)| format!("{}: {}", key.as_str(), print_value(value)))
                .join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::query::Field;
    use crate::query::OperationKind;

    #[test]
    fn prints_plain_selections() {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("foo")
                .with_possible_types(["Foo"])
                .with_child(Field::new("baz").with_object_types(["Foo"]))],
        );
        insta::assert_snapshot!(print(&tree, None), @"query { foo { baz } }");
    }

    #[test]
    fn prints_aliases_arguments_and_operation_name() {
        let tree = QueryTree::from_fields(
            OperationKind::Mutation,
            [Field::new("createIssue")
                .with_alias("created")
                .with_argument(
                    "input",
                    json!({"title": "a \"quoted\" title", "labels": ["x", 1, true, null]}),
                )
                .with_child(Field::typename("typename__created"))],
        );
        insta::assert_snapshot!(
            print(&tree, Some("Create")),
            @r#"mutation Create { created: createIssue(input: {title: "a \"quoted\" title", labels: ["x", 1, true, null]}) { typename__created: __typename } }"#
        );
    }

    #[test]
    fn groups_type_specific_fields_in_fragments() {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("node")
                .with_possible_types(["Issue", "User"])
                .with_children([
                    Field::new("id").with_object_types(["Issue", "User"]),
                    Field::new("name").with_object_types(["User"]),
                    Field::new("title").with_object_types(["Issue"]),
                    Field::typename("kind"),
                ])],
        );
        insta::assert_snapshot!(
            print(&tree, None),
            @"query { node { id kind: __typename ... on Issue { title } ... on User { name } } }"
        );
    }

    #[test]
    fn keeps_the_type_condition_when_siblings_share_a_narrower_type() {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("node")
                .with_possible_types(["Issue", "User"])
                .with_child(Field::new("title").with_object_types(["Issue"]))],
        );
        insta::assert_snapshot!(
            print(&tree, None),
            @"query { node { ... on Issue { title } } }"
        );
    }

    #[test]
    fn unknown_possible_types_keep_type_conditions() {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("node").with_children([
                Field::new("id").with_object_types(["Issue"]),
                Field::typename("kind"),
            ])],
        );
        insta::assert_snapshot!(
            print(&tree, None),
            @"query { node { kind: __typename ... on Issue { id } } }"
        );
    }
}

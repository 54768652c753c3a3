//! Fields read from a nested path of the backend object.

use std::collections::BTreeSet;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::PlanningError;
use crate::instructions::FieldCoordinates;
use crate::json_ext::JsonNode;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::query::Field;
use crate::query::FieldNode;
use crate::result::ResultInstruction;
use crate::transform::FieldRewrite;
use crate::transform::FieldTransform;
use crate::transform::PlanningContext;
use crate::transform::ResultContext;
use crate::transform::RewriteContext;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DeepRenameState {
    groups: Vec<DeepRenameGroup>,
}

/// Object types sharing one backend path.
#[derive(Clone, Debug, PartialEq)]
struct DeepRenameGroup {
    alias: String,
    path: Vec<String>,
    object_types: BTreeSet<String>,
}

pub(crate) struct DeepRename;

#[async_trait]
impl FieldTransform for DeepRename {
    type State = DeepRenameState;

    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError> {
        let mut paths: IndexMap<Vec<String>, BTreeSet<String>> = IndexMap::new();
        let mut renamed = false;
        for object_type in &field.object_types {
            let coordinates = FieldCoordinates::new(object_type.as_str(), field.name.as_str());
            let path = match ctx.instructions.deep_rename(&coordinates) {
                Some(instruction) if instruction.path.is_empty() => {
                    return Err(PlanningError::MalformedInstruction {
                        coordinates: coordinates.to_string(),
                        reason: "deep rename path is empty".to_string(),
                    });
                }
                Some(instruction) => {
                    renamed = true;
                    instruction.path.clone()
                }
                None => vec![field.name.clone()],
            };
            paths.entry(path).or_default().insert(object_type.clone());
        }
        if !renamed {
            return Ok(None);
        }

        let tag = format!("deep_rename__{}", field.result_key());
        Ok(Some(DeepRenameState {
            groups: paths
                .into_iter()
                .map(|(path, object_types)| DeepRenameGroup {
                    alias: ctx.aliases.alias(&tag, &path.join("_")),
                    path,
                    object_types,
                })
                .collect(),
        }))
    }

    fn rewrite_field(
        &self,
        _ctx: &RewriteContext<'_>,
        field: Field,
        state: &Self::State,
    ) -> FieldRewrite {
        FieldRewrite::artificial(
            state
                .groups
                .iter()
                .filter_map(|group| {
                    // an earlier transform may have narrowed the field's types
                    let object_types: BTreeSet<String> = group
                        .object_types
                        .intersection(&field.object_types)
                        .cloned()
                        .collect();
                    if object_types.is_empty() {
                        return None;
                    }
                    let mut segments = group.path.iter().rev();
                    let innermost = segments.next().map(String::as_str).unwrap_or_default();
                    let mut nested = Field::new(innermost)
                        .with_arguments(field.arguments.clone())
                        .with_possible_types(field.possible_types.iter())
                        .with_children(field.children.clone());
                    for segment in segments {
                        nested = Field::new(segment.as_str()).with_child(nested);
                    }
                    nested.alias = Some(group.alias.clone());
                    nested.object_types = object_types;
                    Some(nested)
                })
                .collect(),
        )
    }

    async fn result_instructions(
        &self,
        _ctx: &ResultContext<'_>,
        field: &FieldNode,
        state: &Self::State,
        parents: &[JsonNode<'_>],
    ) -> Vec<ResultInstruction> {
        let mut instructions = Vec::new();
        for parent in parents {
            let Some(object) = parent.as_object() else {
                continue;
            };
            let target = parent.path.with_key(field.result_key());
            for group in &state.groups {
                if !object.contains_key(group.alias.as_str()) {
                    continue;
                }
                let mut from = parent.path.with_key(group.alias.as_str());
                from = from.join(&Path::from_keys(group.path.iter().skip(1).cloned()));
                instructions.push(ResultInstruction::Set {
                    path: target.clone(),
                    value: Value::Null,
                });
                instructions.push(ResultInstruction::Copy {
                    from,
                    to: target.clone(),
                });
            }
        }
        instructions
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::engine::ExecutionContext;
    use crate::instructions::InstructionSet;
    use crate::query::OperationKind;
    use crate::query::QueryTree;
    use crate::transform::test_support::PlanningFixture;

    fn fixture() -> PlanningFixture {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("issue").with_child(
                Field::new("ownerName").with_object_types(["Issue"]),
            )],
        );
        let instructions = InstructionSet::new().with_deep_rename(
            FieldCoordinates::new("Issue", "ownerName"),
            ["details", "owner", "name"],
        );
        PlanningFixture::new(tree, instructions, "issues")
    }

    #[test]
    fn rewrites_to_a_nested_aliased_path() {
        let fixture = fixture();
        let field = fixture.tree.field_at(&["issue", "ownerName"]).unwrap();
        let state = DeepRename
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();
        let rewrite = DeepRename.rewrite_field(
            &RewriteContext {
                service: &fixture.service,
            },
            fixture.tree.detach(field.id()),
            &state,
        );
        assert_eq!(
            rewrite.artificial_fields,
            vec![Field::new("details")
                .with_alias("deep_rename__ownerName__details_owner_name")
                .with_object_types(["Issue"])
                .with_child(Field::new("owner").with_child(Field::new("name")))]
        );
    }

    #[test(tokio::test)]
    async fn copies_the_nested_value() {
        let fixture = fixture();
        let field = fixture.tree.field_at(&["issue", "ownerName"]).unwrap();
        let state = DeepRename
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();
        let engine = fixture.engine();
        let execution = ExecutionContext::new(&engine, None, Default::default());
        let ctx = ResultContext {
            execution: &execution,
            service: &fixture.service,
            overall: &fixture.tree,
            transform_context: &fixture.transform_context,
        };
        let issue = json!({
            "deep_rename__ownerName__details_owner_name": {"owner": {"name": "Ada"}}
        });
        let parents = vec![JsonNode::new(Path::from("issue"), &issue)];
        assert_eq!(
            DeepRename
                .result_instructions(&ctx, field, &state, &parents)
                .await,
            vec![
                ResultInstruction::Set {
                    path: Path::from("issue/ownerName"),
                    value: Value::Null,
                },
                ResultInstruction::Copy {
                    from: Path::from("issue/deep_rename__ownerName__details_owner_name/owner/name"),
                    to: Path::from("issue/ownerName"),
                },
            ]
        );
    }
}

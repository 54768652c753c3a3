//! Fields whose backend name differs from their overall name.

use std::collections::BTreeSet;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::PlanningError;
use crate::instructions::FieldCoordinates;
use crate::json_ext::JsonNode;
use crate::query::Field;
use crate::query::FieldNode;
use crate::result::ResultInstruction;
use crate::transform::FieldRewrite;
use crate::transform::FieldTransform;
use crate::transform::PlanningContext;
use crate::transform::ResultContext;
use crate::transform::RewriteContext;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RenameState {
    /// The first group still selected replaces the field, the others are sent as artificial
    /// copies.
    groups: Vec<RenameGroup>,
}

/// Object types reading the field from the same backend name.
#[derive(Clone, Debug, PartialEq)]
struct RenameGroup {
    underlying: String,
    /// Response key of the group in the backend response.
    key: String,
    /// Alias to send; `None` sends the field unaliased.
    alias: Option<String>,
    object_types: BTreeSet<String>,
}

pub(crate) struct Rename;

fn underlying_name<'a>(
    ctx: &'a PlanningContext<'_>,
    object_type: &str,
    field: &'a FieldNode,
) -> &'a str {
    ctx.instructions
        .rename(&FieldCoordinates::new(object_type, field.name.as_str()))
        .map(|instruction| instruction.from.as_str())
        .unwrap_or(field.name.as_str())
}

#[async_trait]
impl FieldTransform for Rename {
    type State = RenameState;

    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError> {
        let mut names: IndexMap<&str, BTreeSet<String>> = IndexMap::new();
        for object_type in &field.object_types {
            names
                .entry(underlying_name(ctx, object_type, field))
                .or_default()
                .insert(object_type.clone());
        }
        if names.keys().all(|name| *name == field.name) {
            return Ok(None);
        }

        let key = field.result_key();
        let tag = format!("rename__{key}");
        let groups = if names.len() == 1 {
            let (underlying, object_types) = names.pop().unwrap_or_default();
            let alias = match &field.alias {
                Some(alias) => Some(alias.clone()),
                None if conflicts(ctx, field, underlying) => {
                    Some(ctx.aliases.alias(&tag, underlying))
                }
                None => None,
            };
            vec![RenameGroup {
                underlying: underlying.to_string(),
                key: alias.clone().unwrap_or_else(|| underlying.to_string()),
                alias,
                object_types,
            }]
        } else {
            names
                .into_iter()
                .map(|(underlying, object_types)| {
                    let alias = ctx.aliases.alias(&tag, underlying);
                    RenameGroup {
                        underlying: underlying.to_string(),
                        key: alias.clone(),
                        alias: Some(alias),
                        object_types,
                    }
                })
                .collect()
        };
        Ok(Some(RenameState { groups }))
    }

    fn rewrite_field(
        &self,
        _ctx: &RewriteContext<'_>,
        field: Field,
        state: &Self::State,
    ) -> FieldRewrite {
        let restrict = state.groups.len() > 1;
        let mut copies = state.groups.iter().filter_map(|group| {
            let mut copy = field.clone();
            copy.name = group.underlying.clone();
            copy.alias = group.alias.clone();
            if restrict {
                // an earlier transform may have narrowed the field already
                copy.object_types = group
                    .object_types
                    .intersection(&field.object_types)
                    .cloned()
                    .collect();
                if copy.object_types.is_empty() {
                    return None;
                }
            }
            Some(copy)
        });
        FieldRewrite {
            replacement: copies.next(),
            artificial_fields: copies.collect(),
        }
    }

    async fn result_instructions(
        &self,
        _ctx: &ResultContext<'_>,
        field: &FieldNode,
        state: &Self::State,
        parents: &[JsonNode<'_>],
    ) -> Vec<ResultInstruction> {
        let key = field.result_key();
        let mut instructions = Vec::new();
        for parent in parents {
            let Some(object) = parent.as_object() else {
                continue;
            };
            for group in &state.groups {
                if group.key == key || !object.contains_key(group.key.as_str()) {
                    continue;
                }
                instructions.push(ResultInstruction::Copy {
                    from: parent.path.with_key(group.key.as_str()),
                    to: parent.path.with_key(key),
                });
                instructions.push(ResultInstruction::Remove {
                    path: parent.path.with_key(group.key.as_str()),
                });
            }
        }
        instructions
    }
}

/// Whether sending the field unaliased would collide with a sibling's response key.
fn conflicts(ctx: &PlanningContext<'_>, field: &FieldNode, underlying: &str) -> bool {
    ctx.siblings(field).any(|sibling| {
        sibling.result_key() == underlying
            || (sibling.alias.is_none()
                && sibling
                    .object_types
                    .iter()
                    .any(|object_type| underlying_name(ctx, object_type, sibling) == underlying))
    })
}

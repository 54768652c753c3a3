//! Turns a backend response into the response the overall query expects.
//!
//! Every transform applied to a field contributes [`ResultInstruction`]s, all computed against
//! the response as the backend returned it. They are then applied deepest first, so a value is
//! fully transformed before an ancestor copies or moves it. Artificial fields are stripped last at
//! each depth.

use std::cmp::Reverse;

use futures::future::join_all;

use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::JsonNode;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::plan::ExecutionPlan;
use crate::query::FieldId;
use crate::rewrite::RewriteOutput;
use crate::transform::ResultContext;

/// A change to a response.
///
/// Instructions are permissive: one targeting a location that no longer exists does nothing.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ResultInstruction {
    /// Writes `value` at `path`, creating the last key if needed.
    Set { path: Path, value: Value },
    /// Removes the key at `path`.
    Remove { path: Path },
    /// Writes the value found at `from`, when applied, to `to`.
    Copy { from: Path, to: Path },
    /// Adds an error to the response.
    AddError(Error),
}

/// Instructions computed by transforms run before artificial fields are stripped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Transform,
    Strip,
}

/// Rewrites `response` in place.
pub(crate) async fn stitch(
    ctx: &ResultContext<'_>,
    plan: &ExecutionPlan,
    rewrite: &RewriteOutput,
    response: &mut Response,
) {
    let data = match response.data.take() {
        Some(data) if data.is_object() => data,
        other => {
            response.data = other;
            return;
        }
    };

    let mut instructions: Vec<(usize, Phase, ResultInstruction)> = Vec::new();
    let computed = join_all(plan.iter().flat_map(|(id, steps)| {
        let field = ctx.overall.node(*id);
        let data = &data;
        rewrite
            .field_map
            .parents(*id)
            .into_iter()
            .map(move |parent| async move {
                let (depth, parents) = parents_of(rewrite, data, parent);
                let mut instructions = Vec::new();
                for step in steps {
                    instructions.extend(step.result_instructions(ctx, field, &parents).await);
                }
                (depth, instructions)
            })
    }))
    .await;
    for (depth, computed) in computed {
        instructions.extend(
            computed
                .into_iter()
                .map(|instruction| (depth, Phase::Transform, instruction)),
        );
    }

    for id in &rewrite.artificial_fields {
        let node = rewrite.tree.node(*id);
        let (depth, parents) = parents_of(rewrite, &data, node.parent());
        instructions.extend(
            parents
                .iter()
                .filter(|parent| {
                    parent
                        .as_object()
                        .is_some_and(|object| object.contains_key(node.result_key()))
                })
                .map(|parent| {
                    (
                        depth,
                        Phase::Strip,
                        ResultInstruction::Remove {
                            path: parent.path.with_key(node.result_key()),
                        },
                    )
                }),
        );
    }

    instructions.sort_by_key(|(depth, phase, _)| (Reverse(*depth), *phase));
    tracing::trace!(count = instructions.len(), "applying result instructions");

    let mut data = data;
    for (_, _, instruction) in instructions {
        apply(&mut data, &mut response.errors, instruction);
    }
    response.data = Some(data);
}

/// The depth of the fields placed under `parent` and the objects in `data` holding them.
fn parents_of<'a>(
    rewrite: &RewriteOutput,
    data: &'a Value,
    parent: Option<FieldId>,
) -> (usize, Vec<JsonNode<'a>>) {
    let (depth, query_path) = match parent {
        Some(parent) => (
            rewrite.tree.depth(parent) + 1,
            rewrite.tree.query_path(parent),
        ),
        None => (0, Vec::new()),
    };
    let parents = JsonNode::nodes_at(data, &query_path, true)
        .into_iter()
        .filter(|node| node.value.is_object())
        .collect();
    (depth, parents)
}

/// Applies one instruction to `data`.
pub(crate) fn apply(data: &mut Value, errors: &mut Vec<Error>, instruction: ResultInstruction) {
    match instruction {
        ResultInstruction::Set { path, value } => set(data, &path, value),
        ResultInstruction::Remove { path } => {
            let Some((PathElement::Key(key), parent)) = path.0.split_last() else {
                return;
            };
            if let Some(Value::Object(object)) = data.get_path_mut(&Path(parent.to_vec())) {
                object.remove(key.as_str());
            }
        }
        ResultInstruction::Copy { from, to } => {
            if let Some(value) = data.get_path(&from).cloned() {
                set(data, &to, value);
            }
        }
        ResultInstruction::AddError(error) => errors.push(error),
    }
}

fn set(data: &mut Value, path: &Path, value: Value) {
    let Some((last, parent)) = path.0.split_last() else {
        *data = value;
        return;
    };
    match (data.get_path_mut(&Path(parent.to_vec())), last) {
        (Some(Value::Object(object)), PathElement::Key(key)) => {
            object.insert(key.as_str(), value);
        }
        (Some(Value::Array(items)), PathElement::Index(index)) => {
            if let Some(item) = items.get_mut(*index) {
                *item = value;
            }
        }
        _ => {}
    }
}

//! Splits a top-level field's list argument across several aliased copies of the field.

use async_trait::async_trait;

use crate::error::PlanningError;
use crate::json_ext::JsonNode;
use crate::json_ext::Value;
use crate::query::Field;
use crate::query::FieldNode;
use crate::result::ResultInstruction;
use crate::transform::coordinates;
use crate::transform::FieldRewrite;
use crate::transform::FieldTransform;
use crate::transform::PlanningContext;
use crate::transform::ResultContext;
use crate::transform::RewriteContext;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PartitionState {
    argument: String,
    partitions: Vec<PartitionSlice>,
}

#[derive(Clone, Debug, PartialEq)]
struct PartitionSlice {
    alias: String,
    values: Vec<Value>,
}

pub(crate) struct Partition;

#[async_trait]
impl FieldTransform for Partition {
    type State = PartitionState;

    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError> {
        if !field.is_root() {
            return Ok(None);
        }
        let Some(instruction) = coordinates(field)
            .iter()
            .find_map(|coordinates| ctx.instructions.partition(coordinates))
        else {
            return Ok(None);
        };
        let Some(Value::Array(values)) = field.arguments.get(instruction.argument.as_str()) else {
            return Ok(None);
        };

        let partitions = ctx.hooks.partition_field_argument(field, values);
        if partitions.len() < 2 {
            return Ok(None);
        }
        tracing::debug!(
            field = field.result_key(),
            partitions = partitions.len(),
            "partitioning top-level field"
        );
        Ok(Some(PartitionState {
            argument: instruction.argument.clone(),
            partitions: partitions
                .into_iter()
                .enumerate()
                .map(|(index, values)| PartitionSlice {
                    alias: ctx
                        .aliases
                        .alias(&format!("partition_{index}"), field.result_key()),
                    values,
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
                .partitions
                .iter()
                .map(|partition| {
                    let mut copy = field.clone().with_alias(partition.alias.as_str());
                    copy.arguments.insert(
                        state.argument.as_str(),
                        Value::Array(partition.values.clone()),
                    );
                    copy
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
            let lists: Vec<(&str, usize)> = state
                .partitions
                .iter()
                .filter_map(|partition| match object.get(partition.alias.as_str()) {
                    Some(Value::Array(items)) => Some((partition.alias.as_str(), items.len())),
                    _ => None,
                })
                .collect();
            if lists.is_empty() {
                instructions.push(ResultInstruction::Set {
                    path: target,
                    value: Value::Null,
                });
                continue;
            }

            let total = lists.iter().map(|(_, len)| len).sum::<usize>();
            instructions.push(ResultInstruction::Set {
                path: target.clone(),
                value: Value::Array(vec![Value::Null; total]),
            });
            let mut offset = 0;
            for (alias, len) in lists {
                for index in 0..len {
                    instructions.push(ResultInstruction::Copy {
                        from: parent.path.with_key(alias).with_index(index),
                        to: target.with_index(offset + index),
                    });
                }
                offset += len;
            }
        }
        instructions
    }
}

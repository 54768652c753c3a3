//! Decides which transforms apply to which fields.

use indexmap::IndexMap;

use crate::error::PlanningError;
use crate::query::FieldId;
use crate::transform::PlanningContext;
use crate::transform::Transform;
use crate::transform::TransformStep;

/// The transforms applying to each field of an overall tree, in pipeline order.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ExecutionPlan {
    steps: IndexMap<FieldId, Vec<TransformStep>>,
}

impl ExecutionPlan {
    pub(crate) fn steps(&self, field: FieldId) -> &[TransformStep] {
        self.steps
            .get(&field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&FieldId, &Vec<TransformStep>)> {
        self.steps.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }
}

pub(crate) struct ExecutionPlanner;

impl ExecutionPlanner {
    /// Plans the subtrees rooted at `roots`.
    ///
    /// Transforms are tried in pipeline order and planning of a field stops at the first one that
    /// drops it entirely. A transform that keeps the field on some of its types leaves it to the
    /// rest of the pipeline. Fields below a field whose subtree is resolved elsewhere are not
    /// visited. Planning is a pure function of the context: planning twice yields the same plan.
    pub(crate) fn plan(
        ctx: &PlanningContext<'_>,
        roots: &[FieldId],
    ) -> Result<ExecutionPlan, PlanningError> {
        let mut plan = ExecutionPlan::default();
        let mut stack: Vec<FieldId> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let field = ctx.tree.node(id);
            let mut steps = Vec::new();
            let mut descend = true;
            for transform in Transform::PIPELINE {
                let Some(step) = transform.is_applicable(ctx, field)? else {
                    continue;
                };
                descend &= !step.replaces_subtree();
                let drops_field = step.drops_field();
                steps.push(step);
                if drops_field {
                    break;
                }
            }
            if !steps.is_empty() {
                tracing::trace!(
                    field = field.result_key(),
                    transforms = ?steps.iter().map(TransformStep::transform).collect::<Vec<_>>(),
                    "planned field"
                );
                plan.steps.insert(id, steps);
            }
            if descend {
                stack.extend(field.children().iter().rev());
            }
        }
        Ok(plan)
    }
}

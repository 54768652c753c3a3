//! Keeps selection sets non-empty when every field in them was skipped.

use crate::error::PlanningError;
use crate::query::Field;
use crate::query::FieldNode;
use crate::query::SKIP_MARKER;
use crate::transform::FieldRewrite;
use crate::transform::FieldTransform;
use crate::transform::PlanningContext;
use crate::transform::RewriteContext;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SkipIncludeState {
    placeholder: String,
}

/// Replaces the skip marker with an aliased `__typename`, removed again from the result.
pub(crate) struct SkipInclude;

impl FieldTransform for SkipInclude {
    type State = SkipIncludeState;

    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError> {
        Ok((field.name == SKIP_MARKER).then(|| SkipIncludeState {
            placeholder: ctx.aliases.alias("skip_include", "typename"),
        }))
    }

    fn rewrite_field(
        &self,
        _ctx: &RewriteContext<'_>,
        _field: Field,
        state: &Self::State,
    ) -> FieldRewrite {
        FieldRewrite::artificial(vec![Field::typename(state.placeholder.as_str())])
    }
}

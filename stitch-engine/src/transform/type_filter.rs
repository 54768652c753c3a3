//! Drops object types a service does not expose from the fields sent to it.

use std::collections::BTreeSet;

use crate::error::PlanningError;
use crate::instructions::ServiceDefinition;
use crate::query::Field;
use crate::query::FieldNode;
use crate::transform::FieldRewrite;
use crate::transform::FieldTransform;
use crate::transform::PlanningContext;
use crate::transform::RewriteContext;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TypeFilterContext {
    /// Empty when the service exposes every type.
    exposed_types: BTreeSet<String>,
}

impl TypeFilterContext {
    pub(crate) fn new(service: &ServiceDefinition) -> Self {
        Self {
            exposed_types: service.exposed_types().clone(),
        }
    }

    fn exposes(&self, object_type: &str) -> bool {
        self.exposed_types.is_empty() || self.exposed_types.contains(object_type)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TypeFilterState {
    kept: BTreeSet<String>,
    /// Set when no type is kept: the field is then replaced by this `__typename` placeholder.
    placeholder: Option<String>,
}

impl TypeFilterState {
    pub(crate) fn drops_field(&self) -> bool {
        self.placeholder.is_some()
    }
}

pub(crate) struct TypeFilter;

impl FieldTransform for TypeFilter {
    type State = TypeFilterState;

    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError> {
        if field.is_root() || field.object_types.is_empty() {
            return Ok(None);
        }
        let filter = &ctx.transform_context.type_filter;
        let kept: BTreeSet<String> = field
            .object_types
            .iter()
            .filter(|object_type| filter.exposes(object_type))
            .cloned()
            .collect();
        if kept.len() == field.object_types.len() {
            return Ok(None);
        }
        let placeholder = kept
            .is_empty()
            .then(|| ctx.aliases.alias("type_filter", field.result_key()));
        Ok(Some(TypeFilterState { kept, placeholder }))
    }

    fn rewrite_field(
        &self,
        _ctx: &RewriteContext<'_>,
        mut field: Field,
        state: &Self::State,
    ) -> FieldRewrite {
        match &state.placeholder {
            Some(placeholder) => {
                FieldRewrite::artificial(vec![Field::typename(placeholder.as_str())])
            }
            None => {
                field.object_types = state.kept.clone();
                FieldRewrite::replace(field)
            }
        }
    }
}

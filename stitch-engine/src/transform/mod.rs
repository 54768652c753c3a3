//! Field transforms.
//!
//! A transform is consulted three times for a field: once while planning
//! ([`FieldTransform::is_applicable`]), once while rewriting the query
//! ([`FieldTransform::rewrite_field`]) and once while stitching the response
//! ([`FieldTransform::result_instructions`]). The state returned while planning is kept in the
//! [`TransformStep`] and handed back unchanged to the two later phases.

use async_trait::async_trait;

use crate::engine::ExecutionContext;
use crate::error::PlanningError;
use crate::instructions::FieldCoordinates;
use crate::instructions::InstructionSet;
use crate::instructions::ServiceDefinition;
use crate::json_ext::JsonNode;
use crate::query::AliasAssigner;
use crate::query::Field;
use crate::query::FieldNode;
use crate::query::QueryTree;
use crate::result::ResultInstruction;
use crate::services::Hooks;
use crate::Configuration;

pub(crate) mod deep_rename;
pub(crate) mod hydration;
pub(crate) mod partition;
pub(crate) mod rename;
pub(crate) mod skip_include;
pub(crate) mod stub;
pub(crate) mod type_filter;

use self::deep_rename::DeepRename;
use self::deep_rename::DeepRenameState;
use self::hydration::batch::BatchHydration;
use self::hydration::batch::BatchHydrationState;
use self::hydration::single::Hydration;
use self::hydration::single::HydrationState;
use self::hydration::HydrationContext;
use self::partition::Partition;
use self::partition::PartitionState;
use self::rename::Rename;
use self::rename::RenameState;
use self::skip_include::SkipInclude;
use self::skip_include::SkipIncludeState;
use self::stub::Stub;
use self::stub::StubState;
use self::type_filter::TypeFilter;
use self::type_filter::TypeFilterContext;
use self::type_filter::TypeFilterState;

/// Everything a transform may consult while planning.
pub(crate) struct PlanningContext<'a> {
    pub(crate) tree: &'a QueryTree,
    pub(crate) service: &'a ServiceDefinition,
    pub(crate) instructions: &'a InstructionSet,
    pub(crate) hooks: &'a dyn Hooks,
    pub(crate) aliases: &'a AliasAssigner,
    pub(crate) transform_context: &'a TransformContext,
}

impl PlanningContext<'_> {
    /// Sibling fields of `field`, itself excluded.
    pub(crate) fn siblings<'b>(
        &'b self,
        field: &'b FieldNode,
    ) -> impl Iterator<Item = &'b FieldNode> {
        let siblings = match field.parent() {
            Some(parent) => self.tree.node(parent).children(),
            None => self.tree.roots(),
        };
        siblings
            .iter()
            .filter(move |id| **id != field.id())
            .map(|id| self.tree.node(*id))
    }
}

/// Everything a transform may consult while rewriting.
pub(crate) struct RewriteContext<'a> {
    pub(crate) service: &'a ServiceDefinition,
}

/// Everything a transform may consult while computing result instructions.
pub(crate) struct ResultContext<'a> {
    pub(crate) execution: &'a ExecutionContext<'a>,
    pub(crate) service: &'a ServiceDefinition,
    /// The tree the plan was built from.
    pub(crate) overall: &'a QueryTree,
    pub(crate) transform_context: &'a TransformContext,
}

/// Operation-scoped data the transforms share, computed once per service per operation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TransformContext {
    pub(crate) type_filter: TypeFilterContext,
    pub(crate) hydration: HydrationContext,
}

impl TransformContext {
    pub(crate) fn new(service: &ServiceDefinition, configuration: &Configuration) -> Self {
        Self {
            type_filter: TypeFilterContext::new(service),
            hydration: HydrationContext::new(configuration),
        }
    }
}

/// What a transform turns a field into.
#[derive(Debug, Default)]
pub(crate) struct FieldRewrite {
    /// The field to send in place of the original. `None` stops later transforms.
    pub(crate) replacement: Option<Field>,
    /// Fields injected next to the replacement, stripped from the result.
    pub(crate) artificial_fields: Vec<Field>,
}

impl FieldRewrite {
    pub(crate) fn replace(field: Field) -> Self {
        Self {
            replacement: Some(field),
            artificial_fields: Vec::new(),
        }
    }

    pub(crate) fn artificial(artificial_fields: Vec<Field>) -> Self {
        Self {
            replacement: None,
            artificial_fields,
        }
    }
}

#[async_trait]
pub(crate) trait FieldTransform {
    type State: Send + Sync;

    /// Decides whether the transform applies to `field`, computing the state it needs later.
    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError>;

    fn rewrite_field(&self, ctx: &RewriteContext<'_>, field: Field, state: &Self::State)
        -> FieldRewrite;

    /// Computes the changes to apply to the response for `field` under each parent object.
    ///
    /// The response is not mutated while instructions are computed.
    async fn result_instructions(
        &self,
        _ctx: &ResultContext<'_>,
        _field: &FieldNode,
        _state: &Self::State,
        _parents: &[JsonNode<'_>],
    ) -> Vec<ResultInstruction> {
        Vec::new()
    }
}

/// The closed set of transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Transform {
    SkipInclude,
    TypeFilter,
    Partition,
    Stub,
    DeepRename,
    Hydration,
    BatchHydration,
    Rename,
}

impl Transform {
    /// The order in which transforms are tried and applied.
    pub(crate) const PIPELINE: [Transform; 8] = [
        Transform::SkipInclude,
        Transform::TypeFilter,
        Transform::Partition,
        Transform::Stub,
        Transform::DeepRename,
        Transform::Hydration,
        Transform::BatchHydration,
        Transform::Rename,
    ];

    pub(crate) fn is_applicable(
        self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<TransformStep>, PlanningError> {
        let state = match self {
            Transform::SkipInclude => SkipInclude
                .is_applicable(ctx, field)?
                .map(TransformState::SkipInclude),
            Transform::TypeFilter => TypeFilter
                .is_applicable(ctx, field)?
                .map(TransformState::TypeFilter),
            Transform::Partition => Partition
                .is_applicable(ctx, field)?
                .map(TransformState::Partition),
            Transform::Stub => Stub.is_applicable(ctx, field)?.map(TransformState::Stub),
            Transform::DeepRename => DeepRename
                .is_applicable(ctx, field)?
                .map(TransformState::DeepRename),
            Transform::Hydration => Hydration
                .is_applicable(ctx, field)?
                .map(TransformState::Hydration),
            Transform::BatchHydration => BatchHydration
                .is_applicable(ctx, field)?
                .map(TransformState::BatchHydration),
            Transform::Rename => Rename.is_applicable(ctx, field)?.map(TransformState::Rename),
        };
        Ok(state.map(TransformStep))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TransformState {
    SkipInclude(SkipIncludeState),
    TypeFilter(TypeFilterState),
    Partition(PartitionState),
    Stub(StubState),
    DeepRename(DeepRenameState),
    Hydration(HydrationState),
    BatchHydration(BatchHydrationState),
    Rename(RenameState),
}

/// A transform applied to one field, with the state computed while planning.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TransformStep(TransformState);

impl TransformStep {
    pub(crate) fn transform(&self) -> Transform {
        match &self.0 {
            TransformState::SkipInclude(_) => Transform::SkipInclude,
            TransformState::TypeFilter(_) => Transform::TypeFilter,
            TransformState::Partition(_) => Transform::Partition,
            TransformState::Stub(_) => Transform::Stub,
            TransformState::DeepRename(_) => Transform::DeepRename,
            TransformState::Hydration(_) => Transform::Hydration,
            TransformState::BatchHydration(_) => Transform::BatchHydration,
            TransformState::Rename(_) => Transform::Rename,
        }
    }

    pub(crate) fn state(&self) -> &TransformState {
        &self.0
    }

    /// Whether the field's children are resolved elsewhere, so the planner must not descend.
    ///
    /// A field kept on some of its types still has its children sent to the service.
    pub(crate) fn replaces_subtree(&self) -> bool {
        match &self.0 {
            TransformState::Stub(_)
            | TransformState::Hydration(_)
            | TransformState::BatchHydration(_)
            | TransformState::TypeFilter(_) => self.drops_field(),
            _ => false,
        }
    }

    /// Whether the rewrite never keeps the field itself, so no later transform can apply to it.
    pub(crate) fn drops_field(&self) -> bool {
        match &self.0 {
            TransformState::TypeFilter(state) => state.drops_field(),
            TransformState::Stub(state) => state.drops_field(),
            TransformState::Hydration(state) => state.drops_field(),
            TransformState::BatchHydration(state) => state.drops_field(),
            TransformState::Rename(_) => false,
            _ => true,
        }
    }

    pub(crate) fn rewrite_field(&self, ctx: &RewriteContext<'_>, field: Field) -> FieldRewrite {
        match &self.0 {
            TransformState::SkipInclude(state) => SkipInclude.rewrite_field(ctx, field, state),
            TransformState::TypeFilter(state) => TypeFilter.rewrite_field(ctx, field, state),
            TransformState::Partition(state) => Partition.rewrite_field(ctx, field, state),
            TransformState::Stub(state) => Stub.rewrite_field(ctx, field, state),
            TransformState::DeepRename(state) => DeepRename.rewrite_field(ctx, field, state),
            TransformState::Hydration(state) => Hydration.rewrite_field(ctx, field, state),
            TransformState::BatchHydration(state) => {
                BatchHydration.rewrite_field(ctx, field, state)
            }
            TransformState::Rename(state) => Rename.rewrite_field(ctx, field, state),
        }
    }

    pub(crate) async fn result_instructions(
        &self,
        ctx: &ResultContext<'_>,
        field: &FieldNode,
        parents: &[JsonNode<'_>],
    ) -> Vec<ResultInstruction> {
        match &self.0 {
            TransformState::SkipInclude(state) => {
                SkipInclude
                    .result_instructions(ctx, field, state, parents)
                    .await
            }
            TransformState::TypeFilter(state) => {
                TypeFilter
                    .result_instructions(ctx, field, state, parents)
                    .await
            }
            TransformState::Partition(state) => {
                Partition
                    .result_instructions(ctx, field, state, parents)
                    .await
            }
            TransformState::Stub(state) => {
                Stub.result_instructions(ctx, field, state, parents).await
            }
            TransformState::DeepRename(state) => {
                DeepRename
                    .result_instructions(ctx, field, state, parents)
                    .await
            }
            TransformState::Hydration(state) => {
                Hydration
                    .result_instructions(ctx, field, state, parents)
                    .await
            }
            TransformState::BatchHydration(state) => {
                BatchHydration
                    .result_instructions(ctx, field, state, parents)
                    .await
            }
            TransformState::Rename(state) => {
                Rename.result_instructions(ctx, field, state, parents).await
            }
        }
    }
}

/// Coordinates of `field` on each of its object types.
pub(crate) fn coordinates(field: &FieldNode) -> Vec<FieldCoordinates> {
    FieldCoordinates::of(field).collect()
}

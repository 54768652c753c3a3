//! Builds the query sent to a service from the overall query and its plan.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::instructions::ServiceDefinition;
use crate::plan::ExecutionPlan;
use crate::query::Field;
use crate::query::FieldId;
use crate::query::QueryTree;
use crate::transform::RewriteContext;

/// Where an overall field ended up in the underlying tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Placement {
    /// The underlying field it was placed under; `None` at the top level.
    pub(crate) parent: Option<FieldId>,
    /// The underlying field replacing it, if it was not removed.
    pub(crate) field: Option<FieldId>,
}

/// Placements of overall fields, several when an ancestor was copied.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct OverallToUnderlyingMap {
    placements: IndexMap<FieldId, Vec<Placement>>,
}

impl OverallToUnderlyingMap {
    pub(crate) fn record(&mut self, overall: FieldId, placement: Placement) {
        self.placements.entry(overall).or_default().push(placement);
    }

    pub(crate) fn placements(&self, overall: FieldId) -> &[Placement] {
        self.placements
            .get(&overall)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The distinct underlying parents of an overall field.
    pub(crate) fn parents(&self, overall: FieldId) -> Vec<Option<FieldId>> {
        let mut parents = Vec::new();
        for placement in self.placements(overall) {
            if !parents.contains(&placement.parent) {
                parents.push(placement.parent);
            }
        }
        parents
    }
}

#[derive(Debug)]
pub(crate) struct RewriteOutput {
    pub(crate) tree: Arc<QueryTree>,
    pub(crate) field_map: OverallToUnderlyingMap,
    /// Injected fields, stripped from the response.
    pub(crate) artificial_fields: Vec<FieldId>,
}

pub(crate) struct QueryRewriter<'a> {
    ctx: RewriteContext<'a>,
    overall: &'a QueryTree,
    plan: &'a ExecutionPlan,
    tree: QueryTree,
    field_map: OverallToUnderlyingMap,
    artificial_fields: Vec<FieldId>,
}

impl<'a> QueryRewriter<'a> {
    pub(crate) fn new(
        service: &'a ServiceDefinition,
        overall: &'a QueryTree,
        plan: &'a ExecutionPlan,
    ) -> Self {
        Self {
            ctx: RewriteContext { service },
            overall,
            plan,
            tree: QueryTree::new(overall.kind()),
            field_map: OverallToUnderlyingMap::default(),
            artificial_fields: Vec::new(),
        }
    }

    /// Rewrites the subtrees rooted at `roots`.
    pub(crate) fn rewrite(mut self, roots: &[FieldId]) -> RewriteOutput {
        for root in roots {
            let field = self.overall.detach(*root);
            self.rewrite_field(None, field);
        }
        RewriteOutput {
            tree: Arc::new(self.tree),
            field_map: self.field_map,
            artificial_fields: self.artificial_fields,
        }
    }

    /// Runs the planned transforms of `field` and inserts what they produce under `parent`.
    fn rewrite_field(&mut self, parent: Option<FieldId>, field: Field) {
        let Some(origin) = field.origin() else {
            self.insert(parent, field);
            return;
        };

        let mut replacement = Some(field);
        let mut artificial = Vec::new();
        for step in self.plan.steps(origin) {
            let Some(current) = replacement.take() else {
                break;
            };
            let rewrite = step.rewrite_field(&self.ctx, current);
            replacement = rewrite.replacement;
            artificial.extend(rewrite.artificial_fields);
        }

        for field in artificial {
            let id = self.insert(parent, field);
            self.artificial_fields.push(id);
        }
        let field = replacement.map(|field| self.insert(parent, field));
        self.field_map.record(origin, Placement { parent, field });
    }

    /// Inserts `field` with the service's type names, rewriting its children.
    fn insert(&mut self, parent: Option<FieldId>, mut field: Field) -> FieldId {
        let children = std::mem::take(&mut field.children);
        field.object_types = field
            .object_types
            .iter()
            .map(|object_type| self.ctx.service.underlying_type_name(object_type).to_string())
            .collect();
        field.possible_types = field
            .possible_types
            .iter()
            .filter(|object_type| self.ctx.service.exposes_type(object_type))
            .map(|object_type| self.ctx.service.underlying_type_name(object_type).to_string())
            .collect();
        let id = self.tree.insert(parent, field);
        for child in children {
            self.rewrite_field(Some(id), child);
        }
        id
    }
}

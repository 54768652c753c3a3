//! Fields the backend does not have on some object types: there they resolve to `null`.

use std::collections::BTreeSet;

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
pub(crate) struct StubState {
    marker: String,
    /// Object types on which the field is stubbed.
    stubbed: BTreeSet<String>,
    drops: bool,
}

impl StubState {
    /// Whether the field is stubbed on every type it is selected on.
    pub(crate) fn drops_field(&self) -> bool {
        self.drops
    }
}

pub(crate) struct Stub;

#[async_trait]
impl FieldTransform for Stub {
    type State = StubState;

    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError> {
        let stubbed: BTreeSet<String> = coordinates(field)
            .into_iter()
            .filter(|coordinates| ctx.instructions.is_stubbed(coordinates))
            .map(|coordinates| coordinates.type_name)
            .collect();
        if stubbed.is_empty() {
            return Ok(None);
        }
        Ok(Some(StubState {
            marker: ctx.aliases.alias("stub", field.result_key()),
            drops: stubbed == field.object_types,
            stubbed,
        }))
    }

    fn rewrite_field(
        &self,
        _ctx: &RewriteContext<'_>,
        mut field: Field,
        state: &Self::State,
    ) -> FieldRewrite {
        // the marker's presence tells which objects own the stubbed field
        let stubbed: BTreeSet<String> = field
            .object_types
            .intersection(&state.stubbed)
            .cloned()
            .collect();
        field.object_types.retain(|object_type| !state.stubbed.contains(object_type));

        let artificial_fields = if stubbed.is_empty() {
            Vec::new()
        } else {
            vec![Field::typename(state.marker.as_str()).with_object_types(stubbed)]
        };
        FieldRewrite {
            replacement: (!field.object_types.is_empty()).then_some(field),
            artificial_fields,
        }
    }

    async fn result_instructions(
        &self,
        _ctx: &ResultContext<'_>,
        field: &FieldNode,
        state: &Self::State,
        parents: &[JsonNode<'_>],
    ) -> Vec<ResultInstruction> {
        parents
            .iter()
            .filter(|parent| {
                parent
                    .as_object()
                    .is_some_and(|object| object.contains_key(state.marker.as_str()))
            })
            .map(|parent| ResultInstruction::Set {
                path: parent.path.with_key(field.result_key()),
                value: Value::Null,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::engine::ExecutionContext;
    use crate::instructions::FieldCoordinates;
    use crate::instructions::InstructionSet;
    use crate::json_ext::Path;
    use crate::query::OperationKind;
    use crate::query::QueryTree;
    use crate::transform::test_support::PlanningFixture;

    #[test(tokio::test)]
    async fn stubbed_field_resolves_to_null_where_selected() {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("node").with_children([
                Field::new("id").with_object_types(["Issue", "User"]),
                Field::new("legacyId").with_object_types(["Issue"]),
            ])],
        );
        let instructions =
            InstructionSet::new().with_stub(FieldCoordinates::new("Issue", "legacyId"));
        let fixture = PlanningFixture::new(tree, instructions, "issues");
        let field = fixture.tree.field_at(&["node", "legacyId"]).unwrap();
        let state = Stub
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();

        let rewrite = Stub.rewrite_field(
            &RewriteContext {
                service: &fixture.service,
            },
            fixture.tree.detach(field.id()),
            &state,
        );
        assert!(state.drops_field());
        assert!(rewrite.replacement.is_none());
        assert_eq!(
            rewrite.artificial_fields,
            vec![Field::typename("stub__legacyId").with_object_types(["Issue"])]
        );

        let engine = fixture.engine();
        let execution = ExecutionContext::new(&engine, None, Default::default());
        let ctx = ResultContext {
            execution: &execution,
            service: &fixture.service,
            overall: &fixture.tree,
            transform_context: &fixture.transform_context,
        };
        let issue = json!({"id": "1", "stub__legacyId": "Issue"});
        let user = json!({"id": "2"});
        let parents = vec![
            JsonNode::new(Path::from("node/0"), &issue),
            JsonNode::new(Path::from("node/1"), &user),
        ];
        assert_eq!(
            Stub.result_instructions(&ctx, field, &state, &parents).await,
            vec![ResultInstruction::Set {
                path: Path::from("node/0/legacyId"),
                value: Value::Null,
            }]
        );
    }

    #[test]
    fn partly_stubbed_field_is_kept_on_the_other_types() {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("nodes")
                .with_possible_types(["Issue", "User"])
                .with_child(Field::new("label").with_object_types(["Issue", "User"]))],
        );
        let instructions = InstructionSet::new().with_stub(FieldCoordinates::new("Issue", "label"));
        let fixture = PlanningFixture::new(tree, instructions, "issues");
        let field = fixture.tree.field_at(&["nodes", "label"]).unwrap();
        let state = Stub
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();
        assert!(!state.drops_field());

        let rewrite = Stub.rewrite_field(
            &RewriteContext {
                service: &fixture.service,
            },
            fixture.tree.detach(field.id()),
            &state,
        );
        assert_eq!(
            rewrite.replacement.map(Field::without_origin),
            Some(Field::new("label").with_object_types(["User"]))
        );
        assert_eq!(
            rewrite.artificial_fields,
            vec![Field::typename("stub__label").with_object_types(["Issue"])]
        );
    }
}

//! One backing call per occurrence of a hydrated field.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use super::backing_query;
use super::backing_value;
use super::execute;
use super::hydrated_selections;
use super::repath_error;
use super::resolve_arguments;
use super::validate;
use super::SourceFields;
use super::HYDRATION_SPAN_NAME;
use crate::error::PlanningError;
use crate::graphql::Error;
use crate::instructions::HydrationInstruction;
use crate::json_ext::JsonNode;
use crate::json_ext::Object;
use crate::json_ext::Path;
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
pub(crate) struct HydrationState {
    /// Candidate instructions by overall object type.
    candidates: BTreeMap<String, Vec<Arc<HydrationInstruction>>>,
    /// Object types the field is selected on without being hydrated.
    native: BTreeSet<String>,
    sources: SourceFields,
}

impl HydrationState {
    pub(crate) fn drops_field(&self) -> bool {
        self.native.is_empty()
    }
}

pub(crate) struct Hydration;

#[async_trait]
impl FieldTransform for Hydration {
    type State = HydrationState;

    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError> {
        let mut candidates = BTreeMap::new();
        for coordinates in coordinates(field) {
            let instructions = ctx.instructions.hydrations(&coordinates);
            for instruction in instructions {
                validate(ctx, &coordinates, instruction)?;
            }
            if !instructions.is_empty() {
                candidates.insert(coordinates.type_name, instructions.to_vec());
            }
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let native = field
            .object_types
            .iter()
            .filter(|object_type| !candidates.contains_key(*object_type))
            .cloned()
            .collect();
        let sources = SourceFields::new(
            ctx,
            field,
            candidates.keys().cloned().collect(),
            "hydration",
            candidates
                .values()
                .flatten()
                .flat_map(|instruction| instruction.source_paths()),
        );
        Ok(Some(HydrationState {
            candidates,
            native,
            sources,
        }))
    }

    fn rewrite_field(
        &self,
        _ctx: &RewriteContext<'_>,
        mut field: Field,
        state: &Self::State,
    ) -> FieldRewrite {
        let artificial_fields = state.sources.artificial_fields(&field.object_types);
        field
            .object_types
            .retain(|object_type| !state.candidates.contains_key(object_type));
        FieldRewrite {
            replacement: (!field.object_types.is_empty()).then_some(field),
            artificial_fields,
        }
    }

    async fn result_instructions(
        &self,
        ctx: &ResultContext<'_>,
        field: &FieldNode,
        state: &Self::State,
        parents: &[JsonNode<'_>],
    ) -> Vec<ResultInstruction> {
        join_all(
            parents
                .iter()
                .filter_map(|parent| Some((parent.path.clone(), parent.as_object()?)))
                .map(|(path, parent)| hydrate(ctx, field, state, path, parent)),
        )
        .await
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Resolves the hydrated field under one parent object.
async fn hydrate(
    ctx: &ResultContext<'_>,
    field: &FieldNode,
    state: &HydrationState,
    parent_path: Path,
    parent: &Object,
) -> Vec<ResultInstruction> {
    let Some(object_type) = state.sources.object_type(ctx, parent) else {
        return Vec::new();
    };
    let target = parent_path.with_key(field.result_key());
    let null = || {
        vec![ResultInstruction::Set {
            path: target.clone(),
            value: Value::Null,
        }]
    };
    let Some(candidates) = state.candidates.get(object_type) else {
        return Vec::new();
    };

    let source = state
        .sources
        .read(parent, candidates.iter().map(Arc::as_ref));
    let choices: Vec<&HydrationInstruction> = candidates.iter().map(Arc::as_ref).collect();
    let Some(instruction) = ctx
        .execution
        .hooks()
        .choose_hydration_instruction(&choices, &source)
        .and_then(|index| choices.get(index).copied())
    else {
        tracing::debug!(
            field = field.result_key(),
            object_type,
            "no hydration chosen"
        );
        return null();
    };

    let arguments = resolve_arguments(instruction, &field.arguments, &source);
    let (value, errors) = match instruction.field_argument() {
        Some((name, _)) => match arguments.get(name) {
            None | Some(Value::Null) => return null(),
            Some(Value::Array(items)) => {
                let calls = items.iter().enumerate().map(|(index, item)| {
                    let mut arguments = arguments.clone();
                    arguments.insert(name, item.clone());
                    call(ctx, field, instruction, arguments, target.with_index(index))
                });
                let (values, errors): (Vec<Value>, Vec<Vec<Error>>) =
                    join_all(calls).await.into_iter().unzip();
                (Value::Array(values), errors.into_iter().flatten().collect())
            }
            Some(_) => call(ctx, field, instruction, arguments.clone(), target.clone()).await,
        },
        None => call(ctx, field, instruction, arguments, target.clone()).await,
    };

    std::iter::once(ResultInstruction::Set {
        path: target,
        value,
    })
    .chain(errors.into_iter().map(ResultInstruction::AddError))
    .collect()
}

/// One backing call. Failures resolve to `null` with an error at `target`.
async fn call(
    ctx: &ResultContext<'_>,
    field: &FieldNode,
    instruction: &HydrationInstruction,
    arguments: Object,
    target: Path,
) -> (Value, Vec<Error>) {
    let tree = backing_query(
        instruction,
        arguments,
        &field.possible_types,
        hydrated_selections(ctx, field),
    );
    let span = tracing::info_span!(
        HYDRATION_SPAN_NAME,
        "service.name" = instruction.service.as_str(),
        "otel.kind" = "INTERNAL"
    );
    match execute(ctx, instruction, tree, span).await {
        Ok(response) => {
            let value = backing_value(instruction, &response);
            let errors = response
                .errors
                .into_iter()
                .map(|error| repath_error(instruction, &target, error))
                .collect();
            (value, errors)
        }
        Err(err) => (Value::Null, vec![err.to_graphql_error(Some(target))]),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::engine::Engine;
    use crate::engine::ExecutionContext;
    use crate::instructions::FieldCoordinates;
    use crate::instructions::InstructionSet;
    use crate::instructions::Predicate;
    use crate::instructions::ServiceDefinition;
    use crate::instructions::ValueSource;
    use crate::query::DeterministicAliases;
    use crate::query::OperationKind;
    use crate::query::QueryTree;
    use crate::test_harness::MockService;
    use crate::transform::test_support::PlanningFixture;
    use crate::Configuration;

    fn instructions() -> InstructionSet {
        InstructionSet::new()
            .with_service(ServiceDefinition::new("issues").with_root_field("Query", "issue"))
            .with_service(ServiceDefinition::new("users").with_root_field("Query", "user"))
            .with_hydration(
                FieldCoordinates::new("Issue", "owner"),
                HydrationInstruction::new("users", ["user"])
                    .with_argument("id", ValueSource::field(["ownerId"])),
            )
    }

    fn tree() -> QueryTree {
        QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("issue").with_possible_types(["Issue"]).with_child(
                Field::new("owner")
                    .with_object_types(["Issue"])
                    .with_possible_types(["User"])
                    .with_child(Field::new("name").with_object_types(["User"])),
            )],
        )
    }

    async fn resolve(
        engine: &Engine,
        fixture: &PlanningFixture,
        parent: Value,
    ) -> Vec<ResultInstruction> {
        resolve_at(engine, fixture, &["issue", "owner"], "issue", parent).await
    }

    async fn resolve_at(
        engine: &Engine,
        fixture: &PlanningFixture,
        field: &[&str],
        parent_path: &str,
        parent: Value,
    ) -> Vec<ResultInstruction> {
        let field = fixture.tree.field_at(field).unwrap();
        let state = Hydration
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();
        let execution = ExecutionContext::new(engine, None, Default::default());
        let ctx = ResultContext {
            execution: &execution,
            service: &fixture.service,
            overall: &fixture.tree,
            transform_context: &fixture.transform_context,
        };
        let parents = vec![JsonNode::new(Path::from(parent_path), &parent)];
        Hydration
            .result_instructions(&ctx, field, &state, &parents)
            .await
    }

    #[test]
    fn replaces_the_field_with_its_sources() {
        let fixture = PlanningFixture::new(tree(), instructions(), "issues");
        let field = fixture.tree.field_at(&["issue", "owner"]).unwrap();
        let state = Hydration
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();
        let rewrite = Hydration.rewrite_field(
            &RewriteContext {
                service: &fixture.service,
            },
            fixture.tree.detach(field.id()),
            &state,
        );
        assert!(state.drops_field());
        assert!(rewrite.replacement.is_none());
        let keys: Vec<&str> = rewrite
            .artificial_fields
            .iter()
            .map(Field::result_key)
            .collect();
        assert_eq!(keys, vec!["hydration__owner__typename", "hydration__owner__ownerId"]);
    }

    #[test(tokio::test)]
    async fn hydrates_from_the_backing_service() {
        let fixture = PlanningFixture::new(tree(), instructions(), "issues");
        let users = MockService::new().with_response(
            r#"query { user(id: "u1") { name } }"#,
            json!({"data": {"user": {"name": "Ada"}}}),
        );
        let engine = Engine::builder()
            .instructions(instructions())
            .service("users", users.clone())
            .alias_strategy(DeterministicAliases)
            .build();

        let parent = json!({
            "hydration__owner__typename": "Issue",
            "hydration__owner__ownerId": "u1",
        });
        assert_eq!(
            resolve(&engine, &fixture, parent).await,
            vec![ResultInstruction::Set {
                path: Path::from("issue/owner"),
                value: json!({"name": "Ada"}),
            }]
        );
        assert!(users.requests()[0].is_hydration);
    }

    #[test(tokio::test)]
    async fn null_source_skips_the_call() {
        let fixture = PlanningFixture::new(tree(), instructions(), "issues");
        let users = MockService::new();
        let engine = Engine::builder()
            .instructions(instructions())
            .service("users", users.clone())
            .alias_strategy(DeterministicAliases)
            .build();

        let parent = json!({
            "hydration__owner__typename": "Issue",
            "hydration__owner__ownerId": null,
        });
        assert_eq!(
            resolve(&engine, &fixture, parent).await,
            vec![ResultInstruction::Set {
                path: Path::from("issue/owner"),
                value: Value::Null,
            }]
        );
        assert!(users.requests().is_empty());
    }

    #[test(tokio::test)]
    async fn list_source_fans_out() {
        let fixture = PlanningFixture::new(tree(), instructions(), "issues");
        let users = MockService::new()
            .with_response(
                r#"query { user(id: "u1") { name } }"#,
                json!({"data": {"user": {"name": "Ada"}}}),
            )
            .with_response(
                r#"query { user(id: "u2") { name } }"#,
                json!({"data": {"user": {"name": "Grace"}}}),
            );
        let engine = Engine::builder()
            .instructions(instructions())
            .service("users", users)
            .alias_strategy(DeterministicAliases)
            .build();

        let parent = json!({
            "hydration__owner__typename": "Issue",
            "hydration__owner__ownerId": ["u1", "u2"],
        });
        assert_eq!(
            resolve(&engine, &fixture, parent).await,
            vec![ResultInstruction::Set {
                path: Path::from("issue/owner"),
                value: json!([{"name": "Ada"}, {"name": "Grace"}]),
            }]
        );
    }

    #[test(tokio::test)]
    async fn timeout_becomes_a_field_error() {
        let instructions = InstructionSet::new()
            .with_service(ServiceDefinition::new("issues"))
            .with_service(ServiceDefinition::new("users"))
            .with_hydration(
                FieldCoordinates::new("Issue", "owner"),
                HydrationInstruction::new("users", ["user"])
                    .with_argument("id", ValueSource::field(["ownerId"]))
                    .with_timeout(Duration::from_millis(10)),
            );
        let fixture = PlanningFixture::new(tree(), instructions.clone(), "issues");
        let users = MockService::new()
            .with_response(
                r#"query { user(id: "u1") { name } }"#,
                json!({"data": {"user": {"name": "Ada"}}}),
            )
            .with_delay(Duration::from_millis(200));
        let engine = Engine::builder()
            .instructions(instructions)
            .service("users", users)
            .alias_strategy(DeterministicAliases)
            .configuration(Configuration::default())
            .build();

        let parent = json!({
            "hydration__owner__typename": "Issue",
            "hydration__owner__ownerId": "u1",
        });
        let result = resolve(&engine, &fixture, parent).await;
        assert_eq!(result.len(), 2);
        assert_eq!(
            result[0],
            ResultInstruction::Set {
                path: Path::from("issue/owner"),
                value: Value::Null,
            }
        );
        let ResultInstruction::AddError(error) = &result[1] else {
            panic!("expected an error, got {:?}", result[1]);
        };
        assert_eq!(error.extension_code().as_deref(), Some("SUBREQUEST_TIMEOUT"));
        assert_eq!(error.path, Some(Path::from("issue/owner")));
    }

    #[test(tokio::test)]
    async fn condition_selects_the_instruction() {
        let instructions = InstructionSet::new()
            .with_service(ServiceDefinition::new("issues"))
            .with_service(ServiceDefinition::new("users"))
            .with_hydration(
                FieldCoordinates::new("Issue", "owner"),
                HydrationInstruction::new("users", ["bot"])
                    .with_argument("id", ValueSource::field(["ownerId"]))
                    .with_condition(["ownerId"], Predicate::StartsWith("bot/".to_string())),
            )
            .with_hydration(
                FieldCoordinates::new("Issue", "owner"),
                HydrationInstruction::new("users", ["user"])
                    .with_argument("id", ValueSource::field(["ownerId"])),
            );
        let fixture = PlanningFixture::new(tree(), instructions.clone(), "issues");
        let users = MockService::new().with_response(
            r#"query { bot(id: "bot/7") { name } }"#,
            json!({"data": {"bot": {"name": "dependabot"}}}),
        );
        let engine = Engine::builder()
            .instructions(instructions)
            .service("users", users)
            .alias_strategy(DeterministicAliases)
            .build();

        let parent = json!({
            "hydration__owner__typename": "Issue",
            "hydration__owner__ownerId": "bot/7",
        });
        assert_eq!(
            resolve(&engine, &fixture, parent).await,
            vec![ResultInstruction::Set {
                path: Path::from("issue/owner"),
                value: json!({"name": "dependabot"}),
            }]
        );
    }

    #[test(tokio::test)]
    async fn field_native_on_other_types_is_kept() {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("nodes")
                .with_possible_types(["Comment", "Issue"])
                .with_child(
                    Field::new("owner")
                        .with_object_types(["Comment", "Issue"])
                        .with_possible_types(["User"])
                        .with_child(Field::new("name").with_object_types(["User"])),
                )],
        );
        let fixture = PlanningFixture::new(tree, instructions(), "issues");
        let field = fixture.tree.field_at(&["nodes", "owner"]).unwrap();
        let state = Hydration
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();
        assert!(!state.drops_field());

        let rewrite = Hydration.rewrite_field(
            &RewriteContext {
                service: &fixture.service,
            },
            fixture.tree.detach(field.id()),
            &state,
        );
        let replacement = rewrite.replacement.expect("owner stays selected on comments");
        assert_eq!(replacement.object_types, BTreeSet::from(["Comment".to_string()]));
        assert_eq!(replacement.children.len(), 1);
        assert!(rewrite
            .artificial_fields
            .iter()
            .all(|field| field.object_types == BTreeSet::from(["Issue".to_string()])));

        let engine = Engine::builder()
            .instructions(instructions())
            .service("users", MockService::new())
            .alias_strategy(DeterministicAliases)
            .build();
        let comment = json!({"owner": {"name": "Native"}});
        assert!(
            resolve_at(&engine, &fixture, &["nodes", "owner"], "nodes/0", comment)
                .await
                .is_empty()
        );
    }
}

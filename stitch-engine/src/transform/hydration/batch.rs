//! Every occurrence of a hydrated field resolved with one backing call per batch of inputs.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use itertools::Itertools;

use super::backing_query;
use super::backing_value;
use super::execute;
use super::hydrated_selections;
use super::resolve_arguments;
use super::validate;
use super::SourceFields;
use super::BATCH_HYDRATION_SPAN_NAME;
use crate::error::FetchError;
use crate::error::PlanningError;
use crate::graphql::Error;
use crate::instructions::BatchHydrationInstruction;
use crate::instructions::FieldCoordinates;
use crate::instructions::HydrationInstruction;
use crate::instructions::MatchStrategy;
use crate::instructions::ValueSource;
use crate::json_ext::value_key;
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
pub(crate) struct BatchHydrationState {
    /// Candidate instructions by overall object type.
    candidates: BTreeMap<String, Vec<BatchCandidate>>,
    /// Object types the field is selected on without being hydrated.
    native: BTreeSet<String>,
    sources: SourceFields,
}

impl BatchHydrationState {
    pub(crate) fn drops_field(&self) -> bool {
        self.native.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
struct BatchCandidate {
    instruction: Arc<BatchHydrationInstruction>,
    /// Fields selected on each result to correlate it with its input.
    identifiers: Vec<Identifier>,
}

#[derive(Clone, Debug, PartialEq)]
struct Identifier {
    /// Key of the input object holding the value; `None` when the input is the value itself.
    input_key: Option<String>,
    result_field: String,
    alias: String,
}

pub(crate) struct BatchHydration;

#[async_trait]
impl FieldTransform for BatchHydration {
    type State = BatchHydrationState;

    fn is_applicable(
        &self,
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
    ) -> Result<Option<Self::State>, PlanningError> {
        let mut candidates = BTreeMap::new();
        for coordinates in coordinates(field) {
            let instructions = ctx.instructions.batch_hydrations(&coordinates);
            // single hydrations take precedence on the same coordinates
            if instructions.is_empty() || !ctx.instructions.hydrations(&coordinates).is_empty() {
                continue;
            }
            let mut typed = Vec::with_capacity(instructions.len());
            for instruction in instructions {
                validate_batch(ctx, &coordinates, instruction)?;
                typed.push(BatchCandidate {
                    identifiers: identifiers(ctx, &instruction.match_strategy),
                    instruction: instruction.clone(),
                });
            }
            candidates.insert(coordinates.type_name, typed);
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
            "batch_hydration",
            candidates
                .values()
                .flatten()
                .flat_map(|candidate| candidate.instruction.hydration.source_paths()),
        );
        Ok(Some(BatchHydrationState {
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
        let mut instructions = Vec::new();
        // keyed by instruction identity
        let mut groups: IndexMap<usize, BatchGroup<'_>> = IndexMap::new();

        for parent in parents {
            let Some(object) = parent.as_object() else {
                continue;
            };
            let Some(object_type) = state.sources.object_type(ctx, object) else {
                continue;
            };
            let Some(candidates) = state.candidates.get(object_type) else {
                continue;
            };
            let target = parent.path.with_key(field.result_key());
            match occurrence(ctx, field, state, candidates, object) {
                Some((candidate, arguments, input)) => groups
                    .entry(Arc::as_ptr(&candidate.instruction) as usize)
                    .or_insert_with(|| BatchGroup {
                        candidate,
                        arguments,
                        occurrences: Vec::new(),
                    })
                    .occurrences
                    .push((target, input)),
                None => instructions.push(ResultInstruction::Set {
                    path: target,
                    value: Value::Null,
                }),
            }
        }

        let resolved = join_all(
            groups
                .into_values()
                .map(|group| resolve_group(ctx, field, group)),
        )
        .await;
        instructions.extend(resolved.into_iter().flatten());
        instructions
    }
}

/// Occurrences served by one instruction.
struct BatchGroup<'s> {
    candidate: &'s BatchCandidate,
    /// Arguments of the backing field, the batched one excepted.
    arguments: Object,
    /// Target path and input of each occurrence.
    occurrences: Vec<(Path, Value)>,
}

/// Picks the instruction among `candidates` resolving the field under `parent` and reads its input.
///
/// `None` resolves the occurrence to `null` without a call.
fn occurrence<'s>(
    ctx: &ResultContext<'_>,
    field: &FieldNode,
    state: &BatchHydrationState,
    candidates: &'s [BatchCandidate],
    parent: &Object,
) -> Option<(&'s BatchCandidate, Object, Value)> {
    let choices: Vec<&HydrationInstruction> = candidates
        .iter()
        .map(|candidate| &candidate.instruction.hydration)
        .collect();
    let source = state.sources.read(parent, choices.iter().copied());
    let index = ctx
        .execution
        .hooks()
        .choose_hydration_instruction(&choices, &source)?;
    let candidate = candidates.get(index)?;

    let hydration = &candidate.instruction.hydration;
    let mut arguments = resolve_arguments(hydration, &field.arguments, &source);
    let (name, _) = hydration.field_argument()?;
    let input = arguments.remove(name)?;
    (!input.is_null()).then_some((candidate, arguments, input))
}

/// Calls the backing service for one group and writes every occurrence's value.
async fn resolve_group(
    ctx: &ResultContext<'_>,
    field: &FieldNode,
    group: BatchGroup<'_>,
) -> Vec<ResultInstruction> {
    let candidate = group.candidate;
    let instruction = &candidate.instruction;
    let mut inputs: IndexMap<String, Value> = IndexMap::new();
    for (_, input) in &group.occurrences {
        for value in flatten(input) {
            inputs.entry(value_key(value)).or_insert_with(|| value.clone());
        }
    }

    let batch_size = instruction
        .batch_size
        .unwrap_or(usize::MAX)
        .min(ctx.transform_context.hydration.max_batch_size);
    let batches = ctx.execution.hooks().partition_batch_arguments(
        inputs.into_values().collect(),
        batch_size,
        instruction,
    );
    tracing::debug!(
        field = field.result_key(),
        service = instruction.hydration.service.as_str(),
        batches = batches.len(),
        "executing batch hydration"
    );
    let outcomes = join_all(
        batches
            .into_iter()
            .map(|batch| call(ctx, field, &group, batch)),
    )
    .await;

    let mut results: HashMap<String, Value> = HashMap::new();
    let mut failures: HashMap<String, FetchError> = HashMap::new();
    let mut instructions = Vec::new();
    for outcome in outcomes {
        match outcome.results {
            Ok(matched) => results.extend(matched),
            Err(err) => {
                tracing::warn!(error = %err, "batch hydration failed");
                failures.extend(outcome.inputs.into_iter().map(|key| (key, err.clone())));
            }
        }
        instructions.extend(outcome.errors.into_iter().map(ResultInstruction::AddError));
    }

    for (target, input) in group.occurrences {
        let failure = flatten(&input).find_map(|value| failures.get(&value_key(value)));
        if let Some(err) = failure {
            instructions.push(ResultInstruction::Set {
                path: target.clone(),
                value: Value::Null,
            });
            instructions.push(ResultInstruction::AddError(
                err.to_graphql_error(Some(target)),
            ));
            continue;
        }
        let lookup = |value: &Value| {
            results
                .get(&value_key(value))
                .cloned()
                .unwrap_or(Value::Null)
        };
        let value = match &input {
            Value::Array(items) => Value::Array(items.iter().map(lookup).collect()),
            value => lookup(value),
        };
        instructions.push(ResultInstruction::Set {
            path: target,
            value,
        });
    }
    instructions
}

struct BatchOutcome {
    /// Keys of the inputs sent.
    inputs: Vec<String>,
    /// Results by input key, or the failure of the whole batch.
    results: Result<Vec<(String, Value)>, FetchError>,
    /// Errors returned by the backing service.
    errors: Vec<Error>,
}

/// One backing call for `batch`.
async fn call(
    ctx: &ResultContext<'_>,
    field: &FieldNode,
    group: &BatchGroup<'_>,
    batch: Vec<Value>,
) -> BatchOutcome {
    let candidate = group.candidate;
    let instruction = &candidate.instruction.hydration;
    let inputs: Vec<String> = batch.iter().map(value_key).collect();

    let mut arguments = group.arguments.clone();
    if let Some((name, _)) = instruction.field_argument() {
        arguments.insert(name, Value::Array(batch.clone()));
    }
    let selections = hydrated_selections(ctx, field).into_iter().chain(
        candidate
            .identifiers
            .iter()
            .map(|identifier| {
                Field::new(identifier.result_field.as_str()).with_alias(identifier.alias.as_str())
            }),
    );
    let tree = backing_query(
        instruction,
        arguments,
        &field.possible_types,
        selections.collect(),
    );

    let span = tracing::info_span!(
        BATCH_HYDRATION_SPAN_NAME,
        "service.name" = instruction.service.as_str(),
        "otel.kind" = "INTERNAL"
    );
    let response = match execute(ctx, instruction, tree, span).await {
        Ok(response) => response,
        Err(err) => {
            return BatchOutcome {
                inputs,
                results: Err(err),
                errors: Vec::new(),
            }
        }
    };
    // backend errors cannot be tied to a single occurrence
    let errors = response
        .errors
        .iter()
        .cloned()
        .map(|error| error.with_path(None))
        .collect();
    let values = match backing_value(instruction, &response) {
        Value::Array(values) => values,
        Value::Null => Vec::new(),
        value => vec![value],
    };

    let results = match &candidate.instruction.match_strategy {
        MatchStrategy::MatchIndex if values.len() != batch.len() => {
            Err(FetchError::HydrationMatchCountMismatch {
                service: instruction.service.clone(),
                expected: batch.len(),
                actual: values.len(),
            })
        }
        MatchStrategy::MatchIndex => Ok(inputs.iter().cloned().zip(values).collect()),
        MatchStrategy::MatchObjectIdentifier { .. } | MatchStrategy::MatchObjectIdentifiers(_) => {
            let mut by_key: HashMap<String, Value> = values
                .into_iter()
                .filter_map(|value| {
                    let key = result_key(&candidate.identifiers, &value)?;
                    Some((key, strip(&candidate.identifiers, value)))
                })
                .collect();
            Ok(batch
                .iter()
                .zip(&inputs)
                .filter_map(|(input, key)| {
                    let value = by_key.remove(&input_key(&candidate.identifiers, input))?;
                    Some((key.clone(), value))
                })
                .collect())
        }
    };
    BatchOutcome {
        inputs,
        results,
        errors,
    }
}

/// The correlation key of a batch input.
fn input_key(identifiers: &[Identifier], input: &Value) -> String {
    identifiers
        .iter()
        .map(|identifier| match &identifier.input_key {
            Some(key) => value_key(
                input
                    .as_object()
                    .and_then(|object| object.get(key.as_str()))
                    .unwrap_or(&Value::Null),
            ),
            None => value_key(input),
        })
        .join("\u{1f}")
}

/// The correlation key of a batch result, if it carries every identifier.
fn result_key(identifiers: &[Identifier], result: &Value) -> Option<String> {
    let object = result.as_object()?;
    identifiers
        .iter()
        .map(|identifier| object.get(identifier.alias.as_str()).map(value_key))
        .collect::<Option<Vec<_>>>()
        .map(|keys| keys.join("\u{1f}"))
}

/// Removes the identifier fields from a batch result.
fn strip(identifiers: &[Identifier], mut result: Value) -> Value {
    if let Some(object) = result.as_object_mut() {
        for identifier in identifiers {
            object.remove(identifier.alias.as_str());
        }
    }
    result
}

/// Input values of an occurrence: a list input carries one value per element, `null`s skipped.
fn flatten(input: &Value) -> impl Iterator<Item = &Value> {
    let values = match input {
        Value::Array(items) => items.as_slice(),
        value => std::slice::from_ref(value),
    };
    values.iter().filter(|value| !value.is_null())
}

fn identifiers(ctx: &PlanningContext<'_>, strategy: &MatchStrategy) -> Vec<Identifier> {
    let identifier = |input_key: Option<&str>, result_field: &str| Identifier {
        input_key: input_key.map(str::to_string),
        result_field: result_field.to_string(),
        alias: ctx.aliases.alias("batch_hydration", result_field),
    };
    match strategy {
        MatchStrategy::MatchIndex => Vec::new(),
        MatchStrategy::MatchObjectIdentifier { result_field } => {
            vec![identifier(None, result_field)]
        }
        MatchStrategy::MatchObjectIdentifiers(identifiers) => identifiers
            .iter()
            .map(|object| identifier(Some(&object.input_key), &object.result_field))
            .collect(),
    }
}

fn validate_batch(
    ctx: &PlanningContext<'_>,
    coordinates: &FieldCoordinates,
    instruction: &BatchHydrationInstruction,
) -> Result<(), PlanningError> {
    validate(ctx, coordinates, &instruction.hydration)?;
    let malformed = |reason: &str| PlanningError::MalformedInstruction {
        coordinates: coordinates.to_string(),
        reason: reason.to_string(),
    };
    let batched = instruction
        .hydration
        .arguments
        .iter()
        .filter(|argument| matches!(argument.source, ValueSource::FieldValue { .. }))
        .count();
    if batched != 1 {
        return Err(malformed(
            "batch hydration needs exactly one argument sourced from a field",
        ));
    }
    match &instruction.match_strategy {
        MatchStrategy::MatchObjectIdentifiers(ids) if ids.is_empty() => {
            Err(malformed("object identifiers are empty"))
        }
        MatchStrategy::MatchObjectIdentifiers(ids)
            if ids
                .iter()
                .any(|id| id.input_key.is_empty() || id.result_field.is_empty()) =>
        {
            Err(malformed("object identifiers must name an input key and a result field"))
        }
        MatchStrategy::MatchObjectIdentifier { result_field } if result_field.is_empty() => {
            Err(malformed("object identifier must name a result field"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::engine::Engine;
    use crate::engine::ExecutionContext;
    use crate::instructions::InstructionSet;
    use crate::instructions::ObjectIdentifier;
    use crate::instructions::ServiceDefinition;
    use crate::query::DeterministicAliases;
    use crate::query::OperationKind;
    use crate::query::QueryTree;
    use crate::test_harness::MockService;
    use crate::transform::test_support::PlanningFixture;

    fn instructions(strategy: MatchStrategy) -> InstructionSet {
        InstructionSet::new()
            .with_service(ServiceDefinition::new("issues"))
            .with_service(ServiceDefinition::new("users"))
            .with_batch_hydration(
                FieldCoordinates::new("Issue", "owner"),
                BatchHydrationInstruction::new(
                    HydrationInstruction::new("users", ["usersByIds"])
                        .with_argument("ids", ValueSource::field(["ownerId"])),
                    strategy,
                ),
            )
    }

    fn tree() -> QueryTree {
        QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("issues").with_possible_types(["Issue"]).with_child(
                Field::new("owner")
                    .with_object_types(["Issue"])
                    .with_possible_types(["User"])
                    .with_child(Field::new("name").with_object_types(["User"])),
            )],
        )
    }

    fn issue(owner: Value) -> Value {
        json!({
            "batch_hydration__owner__typename": "Issue",
            "batch_hydration__owner__ownerId": owner,
        })
    }

    async fn resolve(
        instructions: InstructionSet,
        users: MockService,
        issues: Vec<Value>,
    ) -> Vec<ResultInstruction> {
        let fixture = PlanningFixture::new(tree(), instructions.clone(), "issues");
        let field = fixture.tree.field_at(&["issues", "owner"]).unwrap();
        let state = BatchHydration
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();
        let engine = Engine::builder()
            .instructions(instructions)
            .service("users", users)
            .alias_strategy(DeterministicAliases)
            .build();
        let execution = ExecutionContext::new(&engine, None, Default::default());
        let ctx = ResultContext {
            execution: &execution,
            service: &fixture.service,
            overall: &fixture.tree,
            transform_context: &fixture.transform_context,
        };
        let parents: Vec<JsonNode<'_>> = issues
            .iter()
            .enumerate()
            .map(|(index, issue)| JsonNode::new(Path::from("issues").with_index(index), issue))
            .collect();
        BatchHydration
            .result_instructions(&ctx, field, &state, &parents)
            .await
    }

    fn set(path: &str, value: Value) -> ResultInstruction {
        ResultInstruction::Set {
            path: Path::from(path),
            value,
        }
    }

    #[test(tokio::test)]
    async fn object_identifier_matches_out_of_order_results() {
        let users = MockService::new().with_response(
            r#"query { usersByIds(ids: ["A", "B", "C"]) { name batch_hydration__id: id } }"#,
            json!({"data": {"usersByIds": [
                {"name": "Carol", "batch_hydration__id": "C"},
                {"name": "Alice", "batch_hydration__id": "A"},
            ]}}),
        );
        let result = resolve(
            instructions(MatchStrategy::MatchObjectIdentifier {
                result_field: "id".to_string(),
            }),
            users.clone(),
            vec![issue(json!("A")), issue(json!("B")), issue(json!("C")), issue(json!("A"))],
        )
        .await;
        assert_eq!(
            result,
            vec![
                set("issues/0/owner", json!({"name": "Alice"})),
                set("issues/1/owner", Value::Null),
                set("issues/2/owner", json!({"name": "Carol"})),
                set("issues/3/owner", json!({"name": "Alice"})),
            ]
        );
        assert_eq!(users.requests().len(), 1);
    }

    #[test(tokio::test)]
    async fn index_mismatch_fails_every_occurrence_of_the_batch() {
        let users = MockService::new().with_response(
            r#"query { usersByIds(ids: ["A", "B"]) { name } }"#,
            json!({"data": {"usersByIds": [{"name": "Alice"}]}}),
        );
        let result = resolve(
            instructions(MatchStrategy::MatchIndex),
            users,
            vec![issue(json!("A")), issue(json!("B")), issue(Value::Null)],
        )
        .await;

        assert_eq!(result[0], set("issues/2/owner", Value::Null));
        let errors: Vec<(&Option<Path>, Option<String>)> = result
            .iter()
            .filter_map(|instruction| match instruction {
                ResultInstruction::AddError(error) => Some((&error.path, error.extension_code())),
                _ => None,
            })
            .collect();
        assert_eq!(
            errors,
            vec![
                (
                    &Some(Path::from("issues/0/owner")),
                    Some("HYDRATION_MATCH_COUNT_MISMATCH".to_string())
                ),
                (
                    &Some(Path::from("issues/1/owner")),
                    Some("HYDRATION_MATCH_COUNT_MISMATCH".to_string())
                ),
            ]
        );
        assert!(result.contains(&set("issues/0/owner", Value::Null)));
        assert!(result.contains(&set("issues/1/owner", Value::Null)));
    }

    #[test(tokio::test)]
    async fn composite_identifiers_and_list_inputs() {
        let instructions = InstructionSet::new()
            .with_service(ServiceDefinition::new("issues"))
            .with_service(ServiceDefinition::new("users"))
            .with_batch_hydration(
                FieldCoordinates::new("Issue", "owner"),
                BatchHydrationInstruction::new(
                    HydrationInstruction::new("users", ["usersByKeys"])
                        .with_argument("keys", ValueSource::field(["ownerId"])),
                    MatchStrategy::MatchObjectIdentifiers(vec![
                        ObjectIdentifier {
                            input_key: "org".to_string(),
                            result_field: "orgId".to_string(),
                        },
                        ObjectIdentifier {
                            input_key: "login".to_string(),
                            result_field: "login".to_string(),
                        },
                    ]),
                )
                .with_batch_size(1),
            );
        let users = MockService::new()
            .with_response(
                concat!(
                    r#"query { usersByKeys(keys: [{org: 1, login: "ada"}]) { name "#,
                    "batch_hydration__orgId: orgId batch_hydration__login: login } }",
                ),
                json!({"data": {"usersByKeys": [
                    {"name": "Ada", "batch_hydration__orgId": 1, "batch_hydration__login": "ada"},
                ]}}),
            )
            .with_response(
                concat!(
                    r#"query { usersByKeys(keys: [{org: 2, login: "bob"}]) { name "#,
                    "batch_hydration__orgId: orgId batch_hydration__login: login } }",
                ),
                json!({"data": {"usersByKeys": []}}),
            );
        let result = resolve(
            instructions,
            users.clone(),
            vec![issue(json!([{"org": 1, "login": "ada"}, {"org": 2, "login": "bob"}]))],
        )
        .await;
        assert_eq!(
            result,
            vec![set("issues/0/owner", json!([{"name": "Ada"}, null]))]
        );
        assert_eq!(users.requests().len(), 2);
    }

    #[test]
    fn batch_instruction_needs_one_field_argument() {
        let instructions = InstructionSet::new()
            .with_service(ServiceDefinition::new("issues"))
            .with_service(ServiceDefinition::new("users"))
            .with_batch_hydration(
                FieldCoordinates::new("Issue", "owner"),
                BatchHydrationInstruction::new(
                    HydrationInstruction::new("users", ["usersByIds"]),
                    MatchStrategy::MatchIndex,
                ),
            );
        let fixture = PlanningFixture::new(tree(), instructions, "issues");
        let field = fixture.tree.field_at(&["issues", "owner"]).unwrap();
        assert!(matches!(
            BatchHydration.is_applicable(&fixture.context(), field),
            Err(PlanningError::MalformedInstruction { .. })
        ));
    }

    #[test(tokio::test)]
    async fn field_native_on_other_types_is_kept() {
        let users = MockService::new().with_response(
            r#"query { usersByIds(ids: ["A"]) { name } }"#,
            json!({"data": {"usersByIds": [{"name": "Alice"}]}}),
        );
        let result = resolve(
            instructions(MatchStrategy::MatchIndex),
            users,
            vec![issue(json!("A")), json!({"owner": {"name": "Native"}})],
        )
        .await;
        assert_eq!(result, vec![set("issues/0/owner", json!({"name": "Alice"}))]);

        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("nodes")
                .with_possible_types(["Comment", "Issue"])
                .with_child(
                    Field::new("owner")
                        .with_object_types(["Comment", "Issue"])
                        .with_child(Field::new("name").with_object_types(["User"])),
                )],
        );
        let fixture =
            PlanningFixture::new(tree, instructions(MatchStrategy::MatchIndex), "issues");
        let field = fixture.tree.field_at(&["nodes", "owner"]).unwrap();
        let state = BatchHydration
            .is_applicable(&fixture.context(), field)
            .unwrap()
            .unwrap();
        assert!(!state.drops_field());
        let rewrite = BatchHydration.rewrite_field(
            &RewriteContext {
                service: &fixture.service,
            },
            fixture.tree.detach(field.id()),
            &state,
        );
        assert_eq!(
            rewrite.replacement.map(|field| field.object_types),
            Some(BTreeSet::from(["Comment".to_string()]))
        );
    }

    #[test]
    fn single_hydration_takes_precedence() {
        let instructions = instructions(MatchStrategy::MatchIndex).with_hydration(
            FieldCoordinates::new("Issue", "owner"),
            HydrationInstruction::new("users", ["user"])
                .with_argument("id", ValueSource::field(["ownerId"])),
        );
        let fixture = PlanningFixture::new(tree(), instructions, "issues");
        let field = fixture.tree.field_at(&["issues", "owner"]).unwrap();
        assert_eq!(
            BatchHydration.is_applicable(&fixture.context(), field),
            Ok(None)
        );
    }
}

//! Fields resolved by a query to another service.
//!
//! A hydrated field is removed from the query sent to its own service on the object types it is
//! hydrated on, and kept on the others. The fields of the parent object that feed the hydration
//! arguments (the source fields) are selected in its place under injected aliases, together with a
//! `__typename` marker telling which object type each parent is.
//! When stitching, the source values are read back, a backing query is built and executed through
//! the whole pipeline, and the backing field's value is written where the hydrated field belongs.

use std::collections::BTreeSet;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::Instrument;

use crate::error::FetchError;
use crate::error::PlanningError;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::instructions::FieldCoordinates;
use crate::instructions::HydrationInstruction;
use crate::instructions::ValueSource;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::query::Field;
use crate::query::FieldNode;
use crate::query::OperationKind;
use crate::query::QueryTree;
use crate::services::HydrationSource;
use crate::transform::PlanningContext;
use crate::transform::ResultContext;
use crate::Configuration;

pub(crate) mod batch;
pub(crate) mod single;

pub(crate) const HYDRATION_SPAN_NAME: &str = "hydration";
pub(crate) const BATCH_HYDRATION_SPAN_NAME: &str = "batch_hydration";

/// Hydration settings, resolved once per operation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HydrationContext {
    pub(crate) timeout: Duration,
    pub(crate) max_batch_size: usize,
}

impl HydrationContext {
    pub(crate) fn new(configuration: &Configuration) -> Self {
        Self {
            timeout: configuration.hydration.timeout,
            max_batch_size: configuration.hydration.max_batch_size,
        }
    }
}

/// The fields selected on a hydrated field's parent so its hydrations can be resolved.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SourceFields {
    /// Top-level source fields, by name, with their alias and nested selections.
    fields: Vec<SourceField>,
    typename: String,
    object_types: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq)]
struct SourceField {
    name: String,
    alias: String,
    nested: Vec<Vec<String>>,
}

impl SourceFields {
    /// Source fields of `field`, selected on the hydrated `object_types` only.
    pub(crate) fn new<'i>(
        ctx: &PlanningContext<'_>,
        field: &FieldNode,
        object_types: BTreeSet<String>,
        tag: &str,
        paths: impl IntoIterator<Item = &'i Vec<String>>,
    ) -> Self {
        let tag = format!("{tag}__{}", field.result_key());
        let mut grouped: IndexMap<&str, Vec<Vec<String>>> = IndexMap::new();
        for path in paths {
            if let Some((first, rest)) = path.split_first() {
                let nested = grouped.entry(first.as_str()).or_default();
                if !rest.is_empty() && !nested.iter().any(|known| known.as_slice() == rest) {
                    nested.push(rest.to_vec());
                }
            }
        }
        Self {
            fields: grouped
                .into_iter()
                .map(|(name, nested)| SourceField {
                    name: name.to_string(),
                    alias: ctx.aliases.alias(&tag, name),
                    nested,
                })
                .collect(),
            typename: ctx.aliases.alias(&tag, "typename"),
            object_types,
        }
    }

    /// The artificial fields to select next to a field still selected on `field_types`.
    pub(crate) fn artificial_fields(&self, field_types: &BTreeSet<String>) -> Vec<Field> {
        let object_types: BTreeSet<&String> =
            self.object_types.intersection(field_types).collect();
        if object_types.is_empty() {
            return Vec::new();
        }
        std::iter::once(
            Field::typename(self.typename.as_str()).with_object_types(object_types.iter().copied()),
        )
        .chain(self.fields.iter().map(|source| {
            Field::new(source.name.as_str())
                .with_alias(source.alias.as_str())
                .with_object_types(object_types.iter().copied())
                .with_children(selection(&source.nested))
        }))
        .collect()
    }

    /// The overall type of `parent`, if the hydrated field was selected on it.
    pub(crate) fn object_type<'a>(
        &self,
        ctx: &'a ResultContext<'_>,
        parent: &'a Object,
    ) -> Option<&'a str> {
        let underlying = parent.get(self.typename.as_str())?.as_str()?;
        Some(ctx.service.overall_type_name(underlying))
    }

    /// Reads every source value `instructions` need from `parent`.
    pub(crate) fn read<'i>(
        &self,
        parent: &Object,
        instructions: impl IntoIterator<Item = &'i HydrationInstruction>,
    ) -> HydrationSource {
        let mut values: Vec<(Vec<String>, Value)> = Vec::new();
        for path in instructions.into_iter().flat_map(HydrationInstruction::source_paths) {
            if values.iter().any(|(known, _)| known == path) {
                continue;
            }
            let value = path
                .split_first()
                .and_then(|(first, rest)| {
                    let source = self.fields.iter().find(|source| source.name == *first)?;
                    Some(parent.get(source.alias.as_str())?.select_keys(rest))
                })
                .unwrap_or(Value::Null);
            values.push((path.clone(), value));
        }
        HydrationSource::new(values)
    }
}

/// Nested selections for the given relative paths.
fn selection(paths: &[Vec<String>]) -> Vec<Field> {
    let mut grouped: IndexMap<&str, Vec<Vec<String>>> = IndexMap::new();
    for path in paths {
        if let Some((first, rest)) = path.split_first() {
            let nested = grouped.entry(first.as_str()).or_default();
            if !rest.is_empty() {
                nested.push(rest.to_vec());
            }
        }
    }
    grouped
        .into_iter()
        .map(|(name, nested)| Field::new(name).with_children(selection(&nested)))
        .collect()
}

/// Rejects instructions that can never be executed.
pub(crate) fn validate(
    ctx: &PlanningContext<'_>,
    coordinates: &FieldCoordinates,
    instruction: &HydrationInstruction,
) -> Result<(), PlanningError> {
    if instruction.backing_field.is_empty() {
        return Err(PlanningError::MalformedInstruction {
            coordinates: coordinates.to_string(),
            reason: "backing field path is empty".to_string(),
        });
    }
    if ctx.instructions.service(&instruction.service).is_none() {
        return Err(PlanningError::UnknownService {
            service: instruction.service.clone(),
        });
    }
    Ok(())
}

/// Resolves the arguments of the backing field.
pub(crate) fn resolve_arguments(
    instruction: &HydrationInstruction,
    field_arguments: &Object,
    source: &HydrationSource,
) -> Object {
    instruction
        .arguments
        .iter()
        .map(|argument| {
            let value = match &argument.source {
                ValueSource::FieldValue { path } => source.value(path).cloned(),
                ValueSource::Argument { name } => field_arguments.get(name.as_str()).cloned(),
                ValueSource::Literal(value) => Some(value.clone()),
            };
            (argument.name.as_str().into(), value.unwrap_or(Value::Null))
        })
        .collect()
}

/// The query sent to the backing service: the backing field path, its arguments on the last
/// segment and the hydrated field's selections below it.
///
/// `possible_types` are the hydrated field's possible types, carried by the backing field.
pub(crate) fn backing_query(
    instruction: &HydrationInstruction,
    arguments: Object,
    possible_types: &BTreeSet<String>,
    children: Vec<Field>,
) -> QueryTree {
    let mut segments = instruction.backing_field.iter().rev();
    let mut field = Field::new(segments.next().map(String::as_str).unwrap_or_default())
        .with_arguments(arguments)
        .with_possible_types(possible_types.iter())
        .with_children(children);
    for segment in segments {
        field = Field::new(segment.as_str()).with_child(field);
    }
    QueryTree::from_fields(OperationKind::Query, [field])
}

/// The hydrated field's selections, detached from the overall tree.
pub(crate) fn hydrated_selections(ctx: &ResultContext<'_>, field: &FieldNode) -> Vec<Field> {
    field
        .children()
        .iter()
        .map(|child| ctx.overall.detach(*child).without_origin())
        .collect()
}

/// Executes a backing query with the hydration timeout, inside `span`.
pub(crate) async fn execute(
    ctx: &ResultContext<'_>,
    instruction: &HydrationInstruction,
    tree: QueryTree,
    span: tracing::Span,
) -> Result<Response, FetchError> {
    let timeout = instruction
        .timeout
        .unwrap_or(ctx.transform_context.hydration.timeout);
    tracing::debug!(
        service = instruction.service.as_str(),
        backing_field = %instruction.backing_field.join("."),
        "executing hydration"
    );
    tokio::time::timeout(
        timeout,
        ctx.execution
            .execute_query(&instruction.service, tree, true),
    )
    .instrument(span)
    .await
    .unwrap_or_else(|_| {
        tracing::warn!(
            service = instruction.service.as_str(),
            "hydration timed out"
        );
        Err(FetchError::SubrequestTimeout {
            service: instruction.service.clone(),
            timeout_ms: timeout.as_millis() as u64,
        })
    })
}

/// The backing field's value in a backing response.
pub(crate) fn backing_value(instruction: &HydrationInstruction, response: &Response) -> Value {
    response
        .data
        .as_ref()
        .and_then(|data| {
            data.get_path(&Path::from_keys(instruction.backing_field.iter().cloned()))
        })
        .cloned()
        .unwrap_or(Value::Null)
}

/// Moves a backing response error under the hydrated field at `target`.
pub(crate) fn repath_error(
    instruction: &HydrationInstruction,
    target: &Path,
    error: Error,
) -> Error {
    let relative = error.path.as_ref().and_then(|path| {
        let prefix_len = instruction.backing_field.len();
        let prefix_matches = path.len() >= prefix_len
            && path
                .iter()
                .zip(&instruction.backing_field)
                .all(|(element, key)| matches!(element, PathElement::Key(k) if k == key));
        prefix_matches.then(|| Path(path.iter().skip(prefix_len).cloned().collect()))
    });
    let path = match relative {
        Some(relative) => target.join(&relative),
        None => target.clone(),
    };
    error.with_path(Some(path))
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::instructions::InstructionSet;
    use crate::instructions::ServiceDefinition;
    use crate::transform::test_support::PlanningFixture;

    fn instruction() -> HydrationInstruction {
        HydrationInstruction::new("users", ["user", "byId"])
            .with_argument("id", ValueSource::field(["owner", "id"]))
            .with_argument("locale", ValueSource::argument("locale"))
            .with_argument("version", ValueSource::Literal(json!(2)))
    }

    fn fixture() -> PlanningFixture {
        let tree = QueryTree::from_fields(
            OperationKind::Query,
            [Field::new("issue").with_child(
                Field::new("owner")
                    .with_argument("locale", "fr")
                    .with_object_types(["Issue"])
                    .with_child(Field::new("name").with_object_types(["User"])),
            )],
        );
        let instructions = InstructionSet::new()
            .with_service(ServiceDefinition::new("issues"))
            .with_service(ServiceDefinition::new("users"));
        PlanningFixture::new(tree, instructions, "issues")
    }

    #[test]
    fn source_fields_are_aliased_and_nested() {
        let fixture = fixture();
        let owner = fixture.tree.field_at(&["issue", "owner"]).unwrap();
        let instruction = instruction();
        let sources = SourceFields::new(
            &fixture.context(),
            owner,
            owner.object_types.clone(),
            "hydration",
            instruction.source_paths(),
        );
        assert!(sources
            .artificial_fields(&BTreeSet::from(["Comment".to_string()]))
            .is_empty());
        assert_eq!(
            sources.artificial_fields(&owner.object_types),
            vec![
                Field::typename("hydration__owner__typename").with_object_types(["Issue"]),
                Field::new("owner")
                    .with_alias("hydration__owner__owner")
                    .with_object_types(["Issue"])
                    .with_child(Field::new("id")),
            ]
        );

        let parent = json!({
            "hydration__owner__typename": "Issue",
            "hydration__owner__owner": {"id": "u1"},
        });
        let source = sources.read(parent.as_object().unwrap(), [&instruction]);
        assert_eq!(
            source.value(&["owner".to_string(), "id".to_string()]),
            Some(&json!("u1"))
        );

        let arguments = resolve_arguments(&instruction, &owner.arguments, &source);
        assert_eq!(
            Value::Object(arguments),
            json!({"id": "u1", "locale": "fr", "version": 2})
        );
    }

    #[test]
    fn backing_query_nests_the_backing_field() {
        let mut arguments = Object::new();
        arguments.insert("id", json!("u1"));
        let possible_types = BTreeSet::from(["User".to_string()]);
        let tree = backing_query(
            &instruction(),
            arguments,
            &possible_types,
            vec![Field::new("name")],
        );
        let by_id = tree.field_at(&["user", "byId"]).unwrap();
        assert_eq!(by_id.arguments.get("id"), Some(&json!("u1")));
        assert_eq!(by_id.possible_types, possible_types);
        assert_eq!(tree.children(by_id.id()).next().unwrap().name, "name");
    }

    #[test]
    fn unknown_backing_service_is_a_planning_error() {
        let fixture = fixture();
        let coordinates = FieldCoordinates::new("Issue", "owner");
        let instruction = HydrationInstruction::new("billing", ["invoice"]);
        assert_eq!(
            validate(&fixture.context(), &coordinates, &instruction),
            Err(PlanningError::UnknownService {
                service: "billing".to_string()
            })
        );
        let empty = HydrationInstruction::new("users", Vec::<String>::new());
        assert!(matches!(
            validate(&fixture.context(), &coordinates, &empty),
            Err(PlanningError::MalformedInstruction { .. })
        ));
    }

    #[test]
    fn errors_are_moved_under_the_hydrated_field() {
        let error = Error::builder()
            .message("boom")
            .path(Path::from("user/byId/name"))
            .build();
        let repathed = repath_error(&instruction(), &Path::from("issue/owner"), error);
        assert_eq!(repathed.path, Some(Path::from("issue/owner/name")));

        let unrelated = Error::builder().message("boom").build();
        let repathed = repath_error(&instruction(), &Path::from("issue/owner"), unrelated);
        assert_eq!(repathed.path, Some(Path::from("issue/owner")));
    }
}

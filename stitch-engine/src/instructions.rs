//! The instruction set: how each overall field maps onto backend services.
//!
//! Instructions are keyed by [`FieldCoordinates`] and are built ahead of time from schema
//! directives, which are outside the scope of this crate.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use regex::Regex;

use crate::json_ext::Value;
use crate::query::FieldNode;

/// A field of an object type, `Type.field`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldCoordinates {
    pub type_name: String,
    pub field_name: String,
}

impl FieldCoordinates {
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }

    /// Coordinates of `field` on every object type it may be selected on.
    pub fn of(field: &FieldNode) -> impl Iterator<Item = FieldCoordinates> + '_ {
        field
            .object_types
            .iter()
            .map(|type_name| FieldCoordinates::new(type_name.as_str(), field.name.as_str()))
    }
}

impl fmt::Display for FieldCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// A backend service and the part of the overall schema it serves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    root_fields: BTreeSet<FieldCoordinates>,
    object_types: BTreeSet<String>,
    type_renames: BTreeMap<String, String>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declares that the service resolves the top-level field `type_name.field_name`.
    pub fn with_root_field(mut self, type_name: &str, field_name: &str) -> Self {
        self.root_fields
            .insert(FieldCoordinates::new(type_name, field_name));
        self
    }

    /// Restricts the overall object types the service exposes. A service declaring none exposes
    /// every type.
    pub fn with_object_types<I, S>(mut self, object_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_types
            .extend(object_types.into_iter().map(Into::into));
        self
    }

    /// The overall type `overall` is called `underlying` by this service.
    pub fn with_type_rename(mut self, overall: &str, underlying: &str) -> Self {
        self.type_renames
            .insert(overall.to_string(), underlying.to_string());
        self
    }

    pub fn owns_root_field(&self, coordinates: &FieldCoordinates) -> bool {
        self.root_fields.contains(coordinates)
    }

    pub fn exposes_type(&self, overall: &str) -> bool {
        self.object_types.is_empty() || self.object_types.contains(overall)
    }

    pub fn exposed_types(&self) -> &BTreeSet<String> {
        &self.object_types
    }

    pub fn underlying_type_name<'a>(&'a self, overall: &'a str) -> &'a str {
        self.type_renames
            .get(overall)
            .map(String::as_str)
            .unwrap_or(overall)
    }

    pub fn overall_type_name<'a>(&'a self, underlying: &'a str) -> &'a str {
        self.type_renames
            .iter()
            .find(|(_, name)| name.as_str() == underlying)
            .map(|(overall, _)| overall.as_str())
            .unwrap_or(underlying)
    }
}

/// The field is called `from` by its backend service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameInstruction {
    pub from: String,
}

/// The field is read from a nested path of its backend service, e.g. `details.owner.name`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeepRenameInstruction {
    pub path: Vec<String>,
}

/// The list argument `argument` of a top-level field may be split across several calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionInstruction {
    pub argument: String,
}

/// Where a hydration argument takes its value from.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueSource {
    /// A field of the object holding the hydrated field, read from the underlying response.
    FieldValue { path: Vec<String> },
    /// An argument of the hydrated field.
    Argument { name: String },
    /// A constant.
    Literal(Value),
}

impl ValueSource {
    pub fn field<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ValueSource::FieldValue {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn argument(name: impl Into<String>) -> Self {
        ValueSource::Argument { name: name.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HydrationArgument {
    pub name: String,
    pub source: ValueSource,
}

/// A test applied to the value of a source field.
#[derive(Clone, Debug)]
pub enum Predicate {
    Equals(Value),
    NumericEquals(i64),
    Matches(Regex),
    StartsWith(String),
}

impl Predicate {
    pub fn evaluate(&self, value: &Value) -> bool {
        match self {
            Predicate::Equals(expected) => value == expected,
            Predicate::NumericEquals(expected) => value.as_i64() == Some(*expected),
            Predicate::Matches(regex) => value.as_str().is_some_and(|s| regex.is_match(s)),
            Predicate::StartsWith(prefix) => {
                value.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
            }
        }
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Predicate::Equals(a), Predicate::Equals(b)) => a == b,
            (Predicate::NumericEquals(a), Predicate::NumericEquals(b)) => a == b,
            (Predicate::Matches(a), Predicate::Matches(b)) => a.as_str() == b.as_str(),
            (Predicate::StartsWith(a), Predicate::StartsWith(b)) => a == b,
            _ => false,
        }
    }
}

/// Activates a hydration instruction only when the source field at `path` satisfies
/// `predicate`.
#[derive(Clone, Debug, PartialEq)]
pub struct HydrationCondition {
    pub path: Vec<String>,
    pub predicate: Predicate,
}

/// Resolves a field with a query to another service.
#[derive(Clone, Debug, PartialEq)]
pub struct HydrationInstruction {
    /// The backing service.
    pub service: String,
    /// Path of the backing field from the backing service's query root.
    pub backing_field: Vec<String>,
    /// Arguments of the backing field, in order.
    pub arguments: Vec<HydrationArgument>,
    pub condition: Option<HydrationCondition>,
    /// Overrides the configured hydration timeout.
    pub timeout: Option<Duration>,
}

impl HydrationInstruction {
    pub fn new<I, S>(service: impl Into<String>, backing_field: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service: service.into(),
            backing_field: backing_field.into_iter().map(Into::into).collect(),
            arguments: Vec::new(),
            condition: None,
            timeout: None,
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, source: ValueSource) -> Self {
        self.arguments.push(HydrationArgument {
            name: name.into(),
            source,
        });
        self
    }

    pub fn with_condition<I, S>(mut self, path: I, predicate: Predicate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.condition = Some(HydrationCondition {
            path: path.into_iter().map(Into::into).collect(),
            predicate,
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Paths of every source field the instruction reads.
    pub fn source_paths(&self) -> impl Iterator<Item = &Vec<String>> {
        self.arguments
            .iter()
            .filter_map(|argument| match &argument.source {
                ValueSource::FieldValue { path } => Some(path),
                _ => None,
            })
            .chain(self.condition.iter().map(|condition| &condition.path))
    }

    /// The first argument sourced from a field.
    pub fn field_argument(&self) -> Option<(&str, &[String])> {
        self.arguments
            .iter()
            .find_map(|argument| match &argument.source {
                ValueSource::FieldValue { path } => Some((argument.name.as_str(), path.as_slice())),
                _ => None,
            })
    }
}

/// One component of a composite identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectIdentifier {
    /// Key of the input object sent to the backing field.
    pub input_key: String,
    /// Field of each result element holding the same value.
    pub result_field: String,
}

/// How batch results are correlated with batch inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchStrategy {
    /// The backing field returns exactly one result per input, in input order.
    MatchIndex,
    /// Each result carries the input it answers in `result_field`.
    MatchObjectIdentifier { result_field: String },
    /// Inputs are objects, results carry each component of the key.
    MatchObjectIdentifiers(Vec<ObjectIdentifier>),
}

/// Resolves many occurrences of a field with one query per batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchHydrationInstruction {
    pub hydration: HydrationInstruction,
    pub match_strategy: MatchStrategy,
    /// Preferred number of inputs per call; capped by configuration.
    pub batch_size: Option<usize>,
}

impl BatchHydrationInstruction {
    pub fn new(hydration: HydrationInstruction, match_strategy: MatchStrategy) -> Self {
        Self {
            hydration,
            match_strategy,
            batch_size: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// Every instruction the engine applies, keyed by field coordinates.
#[derive(Clone, Debug, Default)]
pub struct InstructionSet {
    services: IndexMap<String, Arc<ServiceDefinition>>,
    renames: HashMap<FieldCoordinates, RenameInstruction>,
    deep_renames: HashMap<FieldCoordinates, DeepRenameInstruction>,
    hydrations: HashMap<FieldCoordinates, Vec<Arc<HydrationInstruction>>>,
    batch_hydrations: HashMap<FieldCoordinates, Vec<Arc<BatchHydrationInstruction>>>,
    stubs: HashSet<FieldCoordinates>,
    partitions: HashMap<FieldCoordinates, PartitionInstruction>,
}

impl InstructionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: ServiceDefinition) -> Self {
        self.services
            .insert(service.name.clone(), Arc::new(service));
        self
    }

    pub fn with_rename(mut self, coordinates: FieldCoordinates, from: &str) -> Self {
        self.renames.insert(
            coordinates,
            RenameInstruction {
                from: from.to_string(),
            },
        );
        self
    }

    pub fn with_deep_rename<I, S>(mut self, coordinates: FieldCoordinates, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deep_renames.insert(
            coordinates,
            DeepRenameInstruction {
                path: path.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Adds a candidate hydration for the field. Several candidates are told apart by their
    /// conditions.
    pub fn with_hydration(
        mut self,
        coordinates: FieldCoordinates,
        instruction: HydrationInstruction,
    ) -> Self {
        self.hydrations
            .entry(coordinates)
            .or_default()
            .push(Arc::new(instruction));
        self
    }

    pub fn with_batch_hydration(
        mut self,
        coordinates: FieldCoordinates,
        instruction: BatchHydrationInstruction,
    ) -> Self {
        self.batch_hydrations
            .entry(coordinates)
            .or_default()
            .push(Arc::new(instruction));
        self
    }

    /// The field exists in the overall schema only and always resolves to `null`.
    pub fn with_stub(mut self, coordinates: FieldCoordinates) -> Self {
        self.stubs.insert(coordinates);
        self
    }

    pub fn with_partition(mut self, coordinates: FieldCoordinates, argument: &str) -> Self {
        self.partitions.insert(
            coordinates,
            PartitionInstruction {
                argument: argument.to_string(),
            },
        );
        self
    }

    pub fn service(&self, name: &str) -> Option<&Arc<ServiceDefinition>> {
        self.services.get(name)
    }

    pub fn services(&self) -> impl Iterator<Item = &Arc<ServiceDefinition>> {
        self.services.values()
    }

    /// The service resolving the top-level field at `coordinates`.
    pub fn owning_service(
        &self,
        coordinates: &FieldCoordinates,
    ) -> Option<&Arc<ServiceDefinition>> {
        self.services
            .values()
            .find(|service| service.owns_root_field(coordinates))
    }

    pub fn rename(&self, coordinates: &FieldCoordinates) -> Option<&RenameInstruction> {
        self.renames.get(coordinates)
    }

    pub fn deep_rename(&self, coordinates: &FieldCoordinates) -> Option<&DeepRenameInstruction> {
        self.deep_renames.get(coordinates)
    }

    pub fn hydrations(&self, coordinates: &FieldCoordinates) -> &[Arc<HydrationInstruction>] {
        self.hydrations
            .get(coordinates)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn batch_hydrations(
        &self,
        coordinates: &FieldCoordinates,
    ) -> &[Arc<BatchHydrationInstruction>] {
        self.batch_hydrations
            .get(coordinates)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_stubbed(&self, coordinates: &FieldCoordinates) -> bool {
        self.stubs.contains(coordinates)
    }

    pub fn partition(&self, coordinates: &FieldCoordinates) -> Option<&PartitionInstruction> {
        self.partitions.get(coordinates)
    }
}

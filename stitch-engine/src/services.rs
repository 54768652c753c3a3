//! Seams between the engine and the outside world: backend calls and caller-supplied hooks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::FetchError;
use crate::graphql;
use crate::graphql::Response;
use crate::instructions::BatchHydrationInstruction;
use crate::instructions::HydrationInstruction;
use crate::instructions::ServiceDefinition;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::query::FieldNode;
use crate::query::QueryTree;

/// Sends a compiled document to a backend service.
#[async_trait]
pub trait ServiceExecution: Send + Sync {
    async fn execute(&self, request: ServiceRequest) -> Result<Response, FetchError>;
}

/// A call to a backend service.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ServiceRequest {
    pub service_name: String,
    /// The underlying query, printed.
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Object,
    /// The underlying query.
    pub tree: Arc<QueryTree>,
    pub context: ServiceContext,
    /// Whether the call resolves a hydrated field.
    pub is_hydration: bool,
}

/// Per-operation, per-service data produced by [`Hooks::create_service_context`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceContext {
    data: Object,
}

impl ServiceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key, value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Values of the source fields read for one hydration occurrence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HydrationSource {
    values: Vec<(Vec<String>, Value)>,
}

impl HydrationSource {
    pub(crate) fn new(values: Vec<(Vec<String>, Value)>) -> Self {
        Self { values }
    }

    /// The value read for the source field at `path`.
    pub fn value(&self, path: &[String]) -> Option<&Value> {
        self.values
            .iter()
            .find(|(source, _)| source.as_slice() == path)
            .map(|(_, value)| value)
    }
}

/// Caller-supplied behavior. Every method has a default.
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Builds the context handed to every call made to `service` during one operation.
    ///
    /// Runs at most once per service per operation.
    async fn create_service_context(&self, _service: &ServiceDefinition) -> ServiceContext {
        ServiceContext::default()
    }

    /// Picks the service resolving a top-level field, overriding the instruction set.
    ///
    /// Returning an error fails that field only.
    fn resolve_service_for_field(
        &self,
        _services: &[Arc<ServiceDefinition>],
        _field: &FieldNode,
    ) -> Option<Result<Arc<ServiceDefinition>, graphql::Error>> {
        None
    }

    /// Picks which of several candidate hydrations resolves one occurrence of a field.
    ///
    /// `None` resolves the field to `null` without any call.
    fn choose_hydration_instruction(
        &self,
        candidates: &[&HydrationInstruction],
        source: &HydrationSource,
    ) -> Option<usize> {
        candidates.iter().position(|candidate| {
            candidate.condition.as_ref().map_or(true, |condition| {
                source
                    .value(&condition.path)
                    .is_some_and(|value| condition.predicate.evaluate(value))
            })
        })
    }

    /// Splits de-duplicated batch inputs into the batches sent to the backing service.
    fn partition_batch_arguments(
        &self,
        values: Vec<Value>,
        batch_size: usize,
        _instruction: &BatchHydrationInstruction,
    ) -> Vec<Vec<Value>> {
        values
            .chunks(batch_size.max(1))
            .map(<[Value]>::to_vec)
            .collect()
    }

    /// Splits the list argument of a partitioned top-level field. A single partition disables
    /// partitioning.
    fn partition_field_argument(&self, _field: &FieldNode, values: &[Value]) -> Vec<Vec<Value>> {
        vec![values.to_vec()]
    }
}

/// [`Hooks`] with every default.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}

/// Creates each service context at most once per operation.
///
/// The first caller for a service computes the context; concurrent callers wait for that same
/// computation.
#[derive(Debug, Default)]
pub(crate) struct ServiceContextCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<ServiceContext>>>>,
}

impl ServiceContextCache {
    pub(crate) async fn get_or_create(
        &self,
        service: &ServiceDefinition,
        hooks: &dyn Hooks,
    ) -> ServiceContext {
        let cell = self
            .cells
            .lock()
            .entry(service.name.clone())
            .or_default()
            .clone();
        cell.get_or_init(|| hooks.create_service_context(service))
            .await
            .clone()
    }
}

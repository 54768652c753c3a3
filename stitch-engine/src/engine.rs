//! Executes overall queries against the registered services.

use std::collections::HashMap;
use std::sync::Arc;

use derivative::Derivative;
use futures::future;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use tracing::Instrument;

use crate::error::FetchError;
use crate::error::PlanningError;
use crate::graphql;
use crate::graphql::Response;
use crate::instructions::FieldCoordinates;
use crate::instructions::InstructionSet;
use crate::instructions::ServiceDefinition;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::plan::ExecutionPlan;
use crate::plan::ExecutionPlanner;
use crate::query::document;
use crate::query::AliasAssigner;
use crate::query::AliasStrategy;
use crate::query::DeterministicAliases;
use crate::query::FieldId;
use crate::query::FieldNode;
use crate::query::OperationKind;
use crate::query::QueryTree;
use crate::query::RandomAliases;
use crate::query::TYPENAME;
use crate::result::stitch;
use crate::rewrite::QueryRewriter;
use crate::rewrite::RewriteOutput;
use crate::services::DefaultHooks;
use crate::services::Hooks;
use crate::services::ServiceContextCache;
use crate::services::ServiceExecution;
use crate::services::ServiceRequest;
use crate::transform::PlanningContext;
use crate::transform::ResultContext;
use crate::transform::TransformContext;
use crate::Configuration;

pub(crate) const EXECUTE_SPAN_NAME: &str = "execute";
pub(crate) const FIELD_SPAN_NAME: &str = "execute_field";
pub(crate) const SERVICE_CALL_SPAN_NAME: &str = "fetch";

/// Executes overall queries.
///
/// An engine is immutable once built and can serve any number of concurrent operations.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Engine {
    instructions: Arc<InstructionSet>,
    #[derivative(Debug = "ignore")]
    services: HashMap<String, Arc<dyn ServiceExecution>>,
    #[derivative(Debug = "ignore")]
    hooks: Arc<dyn Hooks>,
    alias_strategy: Arc<dyn AliasStrategy>,
    configuration: Arc<Configuration>,
}

/// Builds an [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    instructions: InstructionSet,
    services: HashMap<String, Arc<dyn ServiceExecution>>,
    hooks: Option<Arc<dyn Hooks>>,
    alias_strategy: Option<Arc<dyn AliasStrategy>>,
    configuration: Configuration,
}

impl EngineBuilder {
    pub fn instructions(mut self, instructions: InstructionSet) -> Self {
        self.instructions = instructions;
        self
    }

    /// Registers the executor of the service `name`.
    pub fn service(
        mut self,
        name: impl Into<String>,
        service: impl ServiceExecution + 'static,
    ) -> Self {
        self.services.insert(name.into(), Arc::new(service));
        self
    }

    pub fn hooks(mut self, hooks: impl Hooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Overrides the alias strategy chosen from the configuration.
    pub fn alias_strategy(mut self, strategy: impl AliasStrategy + 'static) -> Self {
        self.alias_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn build(self) -> Engine {
        let alias_strategy = self.alias_strategy.unwrap_or_else(|| {
            if self.configuration.aliases.randomized {
                Arc::new(RandomAliases::new())
            } else {
                Arc::new(DeterministicAliases)
            }
        });
        Engine {
            instructions: Arc::new(self.instructions),
            services: self.services,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(DefaultHooks)),
            alias_strategy,
            configuration: Arc::new(self.configuration),
        }
    }
}

/// An operation to execute.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ExecutionRequest {
    /// The overall query.
    pub query: QueryTree,
    pub operation_name: Option<String>,
    /// Forwarded untouched to every service call.
    pub variables: Object,
}

#[buildstructor::buildstructor]
impl ExecutionRequest {
    #[builder(visibility = "pub")]
    fn new(
        query: QueryTree,
        operation_name: Option<String>,
        variables: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
        }
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn instructions(&self) -> &InstructionSet {
        &self.instructions
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Executes an operation.
    ///
    /// Every top-level field is planned before any service is called: a planning failure fails
    /// the whole operation. Top-level fields of a mutation run one after the other, the others
    /// run concurrently. A failing field resolves to `null` with an error and leaves its
    /// siblings untouched.
    pub async fn execute(&self, request: ExecutionRequest) -> Response {
        let ExecutionRequest {
            query,
            operation_name,
            variables,
        } = request;
        let span = tracing::info_span!(
            EXECUTE_SPAN_NAME,
            "graphql.operation.kind" = query.kind().as_str(),
            "graphql.operation.name" = operation_name.as_deref().unwrap_or_default(),
            "otel.kind" = "INTERNAL"
        );
        let ctx = ExecutionContext::new(self, operation_name, variables);
        ctx.execute_operation(&query).instrument(span).await
    }
}

/// A top-level field, ready to be sent.
enum TopLevelField {
    /// `__typename` on the root type, answered without any call.
    Typename { key: String, type_name: String },
    /// A field its service resolution hook failed.
    Failed { key: String, error: graphql::Error },
    Planned {
        key: String,
        service: Arc<ServiceDefinition>,
        id: FieldId,
        prepared: PreparedQuery,
    },
}

/// A planned and rewritten query for one service.
pub(crate) struct PreparedQuery {
    plan: ExecutionPlan,
    rewrite: RewriteOutput,
    transform_context: Arc<TransformContext>,
}

/// State shared by every call made for one operation, hydrations included.
pub(crate) struct ExecutionContext<'a> {
    engine: &'a Engine,
    aliases: AliasAssigner,
    service_contexts: ServiceContextCache,
    transform_contexts: Mutex<HashMap<String, Arc<TransformContext>>>,
    operation_name: Option<String>,
    variables: Object,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        operation_name: Option<String>,
        variables: Object,
    ) -> Self {
        Self {
            engine,
            aliases: AliasAssigner::new(engine.alias_strategy.as_ref()),
            service_contexts: ServiceContextCache::default(),
            transform_contexts: Mutex::new(HashMap::new()),
            operation_name,
            variables,
        }
    }

    pub(crate) fn hooks(&self) -> &dyn Hooks {
        self.engine.hooks.as_ref()
    }

    fn transform_context(&self, service: &ServiceDefinition) -> Arc<TransformContext> {
        self.transform_contexts
            .lock()
            .entry(service.name.clone())
            .or_insert_with(|| {
                Arc::new(TransformContext::new(service, &self.engine.configuration))
            })
            .clone()
    }

    /// Plans and rewrites the subtrees of `tree` rooted at `roots` for `service`.
    pub(crate) fn prepare(
        &self,
        tree: &QueryTree,
        roots: &[FieldId],
        service: &ServiceDefinition,
    ) -> Result<PreparedQuery, PlanningError> {
        let transform_context = self.transform_context(service);
        let ctx = PlanningContext {
            tree,
            service,
            instructions: &self.engine.instructions,
            hooks: self.hooks(),
            aliases: &self.aliases,
            transform_context: &transform_context,
        };
        let plan = ExecutionPlanner::plan(&ctx, roots)?;
        tracing::debug!(
            service = service.name.as_str(),
            planned_fields = plan.len(),
            "planned query"
        );
        let rewrite = QueryRewriter::new(service, tree, &plan).rewrite(roots);
        Ok(PreparedQuery {
            plan,
            rewrite,
            transform_context,
        })
    }

    /// Executes a whole tree against `service`, as hydrations do.
    pub(crate) fn execute_query<'b>(
        &'b self,
        service: &'b str,
        tree: QueryTree,
        is_hydration: bool,
    ) -> future::BoxFuture<'b, Result<Response, FetchError>> {
        Box::pin(async move {
            let definition = self
                .engine
                .instructions
                .service(service)
                .cloned()
                .ok_or_else(|| FetchError::UnknownService {
                    service: service.to_string(),
                })?;
            let prepared = self.prepare(&tree, tree.roots(), &definition)?;
            self.call(&definition, &tree, &prepared, is_hydration).await
        })
    }

    /// Sends a prepared query and stitches the response.
    async fn call(
        &self,
        service: &ServiceDefinition,
        overall: &QueryTree,
        prepared: &PreparedQuery,
        is_hydration: bool,
    ) -> Result<Response, FetchError> {
        let executor = self
            .engine
            .services
            .get(&service.name)
            .ok_or_else(|| FetchError::UnknownService {
                service: service.name.clone(),
            })?;
        let query = document::print(&prepared.rewrite.tree, self.operation_name.as_deref());
        let context = self
            .service_contexts
            .get_or_create(service, self.hooks())
            .await;
        tracing::debug!(
            service = service.name.as_str(),
            query = query.as_str(),
            "calling service"
        );

        let request = ServiceRequest {
            service_name: service.name.clone(),
            query,
            operation_name: self.operation_name.clone(),
            variables: self.variables.clone(),
            tree: prepared.rewrite.tree.clone(),
            context,
            is_hydration,
        };
        let mut response = executor
            .execute(request)
            .instrument(tracing::info_span!(
                SERVICE_CALL_SPAN_NAME,
                "service.name" = service.name.as_str(),
                "hydration" = is_hydration,
                "otel.kind" = "INTERNAL"
            ))
            .await?;

        let ctx = ResultContext {
            execution: self,
            service,
            overall,
            transform_context: &prepared.transform_context,
        };
        stitch(&ctx, &prepared.plan, &prepared.rewrite, &mut response).await;
        Ok(response)
    }

    async fn execute_operation(&self, query: &QueryTree) -> Response {
        let fields = match self.plan_operation(query) {
            Ok(fields) => fields,
            Err(err) => {
                tracing::error!(error = %err, "operation could not be planned");
                return Response::builder()
                    .data(Value::Null)
                    .error(err.to_graphql_error())
                    .build();
            }
        };

        let executions = fields
            .into_iter()
            .map(|field| self.execute_top_level_field(query, field));
        let results = if query.kind() == OperationKind::Mutation {
            let mut results = Vec::new();
            for execution in executions {
                results.push(execution.await);
            }
            results
        } else {
            join_all(executions).await
        };

        let mut data = Object::new();
        let mut response = Response::default();
        for (key, field_response) in results {
            let mut field_response = field_response;
            let value = field_response
                .data
                .as_mut()
                .and_then(Value::as_object_mut)
                .and_then(|object| object.remove(key.as_str()))
                .unwrap_or(Value::Null);
            data.insert(key.as_str(), value);
            response.append_errors(&mut field_response.errors);
            for (key, value) in field_response.extensions {
                response.extensions.insert(key, value);
            }
        }
        response.data = Some(Value::Object(data));
        response
    }

    /// Resolves the service of each top-level field and plans it.
    fn plan_operation(&self, query: &QueryTree) -> Result<Vec<TopLevelField>, PlanningError> {
        let services: Vec<Arc<ServiceDefinition>> =
            self.engine.instructions.services().cloned().collect();
        query
            .roots()
            .iter()
            .map(|id| {
                let field = query.node(*id);
                let key = field.result_key().to_string();
                if field.name == TYPENAME {
                    return Ok(TopLevelField::Typename {
                        key,
                        type_name: query.kind().default_type_name().to_string(),
                    });
                }
                let service = match self.hooks().resolve_service_for_field(&services, field) {
                    Some(Ok(service)) => service,
                    Some(Err(error)) => {
                        return Ok(TopLevelField::Failed {
                            error: error.with_path(Some(Path::from_keys([key.as_str()]))),
                            key,
                        })
                    }
                    None => self.owning_service(field)?,
                };
                let prepared = self.prepare(query, &[*id], &service)?;
                Ok(TopLevelField::Planned {
                    key,
                    service,
                    id: *id,
                    prepared,
                })
            })
            .collect()
    }

    fn owning_service(&self, field: &FieldNode) -> Result<Arc<ServiceDefinition>, PlanningError> {
        FieldCoordinates::of(field)
            .find_map(|coordinates| self.engine.instructions.owning_service(&coordinates))
            .cloned()
            .ok_or_else(|| PlanningError::NoOwningService {
                field: field.name.clone(),
            })
    }

    /// Runs one top-level field; the response holds the field under `key`.
    async fn execute_top_level_field(
        &self,
        query: &QueryTree,
        field: TopLevelField,
    ) -> (String, Response) {
        match field {
            TopLevelField::Typename { key, type_name } => {
                let mut data = Object::new();
                data.insert(key.as_str(), Value::String(type_name.into()));
                let response = Response::builder().data(Value::Object(data)).build();
                (key, response)
            }
            TopLevelField::Failed { key, error } => {
                (key, Response::builder().error(error).build())
            }
            TopLevelField::Planned {
                key,
                service,
                id,
                prepared,
            } => {
                let span = tracing::info_span!(
                    FIELD_SPAN_NAME,
                    "graphql.field" = key.as_str(),
                    "service.name" = service.name.as_str(),
                    "otel.kind" = "INTERNAL"
                );
                let call = self.call(&service, query, &prepared, false);
                let result = match self.engine.configuration.services.timeout {
                    Some(timeout) => tokio::time::timeout(timeout, call)
                        .instrument(span)
                        .await
                        .unwrap_or_else(|_| {
                            Err(FetchError::SubrequestTimeout {
                                service: service.name.clone(),
                                timeout_ms: timeout.as_millis() as u64,
                            })
                        }),
                    None => call.instrument(span).await,
                };
                match result {
                    Ok(response) => (key, response),
                    Err(err) => {
                        tracing::warn!(
                            field = key.as_str(),
                            node = id.index(),
                            error = %err,
                            "top-level field failed"
                        );
                        let error = err.to_graphql_error(Some(Path::from_keys([key.as_str()])));
                        (key, Response::builder().error(error).build())
                    }
                }
            }
        }
    }
}

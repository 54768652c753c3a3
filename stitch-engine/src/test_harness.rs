//! Test utilities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derivative::Derivative;
use parking_lot::Mutex;

use crate::error::FetchError;
use crate::graphql::Response;
use crate::json_ext::Value;
use crate::services::ServiceExecution;
use crate::services::ServiceRequest;

type Handler = dyn Fn(&ServiceRequest) -> Result<Value, FetchError> + Send + Sync;

/// A [`ServiceExecution`] answering from canned payloads, keyed by printed document.
///
/// Every request is recorded and can be inspected with [`MockService::requests`].
#[derive(Clone, Default, Derivative)]
#[derivative(Debug)]
pub struct MockService {
    // using an arc to improve efficiency when service is cloned
    responses: Arc<HashMap<String, Value>>,
    #[derivative(Debug = "ignore")]
    handler: Option<Arc<Handler>>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<ServiceRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `query` with the raw payload `response`.
    pub fn with_response(mut self, query: &str, response: Value) -> Self {
        Arc::make_mut(&mut self.responses).insert(query.to_string(), response);
        self
    }

    /// Answers every query without a canned payload with `handler`.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ServiceRequest) -> Result<Value, FetchError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Waits before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().clone()
    }

    /// Documents received so far, in arrival order.
    pub fn documents(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.query.clone())
            .collect()
    }
}

#[async_trait]
impl ServiceExecution for MockService {
    async fn execute(&self, request: ServiceRequest) -> Result<Response, FetchError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let payload = match (self.responses.get(&request.query), &self.handler) {
            (Some(response), _) => response.clone(),
            (None, Some(handler)) => handler(&request)?,
            (None, None) => {
                return Err(FetchError::SubrequestHttpError {
                    service: request.service_name.clone(),
                    reason: format!("couldn't find mock for query {}", request.query),
                })
            }
        };
        Response::from_value(&request.service_name, payload)
    }
}

//! Engine errors.
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
pub use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// Errors scoped to a single field or backend call.
///
/// Note that these are not actually returned to the client, but are instead converted to JSON for
/// [`struct@Error`].
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// query could not be planned: {reason}
    ValidationPlanningError {
        /// The failure reason.
        reason: String,
    },

    /// service '{service}' response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The service that responded with the malformed response.
        service: String,

        /// The reason the serialization failed.
        reason: String,
    },

    /// fetch failed from '{service}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        /// The service failed.
        service: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// request to '{service}' timed out after {timeout_ms}ms
    SubrequestTimeout {
        /// The service that did not answer in time.
        service: String,

        /// The timeout that was exceeded.
        timeout_ms: u64,
    },

    /// unknown service '{service}'
    UnknownService {
        /// The service that was not registered.
        service: String,
    },

    /// batch hydration from '{service}' returned {actual} results for {expected} inputs
    HydrationMatchCountMismatch {
        /// The backing service.
        service: String,

        /// Number of inputs sent.
        expected: usize,

        /// Number of results received.
        actual: usize,
    },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut value: Value = serde_json_bytes::to_value(self).unwrap_or_default();
        if let Some(extensions) = value.as_object_mut() {
            extensions
                .entry("code")
                .or_insert_with(|| self.extension_code().into());
        }
        let extensions = match value {
            Value::Object(extensions) => extensions,
            _ => Object::new(),
        };

        Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extensions(extensions)
            .build()
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::ValidationPlanningError { .. } => "VALIDATION_PLANNING_ERROR",
            FetchError::SubrequestMalformedResponse { .. } => "SUBREQUEST_MALFORMED_RESPONSE",
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestTimeout { .. } => "SUBREQUEST_TIMEOUT",
            FetchError::UnknownService { .. } => "UNKNOWN_SERVICE",
            FetchError::HydrationMatchCountMismatch { .. } => "HYDRATION_MATCH_COUNT_MISMATCH",
        }
        .to_string()
    }
}

impl From<PlanningError> for FetchError {
    fn from(err: PlanningError) -> Self {
        FetchError::ValidationPlanningError {
            reason: err.to_string(),
        }
    }
}

/// Errors found while planning an operation. They abort the whole operation.
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum PlanningError {
    /// no service owns root field '{field}'
    NoOwningService {
        /// Coordinates of the root field.
        field: String,
    },

    /// instruction refers to unknown service '{service}'
    UnknownService {
        /// The service named by the instruction.
        service: String,
    },

    /// malformed instruction on '{coordinates}': {reason}
    MalformedInstruction {
        /// Coordinates of the field carrying the instruction.
        coordinates: String,

        /// What is wrong with it.
        reason: String,
    },
}

impl PlanningError {
    /// Convert the planning error to a GraphQL error.
    pub fn to_graphql_error(&self) -> Error {
        Error::builder()
            .message(self.to_string())
            .extension_code(self.extension_code())
            .build()
    }
}

impl ErrorExtension for PlanningError {
    fn extension_code(&self) -> String {
        match self {
            PlanningError::NoOwningService { .. } => "NO_OWNING_SERVICE",
            PlanningError::UnknownService { .. } => "UNKNOWN_SERVICE",
            PlanningError::MalformedInstruction { .. } => "MALFORMED_INSTRUCTION",
        }
        .to_string()
    }
}

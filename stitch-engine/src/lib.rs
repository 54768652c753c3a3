//! Execution core of a federated query gateway.
//!
//! A caller-facing ("overall") query tree is planned once per top-level field, rewritten into the
//! backend-facing ("underlying") tree each backend service understands, dispatched, and the
//! backend responses are stitched back into the shape the caller asked for. Fields that live in
//! another service are resolved through hydration sub-queries, optionally batched.
//!
//! The entry point is [`Engine`]:
//!
//! ```no_run
//! use stitch_engine::instructions::FieldCoordinates;
//! use stitch_engine::instructions::InstructionSet;
//! use stitch_engine::instructions::ServiceDefinition;
//! use stitch_engine::query::Field;
//! use stitch_engine::query::OperationKind;
//! use stitch_engine::query::QueryTree;
//! use stitch_engine::test_harness::MockService;
//! use stitch_engine::Engine;
//! use stitch_engine::ExecutionRequest;
//!
//! # async fn run() {
//! let instructions = InstructionSet::new()
//!     .with_service(ServiceDefinition::new("issues").with_root_field("Query", "foo"))
//!     .with_rename(FieldCoordinates::new("Foo", "bar"), "baz");
//! let engine = Engine::builder()
//!     .instructions(instructions)
//!     .service("issues", MockService::new())
//!     .build();
//! let query = QueryTree::from_fields(
//!     OperationKind::Query,
//!     [Field::new("foo")
//!         .with_possible_types(["Foo"])
//!         .with_child(Field::new("bar").with_object_types(["Foo"]))],
//! );
//! let response = engine
//!     .execute(ExecutionRequest::builder().query(query).build())
//!     .await;
//! # }
//! ```

#![warn(unreachable_pub)]

#[macro_use]
pub mod json_ext;

pub mod configuration;
mod engine;
pub mod error;
pub mod graphql;
pub mod instructions;
pub(crate) mod plan;
pub mod query;
pub(crate) mod result;
pub(crate) mod rewrite;
pub mod services;
pub mod test_harness;
pub(crate) mod transform;

pub use crate::configuration::Configuration;
pub use crate::engine::Engine;
pub use crate::engine::EngineBuilder;
pub use crate::engine::ExecutionRequest;
pub use crate::graphql::Response;
pub use crate::services::Hooks;
pub use crate::services::ServiceExecution;

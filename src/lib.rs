//! BDD-style HTTP API scenario engine.
//!
//! Steps build a request incrementally (gateway, path, method, headers,
//! query string, JSON payload), send it through a [`Transport`], then
//! assert properties of the response. Values captured from responses
//! are kept in a per-scenario [`DataStore`] and can be referenced by
//! later steps through `{{ name }}` placeholders.

pub mod api;
pub mod assertion;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod model;
pub mod request;
pub mod response;
pub mod runner;
pub mod steps;
pub mod transport;

pub use api::Api;
pub use config::{Environment, ProjectConfig, ScenarioLoader};
pub use context::ScenarioContext;
pub use data::DataStore;
pub use error::{AssertionFailure, Error, Result, TransportFailure};
pub use model::*;
pub use request::Request;
pub use response::{PathExpr, ResponseView};
pub use runner::*;
pub use steps::{Keyword, Step, StepDoc, CATALOG};
pub use transport::{ReqwestTransport, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Core contracts for the SMS / voice dispatch layer.
//!
//! This crate exposes the message identity, the request and response shapes exchanged with
//! delivery backends, the placeholder template renderer, request validation helpers and the
//! dispatch configuration loader.
pub mod config;
pub mod message;
pub mod request;
pub mod response;
pub mod template;
pub mod validate;

pub use config::*;
pub use message::*;
pub use request::*;
pub use response::*;
pub use template::*;
pub use validate::*;

/// Mapping from template variable (or backend option) name to an arbitrary JSON value.
pub type DataBag = std::collections::BTreeMap<String, serde_json::Value>;

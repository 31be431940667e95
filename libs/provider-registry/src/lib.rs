//! Provider registry and retrying dispatcher for SMS and voice delivery.
//!
//! Backends implement [`Provider`]; a [`ProviderRegistry`] keeps them by name, tracks the
//! active one and runs every send through the retry engine with the session policy.
//! The bundled HTTP backends live in [`providers`], each behind its own cargo feature.

pub mod errors;
pub mod providers;
pub mod registry;
pub mod traits;

pub use errors::{ProviderError, ProviderErrorKind};
pub use providers::register_configured;
pub use registry::{DispatchError, Operation, ProviderRegistry, RegistrySettings};
pub use traits::Provider;

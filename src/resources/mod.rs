pub mod binding;
pub mod common;
pub mod monitor;
pub mod rbac;
pub mod secret;
pub mod service;
pub mod statefulset;

pub use common::{API_VERSION, FIELD_MANAGER, KIND, offshoot_selectors, owner_reference};

pub mod descriptor;
pub mod engine;
pub mod extractor;
pub mod help;
pub mod mutator;
pub mod reconcile;

pub use crate::domain::model::{MappingRole, ModuleConfig, ResourceKind};
pub use crate::domain::ports::{Confirm, ModuleWorkspace};
pub use crate::utils::error::Result;

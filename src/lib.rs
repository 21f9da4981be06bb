pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};

pub use adapters::{
    http::ScaffoldFetcher,
    prompt::{AssumeYes, StdinConfirm},
};
pub use config::{cli::LocalWorkspace, toml_config::ToolSettings};
pub use core::engine::{CreateReport, DeclareMode, FieldUpdate, ModuleEngine};
pub use core::reconcile::Reconciliation;
pub use domain::model::{MappingRole, ModuleConfig, ResourceKind};
pub use utils::error::{BqmodError, Result};

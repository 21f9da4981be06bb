use crate::domain::model::ModuleConfig;
use crate::utils::error::Result;

/// File-level collaborators of the engine. Everything behind this trait is
/// plain I/O; the engine itself never touches the filesystem.
pub trait ModuleWorkspace {
    /// `false` when the config file is absent. An empty file still exists.
    fn config_exists(&self) -> bool;
    fn read_config(&self) -> Result<ModuleConfig>;
    fn write_config(&self, config: &ModuleConfig) -> Result<()>;
    fn read_base_template(&self) -> Result<String>;
    /// Default glue-code location used when no path is given explicitly.
    fn module_source_path(&self) -> String;
    fn module_source_exists(&self, path: &str) -> bool;
    fn read_module_source(&self, path: &str) -> Result<String>;
    /// Returns the location the descriptor was written to.
    fn write_descriptor(&self, module_name: &str, text: &str) -> Result<String>;
    fn read_readme(&self) -> Result<Option<String>>;
    fn write_help(&self, html: &str) -> Result<String>;
}

/// Yes/no question asked before a destructive or advisory-overriding step.
pub trait Confirm {
    fn confirm(&self, question: &str) -> Result<bool>;
}

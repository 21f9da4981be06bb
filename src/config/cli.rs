use crate::config::toml_config::ToolSettings;
use crate::core::descriptor::BUILTIN_TEMPLATE;
use crate::domain::model::ModuleConfig;
use crate::domain::ports::ModuleWorkspace;
use crate::utils::error::{BqmodError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Module folder on the local disk. Relative paths in the settings are
/// resolved against `base_path`.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    base_path: PathBuf,
    settings: ToolSettings,
}

impl LocalWorkspace {
    pub fn new(base_path: impl Into<PathBuf>, settings: ToolSettings) -> Self {
        Self {
            base_path: base_path.into(),
            settings,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    fn config_path(&self) -> PathBuf {
        self.resolve(&self.settings.paths.config)
    }

    fn write_file(&self, full_path: &Path, data: &[u8]) -> Result<String> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full_path, data)?;
        Ok(full_path.display().to_string())
    }
}

impl ModuleWorkspace for LocalWorkspace {
    fn config_exists(&self) -> bool {
        self.config_path().is_file()
    }

    fn read_config(&self) -> Result<ModuleConfig> {
        let path = self.config_path();
        if !path.is_file() {
            return Err(BqmodError::NotInitialized {
                path: path.display().to_string(),
            });
        }

        let text = fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            return Err(BqmodError::EmptyConfig {
                path: path.display().to_string(),
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn write_config(&self, config: &ModuleConfig) -> Result<()> {
        let mut text = serde_json::to_string_pretty(config)?;
        text.push('\n');
        self.write_file(&self.config_path(), text.as_bytes())?;
        Ok(())
    }

    fn read_base_template(&self) -> Result<String> {
        match &self.settings.paths.template {
            Some(template) => Ok(fs::read_to_string(self.resolve(template))?),
            None => Ok(BUILTIN_TEMPLATE.to_string()),
        }
    }

    fn module_source_path(&self) -> String {
        self.settings.paths.source.clone()
    }

    fn module_source_exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn read_module_source(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.resolve(path))?)
    }

    fn write_descriptor(&self, module_name: &str, text: &str) -> Result<String> {
        let full_path = self
            .resolve(&self.settings.paths.output_dir)
            .join(format!("{}.xml", module_name));
        self.write_file(&full_path, text.as_bytes())
    }

    fn read_readme(&self) -> Result<Option<String>> {
        let path = self.resolve(&self.settings.paths.readme);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn write_help(&self, html: &str) -> Result<String> {
        self.write_file(&self.resolve(&self.settings.paths.help), html.as_bytes())
    }
}

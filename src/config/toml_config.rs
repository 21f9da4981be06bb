use crate::utils::error::{BqmodError, Result};
use crate::utils::validation::{validate_path, validate_positive_number, validate_url, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Optional `bqmod.toml` next to the module. Every key has a default, so an
/// absent file and an empty file behave the same.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub paths: PathsConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub config: String,
    /// Base template; the built-in one is used when unset.
    pub template: Option<String>,
    pub source: String,
    pub readme: String,
    pub help: String,
    /// Where `<Name>.xml` is written.
    pub output_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config: "bqconfig.json".to_string(),
            template: None,
            source: "src/BQ_run_module.py".to_string(),
            readme: "README.md".to_string(),
            help: "public/help.html".to_string(),
            output_dir: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Root the scaffold files are fetched from. No default.
    pub base_url: Option<String>,
    pub files: Vec<String>,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            files: vec![
                "PythonScriptWrapper.py".to_string(),
                "runtime-module.cfg".to_string(),
                "Dockerfile".to_string(),
            ],
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_seconds: 1,
        }
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"))
}

impl ToolSettings {
    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(BqmodError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Defaults when `path` does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| BqmodError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// `${VAR}` is replaced by the variable's value; unknown variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> String {
        env_var_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn validate_settings(&self) -> Result<()> {
        validate_path("paths.config", &self.paths.config)?;
        if let Some(template) = &self.paths.template {
            validate_path("paths.template", template)?;
        }
        validate_path("paths.source", &self.paths.source)?;
        validate_path("paths.readme", &self.paths.readme)?;
        validate_path("paths.help", &self.paths.help)?;
        validate_path("paths.output_dir", &self.paths.output_dir)?;

        if let Some(base_url) = &self.bootstrap.base_url {
            validate_url("bootstrap.base_url", base_url)?;
        }
        validate_positive_number("bootstrap.timeout_seconds", self.bootstrap.timeout_seconds, 1)?;
        for file in &self.bootstrap.files {
            validate_path("bootstrap.files", file)?;
            if Path::new(file).is_absolute() || file.split('/').any(|part| part == "..") {
                return Err(BqmodError::InvalidConfigValueError {
                    field: "bootstrap.files".to_string(),
                    value: file.clone(),
                    reason: "Scaffold files must be relative paths inside the module".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Validate for ToolSettings {
    fn validate(&self) -> Result<()> {
        self.validate_settings()
    }
}

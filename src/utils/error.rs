use thiserror::Error;

#[derive(Error, Debug)]
pub enum BqmodError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Unknown {role} kind '{kind}' (expected one of: {expected})")]
    UnknownKind {
        role: String,
        kind: String,
        expected: String,
    },

    #[error("{role} names '{first}' and '{second}' both map to identifier '{identifier}'")]
    DuplicateIdentifier {
        role: String,
        first: String,
        second: String,
        identifier: String,
    },

    #[error("Module config not found at {path}")]
    NotInitialized { path: String },

    #[error("Module config at {path} is empty")]
    EmptyConfig { path: String },

    #[error("Aborted: {message}")]
    Aborted { message: String },

    #[error("Template error: {message}")]
    TemplateError { message: String },

    #[error("XML error: {message}")]
    XmlError { message: String },

    #[error("No top-level '{name}' function found in module source")]
    EntryPointNotFound { name: String },

    #[error("'{name}' is defined {} times at top level (lines {})", .lines.len(), join_lines(.lines))]
    DuplicateEntryPoint { name: String, lines: Vec<usize> },

    #[error("Module source does not parse: syntax error at line {line}")]
    SourceSyntaxError { line: usize },

    #[error("Source analysis failed: {message}")]
    AnalysisError { message: String },

    #[error("Download of {url} failed: {message}")]
    FetchError { url: String, message: String },
}

fn join_lines(lines: &[usize]) -> String {
    lines
        .iter()
        .map(|line| line.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Template,
    Extraction,
    Io,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Process exit code for a command that failed with this severity.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl BqmodError {
    pub fn config(message: impl Into<String>) -> Self {
        BqmodError::ConfigError {
            message: message.into(),
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        BqmodError::TemplateError {
            message: message.into(),
        }
    }

    pub fn xml(message: impl Into<String>) -> Self {
        BqmodError::XmlError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BqmodError::IoError(_) => ErrorCategory::Io,
            BqmodError::HttpError(_) | BqmodError::FetchError { .. } => ErrorCategory::Network,
            BqmodError::TemplateError { .. } | BqmodError::XmlError { .. } => {
                ErrorCategory::Template
            }
            BqmodError::EntryPointNotFound { .. }
            | BqmodError::DuplicateEntryPoint { .. }
            | BqmodError::SourceSyntaxError { .. }
            | BqmodError::AnalysisError { .. } => ErrorCategory::Extraction,
            BqmodError::SerializationError(_)
            | BqmodError::ConfigError { .. }
            | BqmodError::MissingConfigError { .. }
            | BqmodError::InvalidConfigValueError { .. }
            | BqmodError::ConfigValidationError { .. }
            | BqmodError::UnknownKind { .. }
            | BqmodError::DuplicateIdentifier { .. }
            | BqmodError::NotInitialized { .. }
            | BqmodError::EmptyConfig { .. }
            | BqmodError::Aborted { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 使用者取消：沒有寫入任何檔案，但指令沒有完成
            BqmodError::Aborted { .. } | BqmodError::HttpError(_) | BqmodError::FetchError { .. } => {
                ErrorSeverity::Medium
            }
            BqmodError::TemplateError { .. } | BqmodError::XmlError { .. } => {
                ErrorSeverity::Critical
            }
            BqmodError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            BqmodError::NotInitialized { path } => {
                format!("{} not in folder, initialize a config file first", path)
            }
            BqmodError::EmptyConfig { path } => format!("{} exists but is empty", path),
            BqmodError::UnknownKind { role, kind, .. } => {
                format!("'{}' is not a supported {} type", kind, role)
            }
            BqmodError::EntryPointNotFound { name } => {
                format!("Could not find a top-level `def {}(...)` in the module source", name)
            }
            BqmodError::DuplicateEntryPoint { name, lines } => format!(
                "`{}` must be defined exactly once, found definitions at lines {}",
                name,
                join_lines(lines)
            ),
            BqmodError::TemplateError { message } => {
                format!("The base descriptor template is malformed: {}", message)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            BqmodError::NotInitialized { .. } => "Run `bqmod init` in the module directory",
            BqmodError::EmptyConfig { .. } => {
                "Delete the empty file and run `bqmod init`, or restore it from version control"
            }
            BqmodError::SerializationError(_) => {
                "Check that bqconfig.json is valid JSON with Name, Author, Description, Inputs and Outputs keys"
            }
            BqmodError::MissingConfigError { .. } => "Set the missing value with `bqmod set`",
            BqmodError::InvalidConfigValueError { .. }
            | BqmodError::ConfigValidationError { .. }
            | BqmodError::ConfigError { .. } => "Fix the reported value and run the command again",
            BqmodError::UnknownKind { .. } => "Use one of --image, --table or --file",
            BqmodError::DuplicateIdentifier { .. } => {
                "Rename one of the declarations so their identifiers differ"
            }
            BqmodError::Aborted { .. } => "Nothing was changed",
            BqmodError::TemplateError { .. } | BqmodError::XmlError { .. } => {
                "Check paths.template in bqmod.toml or remove it to use the built-in template"
            }
            BqmodError::EntryPointNotFound { .. } | BqmodError::DuplicateEntryPoint { .. } => {
                "Define exactly one top-level `run_module` function in the module source"
            }
            BqmodError::SourceSyntaxError { .. } => "Fix the syntax error in the module source",
            BqmodError::AnalysisError { .. } => "Check that the module source is UTF-8 Python",
            BqmodError::IoError(_) => "Check that the path exists and is readable/writable",
            BqmodError::HttpError(_) | BqmodError::FetchError { .. } => {
                "Check bootstrap.base_url in bqmod.toml and your network connection"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BqmodError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_entry_point_message_lists_lines() {
        let err = BqmodError::DuplicateEntryPoint {
            name: "run_module".to_string(),
            lines: vec![3, 17],
        };
        assert_eq!(
            err.to_string(),
            "'run_module' is defined 2 times at top level (lines 3, 17)"
        );
        assert_eq!(err.category(), ErrorCategory::Extraction);
    }

    #[test]
    fn test_abort_exits_non_zero() {
        let err = BqmodError::Aborted {
            message: "keep existing config".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.severity().exit_code(), 2);
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_exit_codes_by_severity() {
        assert_eq!(ErrorSeverity::Low.exit_code(), 0);
        assert_eq!(ErrorSeverity::High.exit_code(), 1);
        assert_eq!(ErrorSeverity::Critical.exit_code(), 3);
    }
}

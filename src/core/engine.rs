use crate::core::extractor::{extract_key_usage, PythonKeyExtractor};
use crate::core::help::render_help_html;
use crate::core::mutator::{render_descriptor, validate_for_generation};
use crate::core::reconcile::{reconcile, Reconciliation};
use crate::domain::model::{Declared, MappingRole, ModuleConfig, OverwriteDecision, ResourceKind};
use crate::domain::ports::{Confirm, ModuleWorkspace};
use crate::utils::error::{BqmodError, Result};
use crate::utils::validation::validate_module_name;
use std::fmt;

/// How `declare` resolves a name that is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareMode {
    /// Ask through `Confirm`; "no" aborts.
    Ask,
    Overwrite,
    Keep,
}

/// Metadata updates for `set_fields`. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldUpdate {
    pub name: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
}

impl FieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.author.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReport {
    pub descriptor_path: String,
    pub help_path: Option<String>,
    /// `None` when no module source was found to check against.
    pub reconciliation: Option<Reconciliation>,
}

pub struct ModuleEngine<W: ModuleWorkspace, C: Confirm> {
    workspace: W,
    confirm: C,
}

impl<W: ModuleWorkspace, C: Confirm> ModuleEngine<W, C> {
    pub fn new(workspace: W, confirm: C) -> Self {
        Self { workspace, confirm }
    }

    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    /// Writes a fresh config with null metadata and no declarations.
    pub fn init(&self, force: bool) -> Result<ModuleConfig> {
        if self.workspace.config_exists()
            && !force
            && !self
                .confirm
                .confirm("A module config already exists. Overwrite it with an empty one?")?
        {
            return Err(BqmodError::Aborted {
                message: "existing module config left untouched".to_string(),
            });
        }

        let config = ModuleConfig::default();
        self.workspace.write_config(&config)?;
        tracing::info!("Initialized empty module config");
        Ok(config)
    }

    pub fn set_fields(&self, update: &FieldUpdate) -> Result<ModuleConfig> {
        if update.is_empty() {
            return Err(BqmodError::config(
                "nothing to set: pass at least one of --name, --author or --description",
            ));
        }
        if let Some(name) = &update.name {
            validate_module_name("Name", name)?;
        }

        let mut config = self.workspace.read_config()?;
        apply_fields(&mut config, update);
        self.workspace.write_config(&config)?;
        Ok(config)
    }

    /// Declares an input or output. Only `Added` and `Replaced` outcomes
    /// touch the persisted config.
    pub fn declare(
        &self,
        role: MappingRole,
        name: &str,
        kind: ResourceKind,
        mode: DeclareMode,
    ) -> Result<Declared> {
        let mut config = self.workspace.read_config()?;

        let outcome = config.declare(role, name, kind, |existing| match mode {
            DeclareMode::Overwrite => Ok(OverwriteDecision::Overwrite),
            DeclareMode::Keep => Ok(OverwriteDecision::Keep),
            DeclareMode::Ask => {
                let question = format!(
                    "{} '{}' is already declared as {}. Replace it with {}?",
                    role, name, existing, kind
                );
                Ok(if self.confirm.confirm(&question)? {
                    OverwriteDecision::Overwrite
                } else {
                    OverwriteDecision::Abort
                })
            }
        })?;

        match outcome {
            Declared::Added | Declared::Replaced { .. } => {
                self.workspace.write_config(&config)?;
                tracing::info!("Declared {} '{}' as {}", role, name, kind);
            }
            Declared::Kept { existing } => {
                tracing::info!("Kept existing {} '{}' ({})", role, name, existing);
            }
        }
        Ok(outcome)
    }

    pub fn summary(&self) -> Result<String> {
        let config = self.workspace.read_config()?;
        Ok(summary_text(&config))
    }

    /// Cross-checks the config against the glue code. A mismatch is a
    /// report value; only structural problems in the source are errors.
    pub fn check(&self, source: Option<&str>) -> Result<Reconciliation> {
        let config = self.workspace.read_config()?;
        let path = source
            .map(str::to_string)
            .unwrap_or_else(|| self.workspace.module_source_path());
        self.check_config(&config, &path)
    }

    fn check_config(&self, config: &ModuleConfig, path: &str) -> Result<Reconciliation> {
        tracing::debug!("Extracting key usage from {}", path);
        let text = self.workspace.read_module_source(path)?;
        let usage = extract_key_usage(&PythonKeyExtractor::new(), &text)?;

        Ok(reconcile(
            &config.declared_names(MappingRole::Input),
            &config.declared_names(MappingRole::Output),
            &usage,
        ))
    }

    /// Renders the descriptor and, when a README exists, the help page.
    /// A mismatch found in the module source needs confirmation unless
    /// `assume_yes` is set.
    pub fn create(&self, source: Option<&str>, assume_yes: bool) -> Result<CreateReport> {
        self.create_with(source, assume_yes, |_| {})
    }

    /// Like `create`, but hands the key check to `on_check` as soon as it
    /// is known, clean or not, and before any confirmation is asked.
    pub fn create_with<F>(&self, source: Option<&str>, assume_yes: bool, on_check: F) -> Result<CreateReport>
    where
        F: FnOnce(&Reconciliation),
    {
        let config = self.workspace.read_config()?;
        let name = validate_for_generation(&config)?;

        let path = source
            .map(str::to_string)
            .unwrap_or_else(|| self.workspace.module_source_path());
        let reconciliation = if source.is_some() || self.workspace.module_source_exists(&path) {
            Some(self.check_config(&config, &path)?)
        } else {
            tracing::warn!("No module source at {}, skipping key check", path);
            None
        };

        if let Some(report) = &reconciliation {
            on_check(report);
        }

        if let Some(report) = reconciliation.as_ref().filter(|r| r.has_mismatch()) {
            for line in report.diagnostics() {
                tracing::warn!("{}", line);
            }
            if !assume_yes
                && !self
                    .confirm
                    .confirm("Config and module source disagree. Create the descriptor anyway?")?
            {
                return Err(BqmodError::Aborted {
                    message: "descriptor not created because of key mismatches".to_string(),
                });
            }
        }

        let template = self.workspace.read_base_template()?;
        let document = render_descriptor(&config, &template)?;
        let descriptor_path = self.workspace.write_descriptor(name, &document.render()?)?;
        tracing::info!("Descriptor written to {}", descriptor_path);

        let help_path = match self.workspace.read_readme()? {
            Some(markdown) => {
                let written = self.workspace.write_help(&render_help_html(name, &markdown)?)?;
                tracing::info!("Help page written to {}", written);
                Some(written)
            }
            None => None,
        };

        Ok(CreateReport {
            descriptor_path,
            help_path,
            reconciliation,
        })
    }
}

pub fn apply_fields(config: &mut ModuleConfig, update: &FieldUpdate) {
    if let Some(name) = &update.name {
        config.name = Some(name.clone());
    }
    if let Some(author) = &update.author {
        config.author = Some(author.clone());
    }
    if let Some(description) = &update.description {
        config.description = Some(description.clone());
    }
}

pub fn summary_text(config: &ModuleConfig) -> String {
    Summary(config).to_string()
}

/// Human-readable listing of a config's metadata and declarations.
pub struct Summary<'a>(pub &'a ModuleConfig);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "(not set)".to_string());

        writeln!(f, "Name:        {}", show(&config.name))?;
        writeln!(f, "Author:      {}", show(&config.author))?;
        writeln!(f, "Description: {}", show(&config.description))?;
        for role in [MappingRole::Input, MappingRole::Output] {
            let declarations = config.declarations(role);
            writeln!(f, "{}s ({}):", capitalize(role.as_str()), declarations.len())?;
            for (name, kind) in declarations {
                writeln!(f, "  - {} [{}]", name, kind)?;
            }
        }
        Ok(())
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

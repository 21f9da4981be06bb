use crate::utils::error::{BqmodError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a user-declared input or output resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    // 舊版設定檔寫的是 "csv"
    #[serde(alias = "csv")]
    Table,
    #[serde(alias = "blob")]
    File,
}

impl ResourceKind {
    pub const NAMES: &'static str = "image, table, file";

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Table => "table",
            ResourceKind::File => "file",
        }
    }

    /// Values of the `accepted_type` markers in an input declaration.
    pub fn accepted_types(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Image => &["image", "dataset"],
            ResourceKind::Table => &["table", "dataset"],
            ResourceKind::File => &["file"],
        }
    }

    pub fn parse_for(role: MappingRole, kind: &str) -> Result<Self> {
        match kind {
            "image" => Ok(ResourceKind::Image),
            "table" | "csv" => Ok(ResourceKind::Table),
            "file" | "blob" => Ok(ResourceKind::File),
            other => Err(BqmodError::UnknownKind {
                role: role.as_str().to_string(),
                kind: other.to_string(),
                expected: ResourceKind::NAMES.to_string(),
            }),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = BqmodError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::parse_for(MappingRole::Output, s)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind accepted by `add_input`: a user resource or one of the two fixed
/// system inputs the module runtime always receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    Resource(ResourceKind),
    Mex,
    BisqueToken,
}

impl InputKind {
    pub const NAMES: &'static str = "image, table, file, mex, bisque_token";
}

impl FromStr for InputKind {
    type Err = BqmodError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mex" => Ok(InputKind::Mex),
            "bisque_token" | "auth_token" => Ok(InputKind::BisqueToken),
            other => ResourceKind::parse_for(MappingRole::Input, other)
                .map(InputKind::Resource)
                .map_err(|_| BqmodError::UnknownKind {
                    role: MappingRole::Input.as_str().to_string(),
                    kind: other.to_string(),
                    expected: InputKind::NAMES.to_string(),
                }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MappingRole {
    Input,
    Output,
}

impl MappingRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingRole::Input => "input",
            MappingRole::Output => "output",
        }
    }
}

impl fmt::Display for MappingRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar metadata nodes of the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Title,
    Authors,
    Description,
}

impl MetadataField {
    pub fn tag_name(&self) -> &'static str {
        match self {
            MetadataField::Title => "title",
            MetadataField::Authors => "authors",
            MetadataField::Description => "description",
        }
    }
}

impl FromStr for MetadataField {
    type Err = BqmodError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "title" => Ok(MetadataField::Title),
            "authors" => Ok(MetadataField::Authors),
            "description" => Ok(MetadataField::Description),
            other => Err(BqmodError::config(format!(
                "unknown metadata field '{}' (expected title, authors or description)",
                other
            ))),
        }
    }
}

/// The persisted `bqconfig.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Author")]
    pub author: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Inputs", default)]
    pub inputs: IndexMap<String, ResourceKind>,
    #[serde(rename = "Outputs", default)]
    pub outputs: IndexMap<String, ResourceKind>,
}

/// What to do when a declaration name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteDecision {
    Overwrite,
    Keep,
    Abort,
}

/// Result of a `declare` call, reported back to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared {
    Added,
    Replaced { previous: ResourceKind },
    Kept { existing: ResourceKind },
}

impl ModuleConfig {
    pub fn declarations(&self, role: MappingRole) -> &IndexMap<String, ResourceKind> {
        match role {
            MappingRole::Input => &self.inputs,
            MappingRole::Output => &self.outputs,
        }
    }

    fn declarations_mut(&mut self, role: MappingRole) -> &mut IndexMap<String, ResourceKind> {
        match role {
            MappingRole::Input => &mut self.inputs,
            MappingRole::Output => &mut self.outputs,
        }
    }

    pub fn declared_names(&self, role: MappingRole) -> Vec<String> {
        self.declarations(role).keys().cloned().collect()
    }

    /// Exact, case-sensitive lookup.
    pub fn is_declared(&self, role: MappingRole, name: &str) -> bool {
        self.declarations(role).contains_key(name)
    }

    /// Declare `name` under `role`. `decide` is only consulted when the
    /// name already exists; an overwrite keeps the original position.
    pub fn declare<F>(
        &mut self,
        role: MappingRole,
        name: &str,
        kind: ResourceKind,
        decide: F,
    ) -> Result<Declared>
    where
        F: FnOnce(ResourceKind) -> Result<OverwriteDecision>,
    {
        if name.trim().is_empty() {
            return Err(BqmodError::InvalidConfigValueError {
                field: format!("{}_name", role),
                value: name.to_string(),
                reason: "Name cannot be empty or whitespace-only".to_string(),
            });
        }

        let existing = self.declarations(role).get(name).copied();
        let Some(previous) = existing else {
            self.declarations_mut(role).insert(name.to_string(), kind);
            return Ok(Declared::Added);
        };

        match decide(previous)? {
            OverwriteDecision::Overwrite => {
                self.declarations_mut(role).insert(name.to_string(), kind);
                Ok(Declared::Replaced { previous })
            }
            OverwriteDecision::Keep => Ok(Declared::Kept { existing: previous }),
            OverwriteDecision::Abort => Err(BqmodError::Aborted {
                message: format!("{} '{}' is already declared", role, name),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_keys_and_order() {
        let json = r#"{"Name": "EdgeDetect", "Author": null, "Description": null,
            "Inputs": {"Zeta Image": "image", "Alpha Table": "table"},
            "Outputs": {"Edge Image": "image"}}"#;
        let config: ModuleConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.name.as_deref(), Some("EdgeDetect"));
        assert_eq!(
            config.declared_names(MappingRole::Input),
            vec!["Zeta Image".to_string(), "Alpha Table".to_string()]
        );

        let saved = serde_json::to_string(&config).unwrap();
        assert!(saved.starts_with(r#"{"Name":"EdgeDetect","Author":null"#));
        assert!(saved.contains(r#""Inputs":{"Zeta Image":"image","Alpha Table":"table"}"#));
    }

    #[test]
    fn test_legacy_kind_names_are_canonicalised() {
        let json = r#"{"Name": null, "Author": null, "Description": null,
            "Inputs": {"Weights": "blob"}, "Outputs": {"Stats": "csv"}}"#;
        let config: ModuleConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.inputs["Weights"], ResourceKind::File);
        assert_eq!(config.outputs["Stats"], ResourceKind::Table);

        let saved = serde_json::to_string(&config).unwrap();
        assert!(saved.contains(r#""Weights":"file""#));
        assert!(saved.contains(r#""Stats":"table""#));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("image".parse::<InputKind>().unwrap(), InputKind::Resource(ResourceKind::Image));
        assert_eq!("mex".parse::<InputKind>().unwrap(), InputKind::Mex);
        assert_eq!("auth_token".parse::<InputKind>().unwrap(), InputKind::BisqueToken);
        assert!(matches!(
            "video".parse::<InputKind>(),
            Err(BqmodError::UnknownKind { .. })
        ));
        assert!("mex".parse::<ResourceKind>().is_err());
        assert_eq!("csv".parse::<ResourceKind>().unwrap(), ResourceKind::Table);
    }

    #[test]
    fn test_declare_new_name_skips_decision() {
        let mut config = ModuleConfig::default();
        let outcome = config
            .declare(MappingRole::Input, "Input Image", ResourceKind::Image, |_| {
                panic!("no decision needed for a new name")
            })
            .unwrap();
        assert_eq!(outcome, Declared::Added);
        assert!(config.is_declared(MappingRole::Input, "Input Image"));
        // case-sensitive
        assert!(!config.is_declared(MappingRole::Input, "input image"));
    }

    #[test]
    fn test_declare_existing_name_follows_decision() {
        let mut config = ModuleConfig::default();
        config.inputs.insert("A".to_string(), ResourceKind::Image);
        config.inputs.insert("B".to_string(), ResourceKind::Image);

        let kept = config
            .declare(MappingRole::Input, "A", ResourceKind::Table, |_| Ok(OverwriteDecision::Keep))
            .unwrap();
        assert_eq!(kept, Declared::Kept { existing: ResourceKind::Image });
        assert_eq!(config.inputs["A"], ResourceKind::Image);

        let replaced = config
            .declare(MappingRole::Input, "A", ResourceKind::Table, |_| {
                Ok(OverwriteDecision::Overwrite)
            })
            .unwrap();
        assert_eq!(replaced, Declared::Replaced { previous: ResourceKind::Image });
        assert_eq!(config.declared_names(MappingRole::Input), vec!["A", "B"]);
        assert_eq!(config.inputs.len(), 2);

        let aborted = config.declare(MappingRole::Input, "B", ResourceKind::File, |_| {
            Ok(OverwriteDecision::Abort)
        });
        assert!(matches!(aborted, Err(BqmodError::Aborted { .. })));
        assert_eq!(config.inputs["B"], ResourceKind::Image);
    }
}

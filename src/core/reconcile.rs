use crate::core::extractor::{mapping_variable, KeyUsage, UsedKeys};
use crate::domain::model::MappingRole;
use std::collections::HashSet;
use std::fmt;

/// Declared-vs-used comparison for one mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleReport {
    pub role: MappingRole,
    pub declared: Vec<String>,
    pub used: UsedKeys,
    /// Used in code but never declared, with the line of first use.
    pub invalid: Vec<(String, usize)>,
    /// Declared but never used, in declaration order.
    pub missing: Vec<String>,
}

impl RoleReport {
    fn compare(role: MappingRole, declared: &[String], used: &UsedKeys) -> Self {
        let declared_set: HashSet<&str> = declared.iter().map(String::as_str).collect();

        let invalid = used
            .iter()
            .filter(|(key, _)| !declared_set.contains(key))
            .map(|(key, line)| (key.to_string(), line))
            .collect();
        let missing = declared
            .iter()
            .filter(|name| !used.contains(name))
            .cloned()
            .collect();

        Self {
            role,
            declared: declared.to_vec(),
            used: used.clone(),
            invalid,
            missing,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty() && self.missing.is_empty()
    }

    fn diagnostics_into(&self, lines: &mut Vec<String>) {
        let variable = mapping_variable(self.role);
        for (key, line) in &self.invalid {
            lines.push(format!(
                "Invalid {} key \"{}\" used on {} at line {}: not declared in config",
                self.role, key, variable, line
            ));
        }
        for name in &self.missing {
            lines.push(format!(
                "Missing {} key \"{}\": declared in config but never used on {}",
                self.role, name, variable
            ));
        }
    }

    fn write_table(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variable = mapping_variable(self.role);
        let header_declared = format!("Declared {}s", self.role);
        let header_used = format!("Keys used on {}", variable);

        let used: Vec<String> = self
            .used
            .iter()
            .map(|(key, line)| format!("{} (line {})", key, line))
            .collect();
        let rows = self.declared.len().max(used.len());

        let left_width = self
            .declared
            .iter()
            .map(|name| name.chars().count())
            .chain(std::iter::once(header_declared.chars().count()))
            .max()
            .unwrap_or_default();

        writeln!(out, "{:<width$} | {}", header_declared, header_used, width = left_width)?;
        writeln!(out, "{}-+-{}", "-".repeat(left_width), "-".repeat(header_used.len()))?;
        if rows == 0 {
            writeln!(out, "{:<width$} | ", "(none)", width = left_width)?;
        }
        for row in 0..rows {
            let left = self.declared.get(row).map(String::as_str).unwrap_or("");
            let right = used.get(row).map(String::as_str).unwrap_or("");
            writeln!(out, "{:<width$} | {}", left, right, width = left_width)?;
        }
        Ok(())
    }
}

/// Outcome of cross-checking the config against the glue code. Purely
/// advisory: nothing here stops descriptor generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub inputs: RoleReport,
    pub outputs: RoleReport,
}

impl Reconciliation {
    pub fn invalid_input_keys(&self) -> Vec<&str> {
        self.inputs.invalid.iter().map(|(key, _)| key.as_str()).collect()
    }

    pub fn missing_input_keys(&self) -> Vec<&str> {
        self.inputs.missing.iter().map(String::as_str).collect()
    }

    pub fn invalid_output_keys(&self) -> Vec<&str> {
        self.outputs.invalid.iter().map(|(key, _)| key.as_str()).collect()
    }

    pub fn missing_output_keys(&self) -> Vec<&str> {
        self.outputs.missing.iter().map(String::as_str).collect()
    }

    pub fn has_mismatch(&self) -> bool {
        !(self.inputs.is_clean() && self.outputs.is_clean())
    }

    /// One line per offending key.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.inputs.diagnostics_into(&mut lines);
        self.outputs.diagnostics_into(&mut lines);
        lines
    }

    /// Both comparisons side by side, printed whether or not they match.
    pub fn render_table(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inputs.write_table(f)?;
        writeln!(f)?;
        self.outputs.write_table(f)
    }
}

pub fn reconcile(declared_inputs: &[String], declared_outputs: &[String], usage: &KeyUsage) -> Reconciliation {
    let report = Reconciliation {
        inputs: RoleReport::compare(MappingRole::Input, declared_inputs, &usage.inputs),
        outputs: RoleReport::compare(MappingRole::Output, declared_outputs, &usage.outputs),
    };
    tracing::debug!(
        "Reconciled {} declared inputs and {} declared outputs (mismatch: {})",
        declared_inputs.len(),
        declared_outputs.len(),
        report.has_mismatch()
    );
    report
}

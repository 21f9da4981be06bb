//! Static extraction of the mapping keys a module's glue code uses.
//!
//! Only literal string subscripts are resolved: `input_path_dict["Input Image"]`
//! is recorded, `input_path_dict[name]` or `input_path_dict[f"{x}"]` is not.
//! Escape sequences are decoded and implicitly concatenated literals are
//! joined, so the recorded key is the runtime value of the constant.
//! Keys built at runtime cannot be known without running the module, so
//! they are silently skipped rather than guessed.

use crate::domain::model::MappingRole;
use crate::utils::error::{BqmodError, Result};
use std::collections::BTreeMap;
use tree_sitter::{Node, Parser, Tree, TreeCursor};

/// Standardized entry point of a module's glue code.
pub const ENTRY_POINT: &str = "run_module";
/// Mapping the entry point reads its inputs from.
pub const INPUT_MAPPING: &str = "input_path_dict";
/// Mapping the entry point writes its outputs to.
pub const OUTPUT_MAPPING: &str = "output_paths_dict";

pub fn mapping_variable(role: MappingRole) -> &'static str {
    match role {
        MappingRole::Input => INPUT_MAPPING,
        MappingRole::Output => OUTPUT_MAPPING,
    }
}

/// Keys seen on one mapping variable, each with the 1-based line of its
/// first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedKeys {
    keys: BTreeMap<String, usize>,
}

impl UsedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later occurrences never move the recorded line.
    pub fn record(&mut self, key: impl Into<String>, line: usize) {
        self.keys.entry(key.into()).or_insert(line);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn line_of(&self, key: &str) -> Option<usize> {
        self.keys.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.keys.iter().map(|(key, line)| (key.as_str(), *line))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, usize)> for UsedKeys {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        let mut used = UsedKeys::new();
        for (key, line) in iter {
            used.record(key, line);
        }
        used
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyUsage {
    pub inputs: UsedKeys,
    pub outputs: UsedKeys,
}

impl KeyUsage {
    pub fn for_role(&self, role: MappingRole) -> &UsedKeys {
        match role {
            MappingRole::Input => &self.inputs,
            MappingRole::Output => &self.outputs,
        }
    }
}

/// Language seam of the checker: parse once, then pull the literal keys
/// used to subscript a given variable inside the entry point.
pub trait KeyUsageExtractor {
    type Tree;

    /// Fails when the source does not parse or the entry point is missing
    /// or ambiguous.
    fn parse(&self, source: &str) -> Result<Self::Tree>;

    fn extract_literal_subscript_keys(&self, tree: &Self::Tree, variable: &str) -> Result<UsedKeys>;
}

pub fn extract_key_usage<E: KeyUsageExtractor>(extractor: &E, source: &str) -> Result<KeyUsage> {
    let tree = extractor.parse(source)?;
    let usage = KeyUsage {
        inputs: extractor.extract_literal_subscript_keys(&tree, INPUT_MAPPING)?,
        outputs: extractor.extract_literal_subscript_keys(&tree, OUTPUT_MAPPING)?,
    };
    tracing::debug!(
        "Extracted {} input keys and {} output keys",
        usage.inputs.len(),
        usage.outputs.len()
    );
    Ok(usage)
}

/// Python glue code parsed with tree-sitter.
pub struct PythonModule {
    tree: Tree,
    source: String,
}

impl PythonModule {
    fn entry_point(&self) -> Result<Node<'_>> {
        let mut definitions = top_level_functions(&self.tree, &self.source, ENTRY_POINT);
        match definitions.len() {
            1 => Ok(definitions.remove(0)),
            0 => Err(BqmodError::EntryPointNotFound {
                name: ENTRY_POINT.to_string(),
            }),
            _ => Err(BqmodError::DuplicateEntryPoint {
                name: ENTRY_POINT.to_string(),
                lines: definitions.iter().map(line_of).collect(),
            }),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PythonKeyExtractor;

impl PythonKeyExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl KeyUsageExtractor for PythonKeyExtractor {
    type Tree = PythonModule;

    fn parse(&self, source: &str) -> Result<PythonModule> {
        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&language).map_err(|e| BqmodError::AnalysisError {
            message: format!("cannot load Python grammar: {}", e),
        })?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| BqmodError::AnalysisError {
                message: "parser returned no tree".to_string(),
            })?;

        if tree.root_node().has_error() {
            let line = first_error_line(tree.root_node()).unwrap_or(1);
            return Err(BqmodError::SourceSyntaxError { line });
        }

        let module = PythonModule {
            tree,
            source: source.to_string(),
        };
        module.entry_point()?;
        Ok(module)
    }

    fn extract_literal_subscript_keys(&self, module: &PythonModule, variable: &str) -> Result<UsedKeys> {
        let entry = module.entry_point()?;
        let mut collector = SubscriptCollector {
            source: &module.source,
            variable,
            keys: UsedKeys::new(),
        };
        let mut cursor = entry.walk();
        collector.walk(&mut cursor);
        Ok(collector.keys)
    }
}

fn line_of(node: &Node<'_>) -> usize {
    node.start_position().row + 1
}

fn node_text<'s>(node: &Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

/// `def name(...)` directly under the module, decorated or not.
fn top_level_functions<'t>(tree: &'t Tree, source: &str, name: &str) -> Vec<Node<'t>> {
    let root = tree.root_node();
    let mut cursor = root.walk();
    let functions: Vec<Node<'t>> = root
        .named_children(&mut cursor)
        .filter_map(|child| match child.kind() {
            "function_definition" => Some(child),
            "decorated_definition" => child
                .child_by_field_name("definition")
                .filter(|definition| definition.kind() == "function_definition"),
            _ => None,
        })
        .filter(|function| {
            function
                .child_by_field_name("name")
                .is_some_and(|ident| node_text(&ident, source) == name)
        })
        .collect();
    functions
}

fn first_error_line(node: Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(line_of(&node));
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

/// Value of a string constant; `None` for f-strings with interpolation,
/// bytes literals and anything that is not a string. Implicitly
/// concatenated literals count as one constant.
fn literal_string(node: &Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "string" => string_value(node, source),
        "concatenated_string" => {
            let mut cursor = node.walk();
            let parts: Vec<Node<'_>> = node
                .named_children(&mut cursor)
                .filter(|part| part.kind() != "comment")
                .collect();
            parts.iter().map(|part| string_value(part, source)).collect()
        }
        _ => None,
    }
}

fn string_value(node: &Node<'_>, source: &str) -> Option<String> {
    if node.kind() != "string" {
        return None;
    }

    let mut value = String::new();
    let mut raw = false;
    let mut cursor = node.walk();
    for part in node.children(&mut cursor) {
        match part.kind() {
            "string_start" => {
                let prefix = node_text(&part, source).to_ascii_lowercase();
                if prefix.contains('b') {
                    return None;
                }
                raw = prefix.contains('r');
            }
            "string_content" if raw => value.push_str(node_text(&part, source)),
            "string_content" => push_decoded(&part, source, &mut value)?,
            "interpolation" => return None,
            _ => {}
        }
    }
    Some(value)
}

/// Copies `content` with its `escape_sequence` children decoded. Text the
/// grammar does not treat as an escape (`\d`) is kept as written.
fn push_decoded(content: &Node<'_>, source: &str, value: &mut String) -> Option<()> {
    let mut position = content.start_byte();
    let mut cursor = content.walk();
    for escape in content.named_children(&mut cursor) {
        let decoded = match escape.kind() {
            "escape_sequence" => decode_escape(node_text(&escape, source))?,
            // `{{` in an f-string without interpolation
            "escape_interpolation" => node_text(&escape, source).chars().take(1).collect(),
            _ => continue,
        };
        value.push_str(source.get(position..escape.start_byte())?);
        value.push_str(&decoded);
        position = escape.end_byte();
    }
    value.push_str(source.get(position..content.end_byte())?);
    Some(())
}

fn decode_escape(escape: &str) -> Option<String> {
    let body = escape.strip_prefix('\\')?;
    let mut chars = body.chars();
    let first = chars.next()?;
    let decoded = match first {
        '\n' | '\r' => return Some(String::new()),
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'a' => '\u{07}',
        'b' => '\u{08}',
        'f' => '\u{0C}',
        'v' => '\u{0B}',
        '\\' | '\'' | '"' => first,
        'x' | 'u' | 'U' => char::from_u32(u32::from_str_radix(chars.as_str(), 16).ok()?)?,
        '0'..='7' => char::from_u32(u32::from_str_radix(body, 8).ok()?)?,
        // \N{NAME} needs the Unicode name table; keep it verbatim
        'N' => return Some(escape.to_string()),
        _ => return None,
    };
    Some(decoded.to_string())
}

struct SubscriptCollector<'a> {
    source: &'a str,
    variable: &'a str,
    keys: UsedKeys,
}

impl<'a> SubscriptCollector<'a> {
    fn walk(&mut self, cursor: &mut TreeCursor) {
        let node = cursor.node();
        if node.kind() == "subscript" {
            self.visit_subscript(&node);
        }

        if cursor.goto_first_child() {
            loop {
                self.walk(cursor);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }

    fn visit_subscript(&mut self, node: &Node<'_>) {
        let Some(base) = node.child_by_field_name("value") else {
            return;
        };
        if base.kind() != "identifier" || node_text(&base, self.source) != self.variable {
            return;
        }

        let mut cursor = node.walk();
        let indices: Vec<Node<'_>> = node.children_by_field_name("subscript", &mut cursor).collect();
        if let [index] = indices.as_slice() {
            if let Some(key) = literal_string(index, self.source) {
                self.keys.record(key, line_of(node));
            } else {
                tracing::debug!(
                    "Skipping non-literal key on {} at line {}",
                    self.variable,
                    line_of(node)
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(source: &str) -> Result<KeyUsage> {
        extract_key_usage(&PythonKeyExtractor::new(), source)
    }

    #[test]
    fn test_collects_literal_keys_with_first_line() {
        let source = r#"import os

def run_module(input_path_dict, output_folder_path):
    img = load(input_path_dict["Input Image"])
    again = input_path_dict["Input Image"]
    mask = input_path_dict['Mask']
    output_paths_dict = {}
    output_paths_dict["Edge Image"] = os.path.join(output_folder_path, "edges.png")
    return output_paths_dict
"#;
        let usage = usage(source).unwrap();
        assert_eq!(usage.inputs.len(), 2);
        assert_eq!(usage.inputs.line_of("Input Image"), Some(4));
        assert_eq!(usage.inputs.line_of("Mask"), Some(6));
        assert_eq!(usage.outputs.line_of("Edge Image"), Some(8));
        assert_eq!(usage.outputs.len(), 1);
    }

    #[test]
    fn test_dynamic_keys_are_skipped() {
        let source = r#"
def run_module(input_path_dict, output_folder_path):
    name = "Input Image"
    a = input_path_dict[name]
    b = input_path_dict[f"{name}"]
    c = input_path_dict[b"raw"]
    d = input_path_dict[f"plain"]
    e = other_dict["Ignored"]
    return {}
"#;
        let usage = usage(source).unwrap();
        let keys: Vec<&str> = usage.inputs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["plain"]);
        assert!(usage.outputs.is_empty());
    }

    #[test]
    fn test_escaped_and_concatenated_keys_are_decoded() {
        let source = r#"
def run_module(input_path_dict, output_folder_path):
    a = input_path_dict["Cell\tStats"]
    b = input_path_dict['It\'s']
    c = input_path_dict["Input " "Image"]
    d = input_path_dict["caf\u00e9 \x41"]
    e = input_path_dict[r"raw\tkey"]
    output_paths_dict = {}
    output_paths_dict["Edge " 'Image'] = None
    return output_paths_dict
"#;
        let usage = usage(source).unwrap();
        assert_eq!(usage.inputs.line_of("Cell\tStats"), Some(3));
        assert_eq!(usage.inputs.line_of("It's"), Some(4));
        assert_eq!(usage.inputs.line_of("Input Image"), Some(5));
        assert_eq!(usage.inputs.line_of("caf\u{e9} A"), Some(6));
        assert_eq!(usage.inputs.line_of("raw\\tkey"), Some(7));
        assert_eq!(usage.outputs.line_of("Edge Image"), Some(9));
        assert!(!usage.inputs.contains("Cell\\tStats"));
    }

    #[test]
    fn test_concatenation_with_dynamic_part_is_skipped() {
        let source = r#"
def run_module(input_path_dict, output_folder_path):
    name = "Image"
    a = input_path_dict["Input " f"{name}"]
    b = input_path_dict[b"raw" b"bytes"]
    return {}
"#;
        assert!(usage(source).unwrap().inputs.is_empty());
    }

    #[test]
    fn test_decode_escape_table() {
        assert_eq!(decode_escape("\\n").as_deref(), Some("\n"));
        assert_eq!(decode_escape("\\\\").as_deref(), Some("\\"));
        assert_eq!(decode_escape("\\101").as_deref(), Some("A"));
        assert_eq!(decode_escape("\\U0001F600").as_deref(), Some("\u{1F600}"));
        assert_eq!(decode_escape("\\\n").as_deref(), Some(""));
        assert_eq!(decode_escape("\\N{BULLET}").as_deref(), Some("\\N{BULLET}"));
    }

    #[test]
    fn test_keys_outside_entry_point_are_ignored() {
        let source = r#"
def helper(input_path_dict):
    return input_path_dict["Helper Key"]

def run_module(input_path_dict, output_folder_path):
    def nested():
        return input_path_dict["Nested Key"]
    return {"x": nested()}
"#;
        let usage = usage(source).unwrap();
        assert!(!usage.inputs.contains("Helper Key"));
        assert!(usage.inputs.contains("Nested Key"));
    }

    #[test]
    fn test_decorated_entry_point_is_found() {
        let source = r#"
@timed
def run_module(input_path_dict, output_folder_path):
    return input_path_dict["A"]
"#;
        assert!(usage(source).unwrap().inputs.contains("A"));
    }

    #[test]
    fn test_missing_entry_point() {
        let source = "def run(input_path_dict):\n    return input_path_dict['A']\n";
        assert!(matches!(
            usage(source),
            Err(BqmodError::EntryPointNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_entry_point_is_an_error() {
        let source = r#"
def run_module(input_path_dict, output_folder_path):
    return input_path_dict["A"]

def run_module(input_path_dict, output_folder_path):
    return input_path_dict["B"]
"#;
        match usage(source) {
            Err(BqmodError::DuplicateEntryPoint { lines, .. }) => assert_eq!(lines, vec![2, 5]),
            other => panic!("expected duplicate entry point, got {:?}", other),
        }
    }

    #[test]
    fn test_method_named_run_module_is_not_top_level() {
        let source = r#"
class Wrapper:
    def run_module(self, input_path_dict):
        return input_path_dict["A"]
"#;
        assert!(matches!(
            usage(source),
            Err(BqmodError::EntryPointNotFound { .. })
        ));
    }

    #[test]
    fn test_syntax_error_is_reported_with_line() {
        let source = "def run_module(input_path_dict):\n    return input_path_dict[\"A\"]\n\ndef broken(:\n    pass\n";
        match usage(source) {
            Err(BqmodError::SourceSyntaxError { line }) => assert_eq!(line, 4),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_used_keys_first_occurrence_wins() {
        let keys: UsedKeys = vec![("A", 10), ("A", 3), ("B", 7)].into_iter().collect();
        assert_eq!(keys.line_of("A"), Some(10));
        assert_eq!(keys.len(), 2);
    }
}

//! Builds a module descriptor out of a base template and a `ModuleConfig`.

use crate::core::descriptor::{DescriptorDocument, Element};
use crate::domain::model::{InputKind, MappingRole, MetadataField, ModuleConfig, ResourceKind};
use crate::utils::error::{BqmodError, Result};
use crate::utils::validation::{validate_module_name, validate_required_field};
use std::collections::HashMap;

pub const MEX_INPUT_ID: &str = "mex_url";
pub const TOKEN_INPUT_ID: &str = "bisque_token";
const SYSTEM_INPUT_TYPE: &str = "system-input";

/// `"  Input   Image "` -> `input_image`
pub fn identifier_for(display_name: &str) -> String {
    display_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn is_system_input(element: &Element) -> bool {
    element.attr("type") == Some(SYSTEM_INPUT_TYPE)
}

fn labelled_template(display_name: &str) -> Element {
    Element::new("template").with_child(Element::tag(&[("name", "label"), ("value", display_name)]))
}

pub fn add_input(document: &mut DescriptorDocument, kind: InputKind, display_name: &str) -> Result<()> {
    let inputs = document.node_mut("inputs")?;

    let system_id = match kind {
        InputKind::Resource(resource) => {
            let mut template = labelled_template(display_name);
            for accepted in resource.accepted_types() {
                template
                    .children
                    .push(Element::tag(&[("name", "accepted_type"), ("value", *accepted)]));
            }
            template
                .children
                .push(Element::tag(&[("name", "prohibit_upload"), ("value", "True")]));

            let declaration = Element::tag(&[
                ("name", identifier_for(display_name).as_str()),
                ("type", "resource"),
            ])
            .with_child(template);

            // 使用者輸入一律排在系統輸入之前
            let position = inputs
                .children
                .iter()
                .position(is_system_input)
                .unwrap_or(inputs.children.len());
            inputs.children.insert(position, declaration);
            return Ok(());
        }
        InputKind::Mex => MEX_INPUT_ID,
        InputKind::BisqueToken => TOKEN_INPUT_ID,
    };

    if inputs.named_children(system_id).next().is_some() {
        return Err(BqmodError::template(format!(
            "system input '{}' is already present",
            system_id
        )));
    }
    inputs
        .children
        .push(Element::tag(&[("name", system_id), ("type", SYSTEM_INPUT_TYPE)]));
    Ok(())
}

pub fn add_output(document: &mut DescriptorDocument, kind: ResourceKind, display_name: &str) -> Result<()> {
    let outputs = document.node_mut("outputs")?;
    let declaration = Element::tag(&[
        ("name", identifier_for(display_name).as_str()),
        ("type", kind.as_str()),
    ])
    .with_child(labelled_template(display_name));
    outputs.children.push(declaration);
    Ok(())
}

/// String-typed entry point: the kind is validated before the document is
/// touched.
pub fn add_input_named(document: &mut DescriptorDocument, kind: &str, display_name: &str) -> Result<()> {
    let kind: InputKind = kind.parse()?;
    add_input(document, kind, display_name)
}

pub fn add_output_named(document: &mut DescriptorDocument, kind: &str, display_name: &str) -> Result<()> {
    let kind = ResourceKind::parse_for(MappingRole::Output, kind)?;
    add_output(document, kind, display_name)
}

pub fn set_metadata(document: &mut DescriptorDocument, field: MetadataField, value: &str) -> Result<()> {
    document.node_mut(field.tag_name())?.set_attr("value", value);
    Ok(())
}

fn check_identifier_collisions(config: &ModuleConfig, role: MappingRole) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for name in config.declarations(role).keys() {
        let identifier = identifier_for(name);
        if identifier.is_empty() {
            return Err(BqmodError::InvalidConfigValueError {
                field: format!("{}s", role),
                value: name.clone(),
                reason: "Name has no visible characters".to_string(),
            });
        }
        if let Some(first) = seen.insert(identifier.clone(), name.as_str()) {
            return Err(BqmodError::DuplicateIdentifier {
                role: role.to_string(),
                first: first.to_string(),
                second: name.clone(),
                identifier,
            });
        }
    }
    Ok(())
}

/// Config checks that must pass before any document is built.
pub fn validate_for_generation(config: &ModuleConfig) -> Result<&str> {
    let name = validate_required_field("Name", &config.name)?;
    validate_module_name("Name", name)?;
    check_identifier_collisions(config, MappingRole::Input)?;
    check_identifier_collisions(config, MappingRole::Output)?;
    Ok(name)
}

/// Full descriptor for `config`: user inputs in declaration order, then the
/// two system inputs, then outputs, then metadata.
pub fn render_descriptor(config: &ModuleConfig, template: &str) -> Result<DescriptorDocument> {
    let name = validate_for_generation(config)?;

    let mut document = DescriptorDocument::parse(template)?;
    document.ensure_required_nodes()?;
    document.set_module_name(name);

    for (display_name, kind) in &config.inputs {
        add_input(&mut document, InputKind::Resource(*kind), display_name)?;
    }
    add_input(&mut document, InputKind::Mex, "")?;
    add_input(&mut document, InputKind::BisqueToken, "")?;

    for (display_name, kind) in &config.outputs {
        add_output(&mut document, *kind, display_name)?;
    }

    set_metadata(&mut document, MetadataField::Title, name)?;
    set_metadata(
        &mut document,
        MetadataField::Authors,
        config.author.as_deref().unwrap_or_default(),
    )?;
    set_metadata(
        &mut document,
        MetadataField::Description,
        config.description.as_deref().unwrap_or_default(),
    )?;

    tracing::debug!(
        "Built descriptor for {} with {} inputs and {} outputs",
        name,
        config.inputs.len(),
        config.outputs.len()
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"<module name="x" type="runtime">
  <tag name="inputs"/>
  <tag name="outputs"/>
  <tag name="title" value="t"/>
  <tag name="authors" value="a"/>
  <tag name="description" value="d"/>
</module>"#;

    fn names(element: &Element) -> Vec<&str> {
        element.children.iter().filter_map(|c| c.attr("name")).collect()
    }

    #[test]
    fn test_identifier_for() {
        assert_eq!(identifier_for("Input Image"), "input_image");
        assert_eq!(identifier_for("  Input   Image "), "input_image");
        assert_eq!(identifier_for("Input\tImage"), "input_image");
        assert_eq!(identifier_for("Mask"), "mask");
    }

    #[test]
    fn test_add_image_input_shape() {
        let mut doc = DescriptorDocument::parse(TEMPLATE).unwrap();
        add_input(&mut doc, InputKind::Resource(ResourceKind::Image), "Input Image").unwrap();

        let inputs = doc.node("inputs").unwrap();
        assert_eq!(inputs.children.len(), 1);
        let declaration = &inputs.children[0];
        assert_eq!(declaration.attr("name"), Some("input_image"));
        assert_eq!(declaration.attr("type"), Some("resource"));

        let template = &declaration.children[0];
        assert_eq!(template.name, "template");
        let pairs: Vec<(&str, &str)> = template
            .children
            .iter()
            .map(|c| (c.attr("name").unwrap(), c.attr("value").unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("label", "Input Image"),
                ("accepted_type", "image"),
                ("accepted_type", "dataset"),
                ("prohibit_upload", "True"),
            ]
        );
    }

    #[test]
    fn test_file_input_has_single_accepted_type() {
        let mut doc = DescriptorDocument::parse(TEMPLATE).unwrap();
        add_input(&mut doc, InputKind::Resource(ResourceKind::File), "Model Weights").unwrap();
        let template = &doc.node("inputs").unwrap().children[0].children[0];
        let accepted: Vec<&str> = template
            .named_children("accepted_type")
            .filter_map(|c| c.attr("value"))
            .collect();
        assert_eq!(accepted, vec!["file"]);
    }

    #[test]
    fn test_user_inputs_stay_ahead_of_system_inputs() {
        let mut doc = DescriptorDocument::parse(TEMPLATE).unwrap();
        add_input(&mut doc, InputKind::Mex, "").unwrap();
        add_input(&mut doc, InputKind::Resource(ResourceKind::Table), "Stats").unwrap();
        add_input(&mut doc, InputKind::BisqueToken, "").unwrap();
        add_input(&mut doc, InputKind::Resource(ResourceKind::Image), "Raw").unwrap();

        assert_eq!(
            names(doc.node("inputs").unwrap()),
            vec!["stats", "raw", "mex_url", "bisque_token"]
        );
    }

    #[test]
    fn test_system_inputs_are_added_once() {
        let mut doc = DescriptorDocument::parse(TEMPLATE).unwrap();
        add_input(&mut doc, InputKind::Mex, "").unwrap();
        assert!(add_input(&mut doc, InputKind::Mex, "").is_err());
        assert_eq!(doc.node("inputs").unwrap().children.len(), 1);
    }

    #[test]
    fn test_output_uses_kind_as_type() {
        let mut doc = DescriptorDocument::parse(TEMPLATE).unwrap();
        add_output(&mut doc, ResourceKind::Table, "Cell Stats").unwrap();
        let declaration = &doc.node("outputs").unwrap().children[0];
        assert_eq!(declaration.attr("name"), Some("cell_stats"));
        assert_eq!(declaration.attr("type"), Some("table"));
        assert_eq!(declaration.children[0].children.len(), 1);
        assert_eq!(declaration.children[0].children[0].attr("name"), Some("label"));
    }

    #[test]
    fn test_unknown_kind_rejected_before_mutation() {
        let mut doc = DescriptorDocument::parse(TEMPLATE).unwrap();
        let before = doc.clone();

        assert!(matches!(
            add_input_named(&mut doc, "video", "Clip"),
            Err(BqmodError::UnknownKind { .. })
        ));
        assert!(matches!(
            add_output_named(&mut doc, "mex", "Run"),
            Err(BqmodError::UnknownKind { .. })
        ));
        assert_eq!(doc, before);

        add_input_named(&mut doc, "bisque_token", "").unwrap();
        assert_eq!(names(doc.node("inputs").unwrap()), vec!["bisque_token"]);
    }

    #[test]
    fn test_set_metadata() {
        let mut doc = DescriptorDocument::parse(TEMPLATE).unwrap();
        set_metadata(&mut doc, MetadataField::Authors, "Ivan").unwrap();
        assert_eq!(doc.node("authors").unwrap().attr("value"), Some("Ivan"));

        let mut bare = DescriptorDocument::parse(r#"<module><tag name="title"/></module>"#).unwrap();
        assert!(matches!(
            set_metadata(&mut bare, MetadataField::Description, "x"),
            Err(BqmodError::TemplateError { .. })
        ));
    }

    #[test]
    fn test_render_descriptor_order_and_metadata() {
        let mut config = ModuleConfig {
            name: Some("Pipeline".to_string()),
            author: Some("Lab".to_string()),
            ..Default::default()
        };
        config.inputs.insert("C".to_string(), ResourceKind::File);
        config.inputs.insert("A".to_string(), ResourceKind::Image);
        config.inputs.insert("B".to_string(), ResourceKind::Table);

        let doc = render_descriptor(&config, TEMPLATE).unwrap();
        assert_eq!(doc.module_name(), Some("Pipeline"));
        assert_eq!(
            names(doc.node("inputs").unwrap()),
            vec!["c", "a", "b", "mex_url", "bisque_token"]
        );
        assert_eq!(doc.node("title").unwrap().attr("value"), Some("Pipeline"));
        assert_eq!(doc.node("authors").unwrap().attr("value"), Some("Lab"));
        assert_eq!(doc.node("description").unwrap().attr("value"), Some(""));
    }

    #[test]
    fn test_render_descriptor_requires_name() {
        let config = ModuleConfig::default();
        assert!(matches!(
            render_descriptor(&config, TEMPLATE),
            Err(BqmodError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_render_descriptor_rejects_identifier_collision() {
        let mut config = ModuleConfig {
            name: Some("M".to_string()),
            ..Default::default()
        };
        config.outputs.insert("Edge Image".to_string(), ResourceKind::Image);
        config.outputs.insert("edge  image".to_string(), ResourceKind::Image);

        assert!(matches!(
            render_descriptor(&config, TEMPLATE),
            Err(BqmodError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn test_render_descriptor_rejects_incomplete_template() {
        let config = ModuleConfig {
            name: Some("M".to_string()),
            ..Default::default()
        };
        let template = r#"<module><tag name="inputs"/><tag name="outputs"/></module>"#;
        assert!(matches!(
            render_descriptor(&config, template),
            Err(BqmodError::TemplateError { .. })
        ));
    }
}

//! In-memory model of a module descriptor.
//!
//! The descriptor is a small XML tree: a root `module` element whose
//! children are `tag` elements told apart by their `name` attribute. Only
//! the handful of operations the mutator needs are exposed; everything
//! else in the base template is carried through untouched.

use crate::utils::error::{BqmodError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Indentation unit of the rendered descriptor (five spaces).
pub const INDENT_WIDTH: usize = 5;

/// Template used when no base template path is configured.
pub const BUILTIN_TEMPLATE: &str = include_str!("../../templates/module_template.xml");

/// Top-level nodes every base template must provide.
pub const REQUIRED_NODES: [&str; 5] = ["inputs", "outputs", "title", "authors", "description"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: Option<String>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// `<tag name=".." ...>` with attributes in the given order.
    pub fn tag(attributes: &[(&str, &str)]) -> Self {
        let mut element = Element::new("tag");
        for (key, value) in attributes {
            element.set_attr(key, value);
        }
        element
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Overwrites in place so attribute order stays stable across renders.
    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }

    /// Children whose `name` attribute equals `name`.
    pub fn named_children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |child| child.attr("name") == Some(name))
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_none() {
            return write_event(writer, Event::Empty(start));
        }

        write_event(writer, Event::Start(start))?;
        if let Some(text) = &self.text {
            write_event(writer, Event::Text(BytesText::new(text)))?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        write_event(writer, Event::End(BytesEnd::new(self.name.as_str())))
    }
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| BqmodError::xml(format!("failed to write descriptor: {}", e)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorDocument {
    root: Element,
}

impl DescriptorDocument {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Parse a base template. Whitespace-only text is dropped so that
    /// re-rendering produces clean indentation.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                BqmodError::xml(format!(
                    "malformed template at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            })?;

            match event {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| BqmodError::xml("unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| BqmodError::xml(format!("bad text content: {}", e)))?;
                    if let Some(current) = stack.last_mut() {
                        current.text = Some(value.into_owned());
                    }
                }
                Event::Eof => break,
                // 宣告、註解、處理指令都不保留
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(BqmodError::xml(format!(
                "unclosed element <{}>",
                stack.last().map(|e| e.name.as_str()).unwrap_or_default()
            )));
        }

        root.map(Self::new)
            .ok_or_else(|| BqmodError::xml("template has no root element"))
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn module_name(&self) -> Option<&str> {
        self.root.attr("name")
    }

    pub fn set_module_name(&mut self, name: &str) {
        self.root.set_attr("name", name);
    }

    /// The unique top-level node called `name`.
    pub fn node(&self, name: &str) -> Result<&Element> {
        let index = self.node_index(name)?;
        Ok(&self.root.children[index])
    }

    pub fn node_mut(&mut self, name: &str) -> Result<&mut Element> {
        let index = self.node_index(name)?;
        Ok(&mut self.root.children[index])
    }

    fn node_index(&self, name: &str) -> Result<usize> {
        let mut matches = self
            .root
            .children
            .iter()
            .enumerate()
            .filter(|(_, child)| child.attr("name") == Some(name))
            .map(|(index, _)| index);

        match (matches.next(), matches.next()) {
            (Some(index), None) => Ok(index),
            (None, _) => Err(BqmodError::template(format!(
                "no top-level <tag name=\"{}\"> node",
                name
            ))),
            (Some(_), Some(_)) => Err(BqmodError::template(format!(
                "more than one top-level <tag name=\"{}\"> node",
                name
            ))),
        }
    }

    /// Checks the nodes the mutator writes into.
    pub fn ensure_required_nodes(&self) -> Result<()> {
        for name in REQUIRED_NODES {
            self.node_index(name)?;
        }
        Ok(())
    }

    /// Pretty-printed XML with declaration and trailing newline. Pure: the
    /// same document always renders to the same bytes.
    pub fn render(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT_WIDTH);
        write_event(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
        )?;
        self.root.write_to(&mut writer)?;

        let mut rendered = String::from_utf8(writer.into_inner())
            .map_err(|e| BqmodError::xml(format!("descriptor is not UTF-8: {}", e)))?;
        rendered.push('\n');
        Ok(rendered)
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| BqmodError::xml(format!("element name is not UTF-8: {}", e)))?
        .to_string();
    let mut element = Element::new(name);

    for attribute in start.attributes() {
        let attribute =
            attribute.map_err(|e| BqmodError::xml(format!("bad attribute: {}", e)))?;
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|e| BqmodError::xml(format!("attribute name is not UTF-8: {}", e)))?
            .to_string();
        let value = attribute
            .unescape_value()
            .map_err(|e| BqmodError::xml(format!("bad attribute value for {}: {}", key, e)))?;
        element.set_attr(&key, &value);
    }

    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(BqmodError::xml("template has more than one root element")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<module name="Placeholder" type="runtime">
    <tag name="inputs"></tag>
    <tag name="outputs" />
    <tag name="title" value="Title" />
    <tag name="authors" value="Authors" />
    <tag name="description" value="Description" />
</module>
"#;

    #[test]
    fn test_parse_keeps_structure_and_attribute_order() {
        let doc = DescriptorDocument::parse(MINIMAL).unwrap();
        assert_eq!(doc.root().name, "module");
        assert_eq!(doc.module_name(), Some("Placeholder"));
        assert_eq!(doc.root().children.len(), 5);
        assert_eq!(
            doc.root().attributes(),
            &[
                ("name".to_string(), "Placeholder".to_string()),
                ("type".to_string(), "runtime".to_string())
            ]
        );
        assert!(doc.ensure_required_nodes().is_ok());
    }

    #[test]
    fn test_render_uses_five_space_indent() {
        let mut doc = DescriptorDocument::parse(MINIMAL).unwrap();
        doc.node_mut("inputs")
            .unwrap()
            .children
            .push(Element::tag(&[("name", "mex_url"), ("type", "system-input")]));

        let xml = doc.render().unwrap();
        let expected = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<module name=\"Placeholder\" type=\"runtime\">\n\
\x20    <tag name=\"inputs\">\n\
\x20         <tag name=\"mex_url\" type=\"system-input\"/>\n\
\x20    </tag>\n\
\x20    <tag name=\"outputs\"/>\n\
\x20    <tag name=\"title\" value=\"Title\"/>\n\
\x20    <tag name=\"authors\" value=\"Authors\"/>\n\
\x20    <tag name=\"description\" value=\"Description\"/>\n\
</module>\n";
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_render_round_trips_through_parse() {
        let doc = DescriptorDocument::parse(MINIMAL).unwrap();
        let once = doc.render().unwrap();
        let again = DescriptorDocument::parse(&once).unwrap().render().unwrap();
        assert_eq!(once, again);
    }

    #[test]
    fn test_attribute_values_are_escaped() {
        let mut doc = DescriptorDocument::parse(MINIMAL).unwrap();
        doc.node_mut("title").unwrap().set_attr("value", "Edges & \"Ridges\"");
        let xml = doc.render().unwrap();
        assert!(xml.contains(r#"value="Edges &amp; &quot;Ridges&quot;""#));

        let reparsed = DescriptorDocument::parse(&xml).unwrap();
        assert_eq!(reparsed.node("title").unwrap().attr("value"), Some("Edges & \"Ridges\""));
    }

    #[test]
    fn test_missing_and_duplicate_nodes_are_template_errors() {
        let missing = DescriptorDocument::parse(r#"<module name="x"><tag name="inputs"/></module>"#)
            .unwrap();
        assert!(matches!(
            missing.ensure_required_nodes(),
            Err(BqmodError::TemplateError { .. })
        ));

        let duplicate = DescriptorDocument::parse(
            r#"<module><tag name="title" value="a"/><tag name="title" value="b"/></module>"#,
        )
        .unwrap();
        assert!(matches!(
            duplicate.node("title"),
            Err(BqmodError::TemplateError { .. })
        ));
    }

    #[test]
    fn test_builtin_template_is_usable() {
        let doc = DescriptorDocument::parse(BUILTIN_TEMPLATE).unwrap();
        assert_eq!(doc.module_name(), Some("ModuleName"));
        assert!(doc.ensure_required_nodes().is_ok());
        assert_eq!(doc.node("help").unwrap().attr("value"), Some("public/help.html"));
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        assert!(matches!(
            DescriptorDocument::parse("<module><tag name=\"inputs\"></module>"),
            Err(BqmodError::XmlError { .. })
        ));
        assert!(matches!(
            DescriptorDocument::parse(""),
            Err(BqmodError::XmlError { .. })
        ));
    }
}

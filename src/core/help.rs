use crate::utils::error::{BqmodError, Result};
use pulldown_cmark::{html, Options, Parser};
use pulldown_cmark_escape::escape_html;
use std::fmt::{self, Write as _};

/// Standalone HTML help page for a module, rendered from its README.
pub fn render_help_html(title: &str, markdown: &str) -> Result<String> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, parser);

    let mut page = String::with_capacity(body.len() + 128);
    write_page(&mut page, title, &body).map_err(|_| BqmodError::TemplateError {
        message: format!("Could not render the help page for '{}'", title),
    })?;
    Ok(page)
}

fn write_page(page: &mut String, title: &str, body: &str) -> fmt::Result {
    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>");
    escape_html(&mut *page, title)?;
    write!(page, "</title>\n</head>\n<body>\n{}</body>\n</html>\n", body)
}

//! Shell template abstraction.

/// Head content for the shell.
#[derive(Debug, Clone, Default)]
pub struct HeadContent {
    /// Page title.
    pub title: Option<String>,
    /// Meta tags.
    pub meta: Vec<(String, String)>,
    /// Link tags (stylesheets, etc.).
    pub links: Vec<String>,
    /// Inline scripts in head.
    pub scripts: Vec<String>,
}

impl HeadContent {
    /// Create new head content with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Add a meta tag.
    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.meta.push((name.to_string(), content.to_string()));
        self
    }

    /// Add a stylesheet link.
    pub fn with_stylesheet(mut self, href: &str) -> Self {
        self.links
            .push(format!(r#"<link rel="stylesheet" href="{}">"#, escape_attr(href)));
        self
    }

    /// Add an inline script.
    pub fn with_script(mut self, js: &str) -> Self {
        self.scripts.push(js.to_string());
        self
    }

    /// Render head content to HTML.
    pub fn render(&self) -> String {
        let mut html = String::from("<meta charset=\"utf-8\">\n");

        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>\n", escape_text(title)));
        }

        for (name, content) in &self.meta {
            html.push_str(&format!(
                r#"<meta name="{}" content="{}">"#,
                escape_attr(name),
                escape_attr(content)
            ));
            html.push('\n');
        }

        for link in &self.links {
            html.push_str(link);
            html.push('\n');
        }

        for script in &self.scripts {
            html.push_str(&format!("<script>{}</script>\n", script));
        }

        html
    }
}

/// Swaps each streamed `<template data-section-for>` into its placeholder.
pub const SECTION_SWAP_SCRIPT: &str = "function $es(n){var t=document.querySelector('template[data-section-for=\"'+n+'\"]'),s=document.querySelector('[data-section=\"'+n+'\"]');if(t&&s){s.replaceChildren(t.content.cloneNode(true));t.remove();}}";

/// Document frame around the streamed sections.
#[derive(Debug, Clone)]
pub struct Shell {
    /// Include doctype declaration.
    pub doctype: bool,
    /// Document language.
    pub lang: String,
    /// Head content.
    pub head: HeadContent,
    /// HTML before sections (opening body, wrapper divs, etc.).
    pub body_start: String,
    /// HTML after sections (closing tags).
    pub body_end: String,
}

impl Shell {
    /// Create a new shell with basic structure.
    pub fn new(head: HeadContent) -> Self {
        Self {
            doctype: true,
            lang: "en".to_string(),
            head: head.with_script(SECTION_SWAP_SCRIPT),
            body_start: "<body>\n<main>\n".to_string(),
            body_end: "</main>\n</body>\n</html>".to_string(),
        }
    }

    /// Set custom body start HTML.
    pub fn with_body_start(mut self, html: impl Into<String>) -> Self {
        self.body_start = html.into();
        self
    }

    /// Set custom body end HTML.
    pub fn with_body_end(mut self, html: impl Into<String>) -> Self {
        self.body_end = html.into();
        self
    }

    /// Render the opening part of the shell (before sections).
    pub fn render_opening(&self) -> String {
        let mut html = String::new();

        if self.doctype {
            html.push_str("<!DOCTYPE html>\n");
        }

        html.push_str(&format!("<html lang=\"{}\">\n<head>\n", escape_attr(&self.lang)));
        html.push_str(&self.head.render());
        html.push_str("</head>\n");
        html.push_str(&self.body_start);

        html
    }

    /// Render the closing part of the shell (after sections).
    pub fn render_closing(&self) -> String {
        self.body_end.clone()
    }
}

/// Placeholder wrapping a section's initial content inside the shell.
pub fn section_markup(name: &str, html: &str) -> String {
    format!(
        "<section data-section=\"{}\">{}</section>\n",
        escape_attr(name),
        html
    )
}

/// Late fill for a deferred section, streamed after the shell.
pub fn template_markup(name: &str, html: &str) -> String {
    let name = escape_attr(name);
    format!(
        "<template data-section-for=\"{name}\">{html}</template><script>$es(\"{name}\")</script>\n"
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_contains_head_and_swap_script() {
        let shell = Shell::new(HeadContent::new("Streaming <Demo>").with_meta("robots", "noindex"));
        let html = shell.render_opening();

        assert!(html.starts_with("<!DOCTYPE html>\n<html lang=\"en\">"));
        assert!(html.contains("<title>Streaming &lt;Demo&gt;</title>"));
        assert!(html.contains(r#"<meta name="robots" content="noindex">"#));
        assert!(html.contains("function $es(n)"));
        assert!(html.ends_with("<body>\n<main>\n"));
    }

    #[test]
    fn test_custom_body_frame() {
        let shell = Shell::new(HeadContent::default())
            .with_body_start("<body><div id=\"app\">")
            .with_body_end("</div></body></html>");

        assert!(shell.render_opening().ends_with("<div id=\"app\">"));
        assert_eq!(shell.render_closing(), "</div></body></html>");
    }

    #[test]
    fn test_section_and_template_markup_share_name() {
        assert_eq!(
            section_markup("quote", "<p>loading</p>"),
            "<section data-section=\"quote\"><p>loading</p></section>\n"
        );
        let fill = template_markup("quote", "<p>done</p>");
        assert!(fill.starts_with("<template data-section-for=\"quote\"><p>done</p></template>"));
        assert!(fill.contains("$es(\"quote\")"));
    }
}

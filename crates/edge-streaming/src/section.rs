//! Section abstraction for independently streamable page parts.

use std::future::Future;
use std::time::Duration;

use edge_core::RenderError;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Where a section's HTML comes from.
pub enum SectionContent {
    /// Known when the shell is rendered.
    Ready(String),
    /// Resolved after the shell; the fallback is shown until then.
    Deferred(BoxFuture<'static, anyhow::Result<String>>),
    /// Rendering the section failed outright.
    Failed(RenderError),
}

impl std::fmt::Debug for SectionContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(html) => f.debug_tuple("Ready").field(html).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// A section is a named, independently-streamable part of the page.
#[derive(Debug)]
pub struct Section {
    /// Section name (used for placeholders and logs).
    pub name: String,
    /// Shown in the shell while deferred content is pending, or instead of
    /// failed content.
    pub fallback: Option<String>,
    /// Give up on deferred content after this long.
    pub timeout: Option<Duration>,
    /// Section content.
    pub content: SectionContent,
}

impl Section {
    /// A section whose HTML is already known.
    pub fn ready(name: impl Into<String>, html: impl Into<String>) -> Self {
        Self::builder(name).ready(html)
    }

    /// A section resolved after the shell.
    pub fn deferred<F>(name: impl Into<String>, fallback: impl Into<String>, content: F) -> Self
    where
        F: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        Self::builder(name).with_fallback(fallback).deferred(content)
    }

    /// Create a section using the builder.
    pub fn builder(name: impl Into<String>) -> SectionBuilder {
        SectionBuilder::new(name)
    }
}

/// Builder for ergonomic section definition.
pub struct SectionBuilder {
    name: String,
    fallback: Option<String>,
    timeout: Option<Duration>,
}

impl SectionBuilder {
    /// Create a new section builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fallback: None,
            timeout: None,
        }
    }

    /// Set fallback HTML.
    pub fn with_fallback(mut self, html: impl Into<String>) -> Self {
        self.fallback = Some(html.into());
        self
    }

    /// Set timeout for deferred content.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Finish with content known up front.
    pub fn ready(self, html: impl Into<String>) -> Section {
        self.build(SectionContent::Ready(html.into()))
    }

    /// Finish with content resolved later.
    pub fn deferred<F>(self, content: F) -> Section
    where
        F: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.build(SectionContent::Deferred(content.boxed()))
    }

    /// Finish with a section that failed to render.
    pub fn failed(self, error: impl Into<RenderError>) -> Section {
        self.build(SectionContent::Failed(error.into()))
    }

    fn build(self, content: SectionContent) -> Section {
        Section {
            name: self.name,
            fallback: self.fallback,
            timeout: self.timeout,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_fallback_and_timeout() {
        let section = Section::builder("reviews")
            .with_fallback("<p>loading</p>")
            .with_timeout(Duration::from_millis(50))
            .deferred(async { Ok("<p>5 stars</p>".to_string()) });

        assert_eq!(section.name, "reviews");
        assert_eq!(section.fallback.as_deref(), Some("<p>loading</p>"));
        assert_eq!(section.timeout, Some(Duration::from_millis(50)));
        assert!(matches!(section.content, SectionContent::Deferred(_)));
    }

    #[test]
    fn test_ready_section_has_no_fallback() {
        let section = Section::ready("hero", "<h1>Hi</h1>");
        assert!(section.fallback.is_none());
        assert!(matches!(section.content, SectionContent::Ready(ref html) if html == "<h1>Hi</h1>"));
    }
}

//! Small templating language for mapping patterns.
//!
//! A pattern mixes literal text with `{{ name }}` replacement tokens and
//! `{{ seed | filter(args) | ... }}` filter-chain tokens. Patterns are parsed once into
//! a [`Template`] and rendered per value.

pub mod filters;
pub mod lexer;
pub mod render;
pub mod tables;

pub use lexer::{Expr, FilterCall, FilterChain, Node, TemplateError};
pub use render::{RenderEnv, Scope};
pub use tables::{Table, Tables};

/// Parsed pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse a pattern
    ///
    /// # Example
    ///
    /// ```
    /// use bulkmap::template::Template;
    ///
    /// let template = Template::parse("Vol. {{ value|trim }}").unwrap();
    /// assert!(template.has_static_text());
    /// assert_eq!(template.filter_sources(), vec!["{{ value|trim }}"]);
    /// ```
    pub fn parse(pattern: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            source: pattern.to_string(),
            nodes: lexer::parse(pattern)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn has_tokens(&self) -> bool {
        self.nodes.iter().any(|node| !matches!(node, Node::Text(_)))
    }

    /// Whether any non-blank literal text sits outside the tokens.
    pub fn has_static_text(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| matches!(node, Node::Text(text) if !text.trim().is_empty()))
    }

    /// Source text of every `{{ name }}` token, in order.
    pub fn replacement_sources(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Replace { source, .. } => Some(source.clone()),
                _ => None,
            })
            .collect()
    }

    /// Source text of every filter-chain token, in order.
    pub fn filter_sources(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Chain(chain) => Some(chain.source.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(prefix, suffix)` when the pattern is exactly `prefix{{ value }}suffix`.
    pub fn value_wrapper(&self) -> Option<(String, String)> {
        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut seen_value = false;

        for node in &self.nodes {
            match node {
                Node::Text(text) if seen_value => suffix.push_str(text),
                Node::Text(text) => prefix.push_str(text),
                Node::Replace { name, .. } if name == "value" && !seen_value => seen_value = true,
                _ => return None,
            }
        }
        seen_value.then_some((prefix, suffix))
    }

    pub fn render(&self, scope: &dyn Scope, env: &RenderEnv<'_>) -> Option<String> {
        render::render(&self.nodes, scope, env)
    }
}

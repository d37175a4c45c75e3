//! Pattern evaluation.

use crate::template::lexer::{Expr, FilterChain, Node};
use crate::template::tables::Tables;
use crate::transform_registry::{FilterEnv, FilterError, FilterRegistry, FilterValue};

/// Source of values for variables and aliases in a pattern.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<FilterValue>;
}

impl<F> Scope for F
where
    F: Fn(&str) -> Option<FilterValue>,
{
    fn lookup(&self, name: &str) -> Option<FilterValue> {
        self(name)
    }
}

/// Filters and tables a pattern is rendered with.
#[derive(Clone, Copy)]
pub struct RenderEnv<'a> {
    pub filters: &'a FilterRegistry,
    pub tables: &'a Tables,
}

/// Render nodes against a scope.
///
/// Returns `None` when the pattern has no static text and no token produced anything,
/// or when the whole output is empty.
pub fn render(nodes: &[Node], scope: &dyn Scope, env: &RenderEnv<'_>) -> Option<String> {
    let mut output = String::new();
    let mut has_static = false;
    let mut replaced = false;

    for node in nodes {
        let text = match node {
            Node::Text(text) => {
                has_static |= !text.trim().is_empty();
                output.push_str(text);
                continue;
            }
            Node::Replace { name, .. } => scope.lookup(name).unwrap_or_default().to_text(),
            Node::Chain(chain) => evaluate_chain(chain, scope, env).to_text(),
        };
        replaced |= !text.is_empty();
        output.push_str(&text);
    }

    if output.is_empty() || (!has_static && !replaced) {
        None
    } else {
        Some(output)
    }
}

fn evaluate_expr(expr: &Expr, scope: &dyn Scope) -> FilterValue {
    match expr {
        Expr::Str(s) => FilterValue::Str(s.clone()),
        Expr::Number(n) => FilterValue::Str(n.clone()),
        Expr::Bool(b) => FilterValue::Str(b.to_string()),
        Expr::Null => FilterValue::Null,
        Expr::Var(name) => scope.lookup(name).unwrap_or_default(),
    }
}

/// Run a filter chain left to right.
///
/// An unregistered name is looked up as a variable instead; a failing filter is logged
/// and makes the whole token null.
pub fn evaluate_chain(chain: &FilterChain, scope: &dyn Scope, env: &RenderEnv<'_>) -> FilterValue {
    let filter_env = FilterEnv { tables: env.tables };
    let mut value = evaluate_expr(&chain.seed, scope);

    for call in &chain.calls {
        if !env.filters.has_filter(&call.name) {
            tracing::debug!(token = %chain.source, name = %call.name, "Unknown filter, reading it as a variable");
            value = scope.lookup(&call.name).unwrap_or_default();
            continue;
        }

        let args: Vec<FilterValue> = call.args.iter().map(|arg| evaluate_expr(arg, scope)).collect();
        match env.filters.call(&call.name, value, &args, &filter_env) {
            Ok(next) => value = next,
            Err(err) => {
                log_filter_error(&chain.source, &err);
                return FilterValue::Null;
            }
        }
    }
    value
}

fn log_filter_error(token: &str, err: &FilterError) {
    tracing::warn!(token, error = %err, "Filter failed, token left empty");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::lexer::parse;

    fn scope(name: &str) -> Option<FilterValue> {
        match name {
            "value" => Some(FilterValue::str("  Foo  ")),
            "empty" => Some(FilterValue::str("")),
            "list" => Some(FilterValue::List(vec!["a".to_string(), "b".to_string()])),
            _ => None,
        }
    }

    fn render_str(pattern: &str) -> Option<String> {
        let registry = FilterRegistry::with_builtins();
        let tables = Tables::new();
        let env = RenderEnv { filters: &registry, tables: &tables };
        render(&parse(pattern).unwrap(), &scope, &env)
    }

    #[test]
    fn test_render_chain_and_text() {
        assert_eq!(render_str("Title: {{ value|trim|upper }}"), Some("Title: FOO".to_string()));
        assert_eq!(render_str("{{ list|join(' / ') }}"), Some("a / b".to_string()));
    }

    #[test]
    fn test_tokens_only_without_replacement_is_none() {
        assert_eq!(render_str("{{ missing }}"), None);
        assert_eq!(render_str("{{ empty }}{{ missing|upper }}"), None);
        assert_eq!(render_str("{{ empty }} {{ missing }}"), None);
    }

    #[test]
    fn test_static_text_is_kept_with_empty_expansion() {
        assert_eq!(render_str("n/a {{ missing }}"), Some("n/a ".to_string()));
    }

    #[test]
    fn test_unknown_filter_reads_variable() {
        assert_eq!(render_str("{{ missing|value|trim }}"), Some("Foo".to_string()));
    }

    #[test]
    fn test_failing_filter_leaves_token_empty() {
        assert_eq!(render_str("{{ value|slice('x') }}"), None);
        assert_eq!(render_str("[{{ value|slice('x') }}]"), Some("[]".to_string()));
    }
}

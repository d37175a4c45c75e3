//! Filter registry for the templating pipeline.
//!
//! Filters are pure functions registered by name. Each receives the output of the
//! previous filter (or the seed value), its parsed arguments and the lookup tables,
//! and returns a new value. Built-in filters live in [`crate::template::filters`];
//! callers can register their own on top.

use std::collections::HashMap;
use std::fmt;

use crate::template::tables::Tables;

/// Value flowing through a filter chain.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterValue {
    #[default]
    Null,
    Str(String),
    List(Vec<String>),
}

impl FilterValue {
    pub fn str(value: impl Into<String>) -> Self {
        FilterValue::Str(value.into())
    }

    /// Build from queried values: none is null, one is a string, more is a list.
    pub fn from_values(mut values: Vec<String>) -> Self {
        match values.len() {
            0 => FilterValue::Null,
            1 => FilterValue::Str(values.remove(0)),
            _ => FilterValue::List(values),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }

    /// Null, empty string or empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Null => true,
            FilterValue::Str(s) => s.is_empty(),
            FilterValue::List(items) => items.is_empty(),
        }
    }

    /// Rendered form; lists are joined with `", "`.
    pub fn to_text(&self) -> String {
        match self {
            FilterValue::Null => String::new(),
            FilterValue::Str(s) => s.clone(),
            FilterValue::List(items) => items.join(", "),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            FilterValue::Null => Vec::new(),
            FilterValue::Str(s) => vec![s],
            FilterValue::List(items) => items,
        }
    }

    /// Apply a string function to a string, or to each item of a list.
    pub fn map_str<F>(self, mut f: F) -> FilterValue
    where
        F: FnMut(&str) -> String,
    {
        match self {
            FilterValue::Null => FilterValue::Null,
            FilterValue::Str(s) => FilterValue::Str(f(&s)),
            FilterValue::List(items) => FilterValue::List(items.iter().map(|s| f(s)).collect()),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Str(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Str(value)
    }
}

/// Error type for filter operations
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    NotFound(String),
    InvalidArgs { filter: String, reason: String },
    ExecutionError(String),
}

impl FilterError {
    pub fn invalid_args(filter: &str, reason: impl Into<String>) -> Self {
        FilterError::InvalidArgs {
            filter: filter.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::NotFound(name) => write!(f, "Filter not found: {}", name),
            FilterError::InvalidArgs { filter, reason } => {
                write!(f, "Invalid arguments for filter '{}': {}", filter, reason)
            }
            FilterError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
        }
    }
}

impl std::error::Error for FilterError {}

/// Environment visible to filters during one rendering.
#[derive(Debug, Clone, Copy)]
pub struct FilterEnv<'a> {
    /// Lookup tables declared by the mapping.
    pub tables: &'a Tables,
}

/// Trait for filter functions
pub trait FilterFn: Send + Sync {
    /// Apply the filter to `input` with evaluated `args`.
    fn apply(
        &self,
        input: FilterValue,
        args: &[FilterValue],
        env: &FilterEnv<'_>,
    ) -> Result<FilterValue, FilterError>;
}

/// Simple function-based implementation of FilterFn
impl<F> FilterFn for F
where
    F: Fn(FilterValue, &[FilterValue], &FilterEnv<'_>) -> Result<FilterValue, FilterError> + Send + Sync,
{
    fn apply(
        &self,
        input: FilterValue,
        args: &[FilterValue],
        env: &FilterEnv<'_>,
    ) -> Result<FilterValue, FilterError> {
        self(input, args, env)
    }
}

/// Registry for storing and calling filters
pub struct FilterRegistry {
    filters: HashMap<String, Box<dyn FilterFn>>,
}

impl FilterRegistry {
    /// Create a new empty filter registry
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in filter
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::template::filters::register_builtins(&mut registry);
        registry
    }

    /// Register a filter, replacing any filter with the same name
    ///
    /// # Example
    ///
    /// ```
    /// use bulkmap::{FilterRegistry, FilterValue, FilterEnv, FilterError};
    ///
    /// fn shout(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> Result<FilterValue, FilterError> {
    ///     Ok(input.map_str(|s| format!("{}!", s.to_uppercase())))
    /// }
    ///
    /// let mut registry = FilterRegistry::new();
    /// registry.register("shout", Box::new(shout));
    /// assert!(registry.has_filter("shout"));
    /// ```
    pub fn register(&mut self, name: impl Into<String>, filter: Box<dyn FilterFn>) {
        self.filters.insert(name.into(), filter);
    }

    /// Call a registered filter
    ///
    /// # Returns
    ///
    /// * `Ok(FilterValue)` - Filter succeeded
    /// * `Err(FilterError::NotFound)` - No filter with that name
    pub fn call(
        &self,
        name: &str,
        input: FilterValue,
        args: &[FilterValue],
        env: &FilterEnv<'_>,
    ) -> Result<FilterValue, FilterError> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))?;

        filter.apply(input, args, env)
    }

    /// Check if a filter is registered
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Get list of all registered filter names, sorted
    pub fn list_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.filters.len()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

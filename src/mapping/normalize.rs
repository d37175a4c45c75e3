//! Entry normalization.
//!
//! Every mapping format produces raw [`MappingEntry`] values which are normalized here:
//! default sub-keys are filled, the source dialect prefix is split off, the destination
//! is checked and resolved against the property registry, and the pattern is reduced to
//! its simplest equivalent form. Normalizing twice gives the same entry.

use serde::Deserialize;
use serde_json::Value;

use crate::extraction::Querier;
use crate::mapping::registry::{is_property_term, PropertyRegistry};
use crate::mapping::types::{MapFrom, MapMod, MapTo, MappingEntry, MappingError};
use crate::template::{lexer, Template};

/// Parse a destination written as `field ^^datatype @language §visibility`.
pub fn parse_target(spec: &str) -> Result<MapTo, MappingError> {
    let mut to = MapTo::default();
    let mut field: Option<String> = None;

    for token in spec.split_whitespace() {
        if let Some(datatypes) = token.strip_prefix("^^") {
            let before = to.datatype.len();
            to.datatype.extend(
                datatypes
                    .split("^^")
                    .filter(|dt| !dt.is_empty())
                    .map(String::from),
            );
            if to.datatype.len() == before {
                return Err(MappingError::AmbiguousSyntax(format!("empty datatype in '{}'", spec)));
            }
        } else if let Some(language) = token.strip_prefix('@') {
            if to.language.is_some() || language.is_empty() {
                return Err(MappingError::AmbiguousSyntax(format!(
                    "expected one language in '{}'",
                    spec
                )));
            }
            to.language = Some(language.to_string());
        } else if let Some(visibility) = token.strip_prefix('§') {
            if to.is_public.is_some() {
                return Err(MappingError::AmbiguousSyntax(format!(
                    "expected one visibility in '{}'",
                    spec
                )));
            }
            to.is_public = Some(match visibility.to_lowercase().as_str() {
                "public" => true,
                "private" => false,
                other => {
                    return Err(MappingError::AmbiguousSyntax(format!(
                        "unknown visibility '{}' in '{}'",
                        other, spec
                    )));
                }
            });
        } else if field.is_none() {
            field = Some(token.to_string());
        } else {
            return Err(MappingError::AmbiguousSyntax(format!(
                "unexpected '{}' in '{}'",
                token, spec
            )));
        }
    }

    to.field = field.ok_or_else(|| MappingError::MissingDestination(spec.trim().to_string()))?;
    Ok(to)
}

/// Normalize one entry. Entries already flagged with an error are returned unchanged.
pub fn normalize_entry(mut entry: MappingEntry, registry: Option<&dyn PropertyRegistry>) -> MappingEntry {
    if entry.has_error.is_some() {
        return entry;
    }
    if let Err(err) = normalize_in_place(&mut entry, registry) {
        tracing::debug!(field = %entry.to.field, error = %err, "Mapping entry rejected");
        entry.has_error = Some(err.to_string());
    }
    entry
}

/// Normalize a list of entries.
pub fn normalize_map(entries: &[MappingEntry], registry: Option<&dyn PropertyRegistry>) -> Vec<MappingEntry> {
    entries
        .iter()
        .cloned()
        .map(|entry| normalize_entry(entry, registry))
        .collect()
}

fn normalize_in_place(entry: &mut MappingEntry, registry: Option<&dyn PropertyRegistry>) -> Result<(), MappingError> {
    if let Some(path) = entry.from.path.take() {
        let (prefix, rest) = Querier::split_prefix(path.trim());
        if let Some(querier) = prefix {
            entry.from.querier = querier;
        }
        let rest = rest.trim();
        entry.from.path = (!rest.is_empty()).then(|| rest.to_string());
    }

    let to = &mut entry.to;
    to.field = to.field.trim().to_string();
    if to.field.is_empty() {
        let context = entry.from.path.clone().unwrap_or_else(|| "default".to_string());
        return Err(MappingError::MissingDestination(context));
    }
    let mut datatypes: Vec<String> = Vec::with_capacity(to.datatype.len());
    for datatype in to.datatype.iter().map(|dt| dt.trim()).filter(|dt| !dt.is_empty()) {
        if !datatypes.iter().any(|existing| existing == datatype) {
            datatypes.push(datatype.to_string());
        }
    }
    to.datatype = datatypes;
    to.language = to
        .language
        .take()
        .map(|lang| lang.trim().to_string())
        .filter(|lang| !lang.is_empty());
    if is_property_term(&to.field) {
        if let Some(registry) = registry {
            let id = registry
                .property_id(&to.field)
                .ok_or_else(|| MappingError::UnknownProperty(to.field.clone()))?;
            to.property_id = Some(id);
        }
    }

    let field = to.field.clone();
    let has_source = entry.from.path.is_some();
    normalize_mod(&mut entry.modifier, &field, has_source)?;

    let m = &entry.modifier;
    if entry.from.path.is_none() && m.raw.is_none() && m.val.is_none() && m.pattern.is_none() {
        return Err(MappingError::NothingToMap(field));
    }
    Ok(())
}

/// A pattern wrapping `{{ value }}` becomes prepend/append only when the entry has a
/// source to query; default entries keep it as a pattern.
fn normalize_mod(m: &mut MapMod, field: &str, has_source: bool) -> Result<(), MappingError> {
    for slot in [&mut m.raw, &mut m.val, &mut m.pattern, &mut m.prepend, &mut m.append] {
        if slot.as_deref() == Some("") {
            *slot = None;
        }
    }

    let set = [m.raw.is_some(), m.val.is_some(), m.pattern.is_some()]
        .iter()
        .filter(|is_set| **is_set)
        .count();
    if set > 1 {
        return Err(MappingError::AmbiguousSyntax(format!(
            "'{}' sets more than one of raw, val and pattern",
            field
        )));
    }

    if let Some(pattern) = m.pattern.take() {
        if let Some(literal) = lexer::quoted_literal(&pattern) {
            m.raw = Some(literal);
        } else {
            let template = Template::parse(&pattern).map_err(|e| MappingError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            if !template.has_tokens() {
                m.val = Some(pattern);
            } else if let Some((prefix, suffix)) = template.value_wrapper().filter(|_| has_source) {
                m.prepend = concat(m.prepend.take(), prefix);
                m.append = concat(Some(suffix), m.append.take().unwrap_or_default());
            } else {
                m.replace = template.replacement_sources();
                m.filters = template.filter_sources();
                m.pattern = Some(pattern);
            }
        }
    }

    if m.pattern.is_none() {
        m.replace.clear();
        m.filters.clear();
    }
    Ok(())
}

fn concat(head: Option<String>, tail: String) -> Option<String> {
    let joined = format!("{}{}", head.unwrap_or_default(), tail);
    (!joined.is_empty()).then_some(joined)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FromShape {
    Path(String),
    Full {
        #[serde(default)]
        querier: Option<Querier>,
        #[serde(default)]
        path: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToShape {
    Spec(String),
    Full(MapTo),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModShape {
    Pattern(String),
    Full(MapMod),
}

#[derive(Deserialize)]
struct EntryShape {
    #[serde(default)]
    from: Option<FromShape>,
    #[serde(default)]
    to: Option<ToShape>,
    #[serde(default, rename = "mod")]
    modifier: Option<ModShape>,
}

/// Build and normalize an entry from its structured form.
///
/// `from` may be a path or `{querier, path}`, `to` a destination spec or a full
/// object, `mod` a pattern or a full object.
pub fn normalize_value(
    value: &Value,
    default_querier: Querier,
    registry: Option<&dyn PropertyRegistry>,
) -> MappingEntry {
    let shape: EntryShape = match serde_json::from_value(value.clone()) {
        Ok(shape) => shape,
        Err(e) => {
            let err = MappingError::InvalidStructure(e.to_string());
            return MappingEntry::default().with_error(&err);
        }
    };

    let mut entry = MappingEntry::default();
    entry.from = match shape.from {
        None => MapFrom {
            querier: default_querier,
            path: None,
        },
        Some(FromShape::Path(path)) => MapFrom {
            querier: default_querier,
            path: Some(path),
        },
        Some(FromShape::Full { querier, path }) => MapFrom {
            querier: querier.unwrap_or(default_querier),
            path,
        },
    };
    match shape.to {
        None => {}
        Some(ToShape::Full(to)) => entry.to = to,
        Some(ToShape::Spec(spec)) => match parse_target(&spec) {
            Ok(to) => entry.to = to,
            Err(err) => return entry.with_error(&err),
        },
    }
    entry.modifier = match shape.modifier {
        None => MapMod::default(),
        Some(ModShape::Pattern(pattern)) => MapMod {
            pattern: Some(pattern),
            ..MapMod::default()
        },
        Some(ModShape::Full(m)) => m,
    };

    normalize_entry(entry, registry)
}

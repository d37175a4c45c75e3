//! Ini-like mapping format.
//!
//! ```text
//! [info]
//! label = Books
//! querier = jmespath
//!
//! [params]
//! base = https://example.org
//!
//! [default]
//! dcterms:license ^^literal = "CC BY"
//! dcterms:source = ~ {{ params.base }}/books
//!
//! [maps]
//! id = o:id
//! title = dcterms:title @fra
//! jsonpath:$.creators[*] = dcterms:creator ^^literal
//! date = dcterms:date ^^numeric:timestamp ~ {{ value|date_iso }}
//!
//! [tables.types]
//! m = Manuscript
//! ```
//!
//! Map lines are `source = target ^^datatype @language §visibility ~ pattern`. Default
//! lines are `target ^^datatype @language §visibility = value`, where a quoted value is
//! emitted verbatim, `~ pattern` is a pattern and anything else is a plain value.
//! Quoted values take backslash escapes. A leading backslash on a default value or a map
//! pattern makes the rest a plain value, so `\~ 1` is the text `~ 1`.

use std::fmt::Write as _;

use crate::extraction::Querier;
use crate::mapping::normalize::parse_target;
use crate::mapping::types::{MapFrom, MapMod, MapTo, Mapping, MappingEntry, MappingError};
use crate::mapping::MappingDraft;
use crate::template::lexer;

#[derive(Debug, Clone, PartialEq)]
enum Section {
    Info,
    Params,
    Default,
    Maps,
    Table(String),
    Unknown(String),
}

impl Section {
    fn from_header(header: &str) -> Self {
        let header = header.trim();
        let lower = header.to_lowercase();
        match lower.as_str() {
            "info" => Section::Info,
            "params" => Section::Params,
            "default" => Section::Default,
            "maps" | "mapping" => Section::Maps,
            _ => match lower.split_once('.') {
                Some(("tables", _)) | Some(("table", _)) => {
                    let name = header.split_once('.').map(|(_, n)| n.trim()).unwrap_or_default();
                    Section::Table(name.to_string())
                }
                _ => Section::Unknown(header.to_string()),
            },
        }
    }
}

/// Parse an ini mapping into a draft; problems are recorded, never returned.
pub fn parse(text: &str) -> MappingDraft {
    let mut draft = MappingDraft::default();
    let mut lines: Vec<(Section, usize, &str)> = Vec::new();
    let mut current = Section::Maps;

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = Section::from_header(&line[1..line.len() - 1]);
            if let Section::Unknown(name) = &current {
                draft.errors.push(MappingError::UnknownSection(name.clone()));
            }
            continue;
        }
        lines.push((current.clone(), index + 1, line));
    }

    // Info comes first so the default querier is known before entries are read.
    for (_, line_no, line) in lines.iter().filter(|(s, _, _)| *s == Section::Info) {
        parse_info_line(&mut draft, *line_no, line);
    }

    let querier = draft.info.querier;
    for (section, line_no, line) in &lines {
        match section {
            Section::Info | Section::Unknown(_) => {}
            Section::Params => match split_key_value(line) {
                Some((key, value)) => {
                    draft.params.insert(key.to_string(), unquote(value));
                }
                None => draft.errors.push(missing_equal(*line_no)),
            },
            Section::Table(name) => match split_key_value(line) {
                Some((code, label)) => {
                    draft
                        .tables
                        .entry(name.clone())
                        .or_default()
                        .insert(code.to_string(), unquote(label));
                }
                None => draft.errors.push(missing_equal(*line_no)),
            },
            Section::Default => draft.default.push(parse_default_line(*line_no, line, querier)),
            Section::Maps => draft.maps.push(parse_map_line(*line_no, line, querier)),
        }
    }

    draft
}

fn missing_equal(line: usize) -> MappingError {
    MappingError::InvalidLine {
        line,
        reason: "expected 'key = value'".to_string(),
    }
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some((key, value.trim()))
}

/// Split an entry line on its assignment, preferring a spaced ` = `.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = line.split_once(" = ").or_else(|| line.split_once('='))?;
    Some((lhs.trim(), rhs.trim()))
}

fn unquote(value: &str) -> String {
    lexer::quoted_literal(value).unwrap_or_else(|| value.to_string())
}

fn parse_info_line(draft: &mut MappingDraft, line_no: usize, line: &str) {
    let Some((key, value)) = split_key_value(line) else {
        draft.errors.push(missing_equal(line_no));
        return;
    };
    let value = unquote(value);
    match key {
        "label" => draft.info.label = Some(value),
        "querier" => match Querier::from_name(&value) {
            Some(querier) => draft.info.querier = querier,
            None => draft.errors.push(MappingError::InvalidQuerier(value)),
        },
        "from" => draft.info.from = Some(value),
        "to" => draft.info.to = Some(value),
        "mapper" | "include" => draft.includes.push(value),
        other => {
            draft.info.extra.insert(other.to_string(), value);
        }
    }
}

fn invalid_entry(line: usize, reason: impl Into<String>) -> MappingEntry {
    MappingEntry::default().with_error(&MappingError::InvalidLine {
        line,
        reason: reason.into(),
    })
}

fn parse_default_line(line_no: usize, line: &str, querier: Querier) -> MappingEntry {
    let Some((target, value)) = split_assignment(line) else {
        return invalid_entry(line_no, "expected 'target = value'");
    };
    let to = match parse_target(target) {
        Ok(to) => to,
        Err(err) => return invalid_entry(line_no, err.to_string()),
    };

    let modifier = if let Some(literal) = lexer::quoted_literal(value) {
        MapMod {
            raw: Some(literal),
            ..MapMod::default()
        }
    } else if let Some(plain) = value.strip_prefix('\\') {
        MapMod {
            val: Some(plain.to_string()),
            ..MapMod::default()
        }
    } else if let Some(pattern) = value.strip_prefix('~') {
        MapMod {
            pattern: Some(pattern.trim().to_string()),
            ..MapMod::default()
        }
    } else {
        MapMod {
            val: Some(value.to_string()),
            ..MapMod::default()
        }
    };

    MappingEntry {
        from: MapFrom { querier, path: None },
        to,
        modifier,
        has_error: None,
    }
}

fn parse_map_line(line_no: usize, line: &str, querier: Querier) -> MappingEntry {
    let Some((source, rest)) = split_assignment(line) else {
        return invalid_entry(line_no, "expected 'source = target'");
    };
    let (target, pattern) = match rest.split_once('~') {
        Some((target, pattern)) => (target.trim(), Some(pattern.trim())),
        None => (rest, None),
    };
    let to = match parse_target(target) {
        Ok(to) => to,
        Err(err) => return invalid_entry(line_no, err.to_string()),
    };

    MappingEntry {
        from: MapFrom {
            querier,
            path: (!source.is_empty()).then(|| source.to_string()),
        },
        to,
        modifier: match pattern.filter(|p| !p.is_empty()) {
            Some(pattern) => match pattern.strip_prefix('\\') {
                Some(plain) => MapMod {
                    val: Some(plain.to_string()),
                    ..MapMod::default()
                },
                None => MapMod {
                    pattern: Some(pattern.to_string()),
                    ..MapMod::default()
                },
            },
            None => MapMod::default(),
        },
        has_error: None,
    }
}

/// Plain values that would read back as a quoted value, a pattern or an escape.
fn escape_plain(text: &str) -> String {
    if text.starts_with(&['~', '"', '\'', '\\'][..]) || text.contains("{{") {
        format!("\\{}", text)
    } else {
        text.to_string()
    }
}

fn target_spec(to: &MapTo) -> String {
    let mut spec = to.field.clone();
    for datatype in &to.datatype {
        let _ = write!(spec, " ^^{}", datatype);
    }
    if let Some(language) = &to.language {
        let _ = write!(spec, " @{}", language);
    }
    match to.is_public {
        Some(true) => spec.push_str(" §public"),
        Some(false) => spec.push_str(" §private"),
        None => {}
    }
    spec
}

impl MappingEntry {
    /// Render the entry in its short ini form.
    ///
    /// Re-parsing the line gives back an entry with the same destination and the same
    /// effective transformation.
    pub fn to_ini_line(&self) -> String {
        let target = target_spec(&self.to);
        let m = &self.modifier;

        match &self.from.path {
            Some(path) => {
                let source = match self.from.querier {
                    Querier::DotPath => path.clone(),
                    querier => format!("{}:{}", querier, path),
                };
                let pattern = if let Some(raw) = &m.raw {
                    Some(lexer::quote_literal(raw))
                } else if let Some(pattern) = &m.pattern {
                    Some(pattern.clone())
                } else if let Some(val) = &m.val {
                    Some(escape_plain(&format!(
                        "{}{}{}",
                        m.prepend.as_deref().unwrap_or_default(),
                        val,
                        m.append.as_deref().unwrap_or_default()
                    )))
                } else if m.prepend.is_some() || m.append.is_some() {
                    Some(format!(
                        "{}{{{{ value }}}}{}",
                        m.prepend.as_deref().unwrap_or_default(),
                        m.append.as_deref().unwrap_or_default()
                    ))
                } else {
                    None
                };
                match pattern {
                    Some(pattern) => format!("{} = {} ~ {}", source, target, pattern),
                    None => format!("{} = {}", source, target),
                }
            }
            None => {
                let value = if let Some(raw) = &m.raw {
                    lexer::quote_literal(raw)
                } else if let Some(pattern) = &m.pattern {
                    format!("~ {}", pattern)
                } else {
                    escape_plain(m.val.as_deref().unwrap_or_default())
                };
                format!("{} = {}", target, value)
            }
        }
    }
}

impl Mapping {
    /// Render the whole mapping in ini form.
    pub fn to_ini(&self) -> String {
        let mut out = String::new();

        let mut info: Vec<(String, String)> = Vec::new();
        if let Some(label) = &self.info.label {
            info.push(("label".to_string(), label.clone()));
        }
        if self.info.querier != Querier::DotPath {
            info.push(("querier".to_string(), self.info.querier.to_string()));
        }
        if let Some(from) = &self.info.from {
            info.push(("from".to_string(), from.clone()));
        }
        if let Some(to) = &self.info.to {
            info.push(("to".to_string(), to.clone()));
        }
        info.extend(self.info.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        write_section(&mut out, "info", info.iter().map(|(k, v)| format!("{} = {}", k, v)));

        write_section(
            &mut out,
            "params",
            self.params.iter().map(|(k, v)| format!("{} = {}", k, v)),
        );
        write_section(&mut out, "default", self.default.iter().map(|e| e.to_ini_line()));
        write_section(&mut out, "maps", self.maps.iter().map(|e| e.to_ini_line()));
        for (name, table) in &self.tables {
            write_section(
                &mut out,
                &format!("tables.{}", name),
                table.iter().map(|(code, label)| format!("{} = {}", code, label)),
            );
        }
        out
    }
}

fn write_section(out: &mut String, name: &str, lines: impl Iterator<Item = String>) {
    let mut lines = lines.peekable();
    if lines.peek().is_none() {
        return;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "[{}]", name);
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::normalize::normalize_entry;

    const BOOKS: &str = r#"
; Books
[info]
label = "Books"
querier = jmespath

[params]
base = https://example.org

[default]
dcterms:license ^^literal = "CC BY"
dcterms:source = ~ {{ params.base }}/books
dcterms:type = Text

[maps]
id = o:id
title = dcterms:title @fra §public
path:meta.year = dcterms:date ~ {{ value|date_iso }}

[tables.types]
m = Manuscript
"#;

    #[test]
    fn test_parse_sections() {
        let draft = parse(BOOKS);

        assert!(draft.errors.is_empty());
        assert_eq!(draft.info.label.as_deref(), Some("Books"));
        assert_eq!(draft.info.querier, Querier::JmesPath);
        assert_eq!(draft.params["base"], "https://example.org");
        assert_eq!(draft.tables["types"]["m"], "Manuscript");

        assert_eq!(draft.default.len(), 3);
        assert_eq!(draft.default[0].modifier.raw.as_deref(), Some("CC BY"));
        assert_eq!(draft.default[0].to.datatype, vec!["literal"]);
        assert_eq!(draft.default[1].modifier.pattern.as_deref(), Some("{{ params.base }}/books"));
        assert_eq!(draft.default[2].modifier.val.as_deref(), Some("Text"));

        assert_eq!(draft.maps.len(), 3);
        assert_eq!(draft.maps[0].from.querier, Querier::JmesPath);
        assert_eq!(draft.maps[1].to.language.as_deref(), Some("fra"));
        assert_eq!(draft.maps[1].to.is_public, Some(true));
        assert_eq!(draft.maps[2].from.path.as_deref(), Some("path:meta.year"));
        assert_eq!(draft.maps[2].modifier.pattern.as_deref(), Some("{{ value|date_iso }}"));
    }

    #[test]
    fn test_parse_problems() {
        let draft = parse("[unknown]\na = b\n[maps]\ntitle\nid = @fr @en\n");

        assert_eq!(draft.errors, vec![MappingError::UnknownSection("unknown".to_string())]);
        assert!(draft.maps[0].has_error.as_deref().unwrap().contains("line 4"));
        assert!(draft.maps[1].has_error.is_some());
    }

    #[test]
    fn test_include_and_extra_info() {
        let draft = parse("[info]\nmapper = base\nnote = kept\n");

        assert_eq!(draft.includes, vec!["base"]);
        assert_eq!(draft.info.extra["note"], "kept");
    }

    #[test]
    fn test_lines_without_section_are_maps() {
        let draft = parse("title = dcterms:title\n");
        assert_eq!(draft.maps.len(), 1);
    }

    #[test]
    fn test_ini_line_round_trip() {
        let entries = vec![
            MappingEntry::map("title", "dcterms:title").with_language("fra"),
            MappingEntry::map("creator[0]", "dcterms:creator")
                .with_querier(Querier::JmesPath)
                .with_datatype("literal"),
            MappingEntry::map("id", "dcterms:source").with_pattern("https://x.org/{{ value }}"),
            MappingEntry::map("date", "dcterms:date").with_pattern("{{ value|date('Y') }} ({{ label }})"),
            MappingEntry::map("kind", "dcterms:type").with_pattern("'Text'"),
            MappingEntry::constant("dcterms:license", "CC BY"),
            MappingEntry::constant("dcterms:rights", "it's \"free\""),
            MappingEntry::constant("dcterms:source", "C:\\books"),
            MappingEntry::constant("dcterms:note", "").with_val("~ not a pattern"),
            MappingEntry::constant("dcterms:note", "").with_val("\"quoted\""),
            MappingEntry::map("kind", "dcterms:type").with_val("'Text'"),
            MappingEntry::map("kind", "dcterms:type").with_val("{{ kept }}"),
        ];

        for entry in entries {
            let normalized = normalize_entry(entry, None);
            let line = normalized.to_ini_line();
            let section = if normalized.has_source() { "maps" } else { "default" };
            let draft = parse(&format!("[{}]\n{}\n", section, line));
            let reparsed = if normalized.has_source() { &draft.maps[0] } else { &draft.default[0] };
            let reparsed = normalize_entry(reparsed.clone(), None);

            assert_eq!(reparsed.to, normalized.to, "line: {}", line);
            assert_eq!(reparsed.modifier, normalized.modifier, "line: {}", line);
            assert_eq!(reparsed.from, normalized.from, "line: {}", line);
        }
    }

    #[test]
    fn test_mapping_to_ini() {
        let mut mapping = Mapping::default();
        mapping.info.label = Some("Books".to_string());
        mapping.default.push(MappingEntry::constant("dcterms:license", "CC BY"));
        mapping.maps.push(MappingEntry::map("title", "dcterms:title"));

        let ini = mapping.to_ini();
        assert_eq!(
            ini,
            "[info]\nlabel = Books\n\n[default]\ndcterms:license = \"CC BY\"\n\n[maps]\ntitle = dcterms:title\n"
        );
    }
}

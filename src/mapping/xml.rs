//! XML mapping format.
//!
//! ```xml
//! <mapping>
//!     <info><label>Books</label><querier>xpath</querier></info>
//!     <params><param name="base">https://example.org</param></params>
//!     <include mapping="common"/>
//!     <map>
//!         <from xpath="/record/title"/>
//!         <to field="dcterms:title" datatype="literal" language="fra"/>
//!     </map>
//!     <map>
//!         <to field="dcterms:license"/>
//!         <mod raw="CC BY"/>
//!     </map>
//!     <table code="types"><list><term code="m">Manuscript</term></list></table>
//! </mapping>
//! ```
//!
//! A `<map>` without a source goes to the default section.

use sxd_document::dom::Element;

use crate::extraction::{xml, Querier};
use crate::mapping::types::{MapTo, MappingEntry, MappingError};
use crate::mapping::MappingDraft;

const SOURCE_ATTRIBUTES: [Querier; 5] = [
    Querier::DotPath,
    Querier::JmesPath,
    Querier::JsonPath,
    Querier::XPath,
    Querier::Index,
];

/// Parse an XML mapping into a draft; problems are recorded, never returned.
pub fn parse(text: &str) -> MappingDraft {
    let mut draft = MappingDraft::default();

    let package = match xml::parse(text) {
        Ok(package) => package,
        Err(reason) => {
            draft.errors.push(MappingError::MalformedXml(reason));
            return draft;
        }
    };
    let document = package.as_document();
    let Some(root) = xml::root_element(&document) else {
        draft
            .errors
            .push(MappingError::MalformedXml("no root element".to_string()));
        return draft;
    };

    let children = xml::child_elements(root);
    for info in children.iter().filter(|child| xml::local_name(**child) == "info") {
        parse_info(&mut draft, *info);
    }

    let querier = draft.info.querier;
    for child in children {
        match xml::local_name(child) {
            "info" => {}
            "params" => parse_params(&mut draft, child),
            "include" => match child.attribute_value("mapping") {
                Some(name) if !name.trim().is_empty() => draft.includes.push(name.trim().to_string()),
                _ => draft.errors.push(MappingError::InvalidStructure(
                    "<include> requires a mapping attribute".to_string(),
                )),
            },
            "map" => {
                let entry = parse_map(child, querier);
                if entry.has_source() {
                    draft.maps.push(entry);
                } else {
                    draft.default.push(entry);
                }
            }
            "table" => parse_table(&mut draft, child),
            other => draft.errors.push(MappingError::UnknownElement(other.to_string())),
        }
    }

    draft
}

fn text_of(element: Element<'_>) -> String {
    xml::element_text(element).trim().to_string()
}

fn parse_info(draft: &mut MappingDraft, info: Element<'_>) {
    for child in xml::child_elements(info) {
        let value = text_of(child);
        match xml::local_name(child) {
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
}

fn parse_params(draft: &mut MappingDraft, params: Element<'_>) {
    for param in xml::child_elements(params) {
        match (xml::local_name(param), param.attribute_value("name")) {
            ("param", Some(name)) => {
                draft.params.insert(name.to_string(), text_of(param));
            }
            ("param", None) => draft.errors.push(MappingError::InvalidStructure(
                "<param> requires a name attribute".to_string(),
            )),
            (other, _) => draft.errors.push(MappingError::UnknownElement(other.to_string())),
        }
    }
}

fn parse_table(draft: &mut MappingDraft, table: Element<'_>) {
    let Some(name) = table
        .attribute_value("code")
        .or_else(|| table.attribute_value("name"))
    else {
        draft.errors.push(MappingError::InvalidStructure(
            "<table> requires a code attribute".to_string(),
        ));
        return;
    };

    let mut terms = Vec::new();
    for child in xml::child_elements(table) {
        match xml::local_name(child) {
            "term" => terms.push(child),
            "list" => terms.extend(
                xml::child_elements(child)
                    .into_iter()
                    .filter(|t| xml::local_name(*t) == "term"),
            ),
            _ => {}
        }
    }

    let entries = draft.tables.entry(name.to_string()).or_default();
    for term in terms {
        if let Some(code) = term.attribute_value("code") {
            entries.insert(code.to_string(), text_of(term));
        }
    }
}

fn parse_map(map: Element<'_>, querier: Querier) -> MappingEntry {
    let mut entry = MappingEntry::default();
    entry.from.querier = querier;

    for child in xml::child_elements(map) {
        match xml::local_name(child) {
            "from" => {
                let sources: Vec<(Querier, &str)> = SOURCE_ATTRIBUTES
                    .iter()
                    .filter_map(|q| child.attribute_value(q.as_str()).map(|path| (*q, path)))
                    .filter(|(_, path)| !path.trim().is_empty())
                    .collect();
                match sources.as_slice() {
                    [] => {}
                    [(querier, path)] => {
                        entry.from.querier = *querier;
                        entry.from.path = Some(path.to_string());
                    }
                    _ => {
                        return entry.with_error(&MappingError::AmbiguousSyntax(
                            "<from> with several source attributes".to_string(),
                        ));
                    }
                }
            }
            "to" => {
                let is_public = match child.attribute_value("visibility") {
                    None => None,
                    Some("public") => Some(true),
                    Some("private") => Some(false),
                    Some(other) => {
                        let err = MappingError::AmbiguousSyntax(format!("unknown visibility '{}'", other));
                        return entry.with_error(&err);
                    }
                };
                entry.to = MapTo {
                    field: child.attribute_value("field").unwrap_or_default().to_string(),
                    property_id: None,
                    datatype: child
                        .attribute_value("datatype")
                        .map(|dt| dt.split_whitespace().map(String::from).collect())
                        .unwrap_or_default(),
                    language: child.attribute_value("language").map(String::from),
                    is_public,
                };
            }
            "mod" => {
                let m = &mut entry.modifier;
                m.raw = child.attribute_value("raw").map(String::from);
                m.val = child.attribute_value("val").map(String::from);
                m.prepend = child.attribute_value("prepend").map(String::from);
                m.append = child.attribute_value("append").map(String::from);
                m.pattern = child.attribute_value("pattern").map(String::from);
                let text = text_of(child);
                if m.pattern.is_none() && !text.is_empty() {
                    m.pattern = Some(text);
                }
            }
            other => {
                return entry.with_error(&MappingError::UnknownElement(other.to_string()));
            }
        }
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOKS: &str = r#"<mapping>
        <info><label>Books</label><querier>xpath</querier><note>kept</note></info>
        <params><param name="base">https://example.org</param></params>
        <include mapping="common"/>
        <map>
            <from xpath="/record/title"/>
            <to field="dcterms:title" datatype="literal" language="fra" visibility="private"/>
        </map>
        <map>
            <from jmespath="creators[*].name"/>
            <to field="dcterms:creator"/>
            <mod>{{ value|upper }}</mod>
        </map>
        <map>
            <to field="dcterms:license"/>
            <mod raw="CC BY"/>
        </map>
        <table code="types"><label>Types</label><list><term code="m">Manuscript</term></list></table>
    </mapping>"#;

    #[test]
    fn test_parse_mapping() {
        let draft = parse(BOOKS);

        assert!(draft.errors.is_empty(), "{:?}", draft.errors);
        assert_eq!(draft.info.label.as_deref(), Some("Books"));
        assert_eq!(draft.info.querier, Querier::XPath);
        assert_eq!(draft.info.extra["note"], "kept");
        assert_eq!(draft.params["base"], "https://example.org");
        assert_eq!(draft.includes, vec!["common"]);
        assert_eq!(draft.tables["types"]["m"], "Manuscript");

        assert_eq!(draft.maps.len(), 2);
        let title = &draft.maps[0];
        assert_eq!(title.from.querier, Querier::XPath);
        assert_eq!(title.from.path.as_deref(), Some("/record/title"));
        assert_eq!(title.to.datatype, vec!["literal"]);
        assert_eq!(title.to.is_public, Some(false));
        let creator = &draft.maps[1];
        assert_eq!(creator.from.querier, Querier::JmesPath);
        assert_eq!(creator.modifier.pattern.as_deref(), Some("{{ value|upper }}"));

        assert_eq!(draft.default.len(), 1);
        assert_eq!(draft.default[0].modifier.raw.as_deref(), Some("CC BY"));
    }

    #[test]
    fn test_malformed_xml() {
        let draft = parse("<mapping><map></mapping>");
        assert!(matches!(draft.errors.as_slice(), [MappingError::MalformedXml(_)]));
    }

    #[test]
    fn test_unknown_elements() {
        let draft = parse("<mapping><section/><map><from path='a'/><to field='b'/><extra/></map></mapping>");

        assert_eq!(draft.errors, vec![MappingError::UnknownElement("section".to_string())]);
        assert_eq!(draft.maps[0].has_error.as_deref(), Some("Unknown element: <extra>"));
    }

    #[test]
    fn test_several_sources_are_ambiguous() {
        let draft = parse("<mapping><map><from path='a' xpath='/a'/><to field='b'/></map></mapping>");
        let entry = &draft.default[0];
        assert!(entry.has_error.as_deref().unwrap().starts_with("Ambiguous syntax"));
    }
}

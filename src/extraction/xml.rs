//! XML helpers shared by the XPath querier and the XML mapping reader.

use sxd_document::dom::{ChildOfElement, ChildOfRoot, Document, Element};
use sxd_document::Package;
use sxd_xpath::Value as XPathValue;

/// Parse XML text into a package.
pub fn parse(xml: &str) -> Result<Package, String> {
    sxd_document::parser::parse(xml).map_err(|e| format!("{:?}", e))
}

/// The document element of a parsed document.
pub fn root_element<'d>(document: &Document<'d>) -> Option<Element<'d>> {
    document.root().children().into_iter().find_map(|child| match child {
        ChildOfRoot::Element(element) => Some(element),
        _ => None,
    })
}

/// Direct child elements, in document order.
pub fn child_elements<'d>(element: Element<'d>) -> Vec<Element<'d>> {
    element
        .children()
        .into_iter()
        .filter_map(|child| match child {
            ChildOfElement::Element(e) => Some(e),
            _ => None,
        })
        .collect()
}

/// Concatenated text of an element and its descendants.
pub fn element_text(element: Element<'_>) -> String {
    let mut text = String::new();
    collect_text(element, &mut text);
    text
}

fn collect_text(element: Element<'_>, out: &mut String) {
    for child in element.children() {
        match child {
            ChildOfElement::Text(t) => out.push_str(t.text()),
            ChildOfElement::Element(e) => collect_text(e, out),
            _ => {}
        }
    }
}

pub fn local_name<'d>(element: Element<'d>) -> &'d str {
    element.name().local_part()
}

/// Evaluate an XPath expression against a document.
///
/// Location paths return the string value of each selected node in document order;
/// expressions built on functions (`substring(...)`, `count(...)`) yield one scalar.
pub fn evaluate(document: &Document<'_>, expression: &str) -> Result<Vec<String>, String> {
    let value = sxd_xpath::evaluate_xpath(document, expression).map_err(|e| e.to_string())?;

    let values = match value {
        XPathValue::Nodeset(nodes) => nodes
            .document_order()
            .into_iter()
            .map(|node| node.string_value())
            .filter(|s| !s.is_empty())
            .collect(),
        XPathValue::String(s) if s.is_empty() => Vec::new(),
        XPathValue::String(s) => vec![s],
        XPathValue::Number(n) => format_number(n).into_iter().collect(),
        XPathValue::Boolean(b) => vec![b.to_string()],
    };
    Ok(values)
}

fn format_number(n: f64) -> Option<String> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Some(format!("{}", n as i64))
    } else {
        Some(n.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = "<record><title>Foo</title><title>Bar</title><id>A1</id></record>";

    #[test]
    fn test_evaluate_location_path() {
        let package = parse(RECORD).unwrap();
        let document = package.as_document();

        let values = evaluate(&document, "/record/title").unwrap();
        assert_eq!(values, vec!["Foo", "Bar"]);
    }

    #[test]
    fn test_evaluate_function_falls_back_to_scalar() {
        let package = parse(RECORD).unwrap();
        let document = package.as_document();

        assert_eq!(evaluate(&document, "substring(/record/id, 2)").unwrap(), vec!["1"]);
        assert_eq!(evaluate(&document, "count(/record/title)").unwrap(), vec!["2"]);
    }

    #[test]
    fn test_evaluate_missing_path_is_empty() {
        let package = parse(RECORD).unwrap();
        let document = package.as_document();

        assert!(evaluate(&document, "/record/missing").unwrap().is_empty());
    }

    #[test]
    fn test_evaluate_malformed_expression() {
        let package = parse(RECORD).unwrap();
        let document = package.as_document();

        assert!(evaluate(&document, "/record/title[").is_err());
    }

    #[test]
    fn test_dom_helpers() {
        let package = parse(RECORD).unwrap();
        let document = package.as_document();
        let root = root_element(&document).unwrap();

        assert_eq!(local_name(root), "record");
        let children = child_elements(root);
        assert_eq!(children.len(), 3);
        assert_eq!(element_text(children[2]), "A1");
        assert_eq!(element_text(root), "FooBarA1");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse("<record><title>").is_err());
    }
}

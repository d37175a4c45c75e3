//! Lookup tables used by the `table` filter.
//!
//! Mappings declare their own `code -> label` tables; the ISO 639 language and
//! ISO 3166 country tables are always available under `iso639` / `languages` and
//! `iso3166` / `countries`.

use indexmap::IndexMap;

/// One lookup table: code to label.
pub type Table = IndexMap<String, String>;

/// Named lookup tables.
pub type Tables = IndexMap<String, Table>;

/// Either a mapping-declared table or a built-in one.
#[derive(Debug, Clone, Copy)]
pub enum TableRef<'a> {
    Declared(&'a Table),
    Builtin(&'static [(&'static str, &'static str)]),
}

impl<'a> TableRef<'a> {
    /// Label for a code, exact match first, then case-insensitive.
    pub fn label(&self, code: &str) -> Option<&'a str> {
        match *self {
            TableRef::Declared(table) => table.get(code).map(|s| s.as_str()).or_else(|| {
                table
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(code))
                    .map(|(_, v)| v.as_str())
            }),
            TableRef::Builtin(rows) => rows
                .iter()
                .find(|(k, _)| *k == code)
                .or_else(|| rows.iter().find(|(k, _)| k.eq_ignore_ascii_case(code)))
                .map(|(_, v)| *v),
        }
    }

    /// First code whose label matches, case-insensitively.
    pub fn code(&self, label: &str) -> Option<&'a str> {
        let wanted = label.to_lowercase();
        match *self {
            TableRef::Declared(table) => table
                .iter()
                .find(|(_, v)| v.to_lowercase() == wanted)
                .map(|(k, _)| k.as_str()),
            TableRef::Builtin(rows) => rows
                .iter()
                .find(|(_, v)| v.to_lowercase() == wanted)
                .map(|(k, _)| *k),
        }
    }
}

/// Find a table by name; declared tables shadow the built-in ones.
pub fn lookup<'a>(tables: &'a Tables, name: &str) -> Option<TableRef<'a>> {
    if let Some(table) = tables.get(name) {
        return Some(TableRef::Declared(table));
    }
    match name {
        "iso639" | "languages" => Some(TableRef::Builtin(ISO_639)),
        "iso3166" | "countries" => Some(TableRef::Builtin(ISO_3166)),
        _ => None,
    }
}

// Three-letter codes come first so reverse lookups return them.
static ISO_639: &[(&str, &str)] = &[
    ("ara", "Arabic"),
    ("bre", "Breton"),
    ("cat", "Catalan"),
    ("ces", "Czech"),
    ("cze", "Czech"),
    ("chi", "Chinese"),
    ("zho", "Chinese"),
    ("cym", "Welsh"),
    ("wel", "Welsh"),
    ("dan", "Danish"),
    ("deu", "German"),
    ("ger", "German"),
    ("ell", "Greek"),
    ("gre", "Greek"),
    ("eng", "English"),
    ("epo", "Esperanto"),
    ("eus", "Basque"),
    ("baq", "Basque"),
    ("fin", "Finnish"),
    ("fra", "French"),
    ("fre", "French"),
    ("frm", "French, Middle"),
    ("fro", "French, Old"),
    ("gle", "Irish"),
    ("grc", "Greek, Ancient"),
    ("heb", "Hebrew"),
    ("hun", "Hungarian"),
    ("ita", "Italian"),
    ("jpn", "Japanese"),
    ("kor", "Korean"),
    ("lat", "Latin"),
    ("nld", "Dutch"),
    ("dut", "Dutch"),
    ("nor", "Norwegian"),
    ("oci", "Occitan"),
    ("pol", "Polish"),
    ("por", "Portuguese"),
    ("ron", "Romanian"),
    ("rum", "Romanian"),
    ("rus", "Russian"),
    ("spa", "Spanish"),
    ("swe", "Swedish"),
    ("tur", "Turkish"),
    ("ukr", "Ukrainian"),
    ("ar", "Arabic"),
    ("br", "Breton"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("zh", "Chinese"),
    ("cy", "Welsh"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("eo", "Esperanto"),
    ("eu", "Basque"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("ga", "Irish"),
    ("he", "Hebrew"),
    ("hu", "Hungarian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("la", "Latin"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("oc", "Occitan"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("es", "Spanish"),
    ("sv", "Swedish"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
];

static ISO_3166: &[(&str, &str)] = &[
    ("ARG", "Argentina"),
    ("AUS", "Australia"),
    ("AUT", "Austria"),
    ("BEL", "Belgium"),
    ("BRA", "Brazil"),
    ("CAN", "Canada"),
    ("CHE", "Switzerland"),
    ("CHN", "China"),
    ("DEU", "Germany"),
    ("DNK", "Denmark"),
    ("DZA", "Algeria"),
    ("EGY", "Egypt"),
    ("ESP", "Spain"),
    ("FIN", "Finland"),
    ("FRA", "France"),
    ("GBR", "United Kingdom"),
    ("GRC", "Greece"),
    ("IND", "India"),
    ("IRL", "Ireland"),
    ("ITA", "Italy"),
    ("JPN", "Japan"),
    ("LUX", "Luxembourg"),
    ("MAR", "Morocco"),
    ("MEX", "Mexico"),
    ("NLD", "Netherlands"),
    ("NOR", "Norway"),
    ("POL", "Poland"),
    ("PRT", "Portugal"),
    ("ROU", "Romania"),
    ("RUS", "Russian Federation"),
    ("SEN", "Senegal"),
    ("SWE", "Sweden"),
    ("TUN", "Tunisia"),
    ("TUR", "Turkey"),
    ("USA", "United States"),
    ("VAT", "Holy See"),
    ("AR", "Argentina"),
    ("AU", "Australia"),
    ("AT", "Austria"),
    ("BE", "Belgium"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CN", "China"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("DZ", "Algeria"),
    ("EG", "Egypt"),
    ("ES", "Spain"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("GR", "Greece"),
    ("IN", "India"),
    ("IE", "Ireland"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("LU", "Luxembourg"),
    ("MA", "Morocco"),
    ("MX", "Mexico"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("RO", "Romania"),
    ("RU", "Russian Federation"),
    ("SN", "Senegal"),
    ("SE", "Sweden"),
    ("TN", "Tunisia"),
    ("TR", "Turkey"),
    ("US", "United States"),
    ("VA", "Holy See"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables() {
        let tables = Tables::new();

        let languages = lookup(&tables, "languages").unwrap();
        assert_eq!(languages.label("fre"), Some("French"));
        assert_eq!(languages.label("FR"), Some("French"));
        assert_eq!(languages.code("french"), Some("fra"));

        let countries = lookup(&tables, "iso3166").unwrap();
        assert_eq!(countries.label("fr"), Some("France"));
        assert_eq!(countries.code("Germany"), Some("DEU"));

        assert!(lookup(&tables, "missing").is_none());
    }

    #[test]
    fn test_declared_table_shadows_builtin() {
        let mut tables = Tables::new();
        let mut table = Table::new();
        table.insert("fre".to_string(), "Français".to_string());
        tables.insert("languages".to_string(), table);

        let languages = lookup(&tables, "languages").unwrap();
        assert_eq!(languages.label("fre"), Some("Français"));
        assert_eq!(languages.label("eng"), None);
        assert_eq!(languages.code("français"), Some("fre"));
    }
}

//! Built-in filters.
//!
//! Every filter accepts null, a string or a list. String filters are applied to each
//! item of a list; list filters (`join`, `first`, `last`, `length`) see the whole list.

use std::fmt::Write as _;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use convert_case::{Case, Casing};
use regex::Regex;

use crate::template::tables;
use crate::transform_registry::{FilterEnv, FilterError, FilterRegistry, FilterValue};

type FilterResult = Result<FilterValue, FilterError>;

/// Register every built-in filter on a registry.
pub fn register_builtins(registry: &mut FilterRegistry) {
    registry.register("lower", Box::new(lower));
    registry.register("upper", Box::new(upper));
    registry.register("capitalize", Box::new(capitalize));
    registry.register("title", Box::new(title));
    registry.register("case", Box::new(case));
    registry.register("slug", Box::new(slug));
    registry.register("trim", Box::new(trim));
    registry.register("striptags", Box::new(striptags));
    registry.register("escape", Box::new(escape));
    registry.register("e", Box::new(escape));
    registry.register("url_encode", Box::new(url_encode));
    registry.register("replace", Box::new(replace));
    registry.register("regex_replace", Box::new(regex_replace));
    registry.register("split", Box::new(split));
    registry.register("join", Box::new(join));
    registry.register("first", Box::new(first));
    registry.register("last", Box::new(last));
    registry.register("slice", Box::new(slice));
    registry.register("length", Box::new(length));
    registry.register("reverse", Box::new(reverse));
    registry.register("format", Box::new(format));
    registry.register("default", Box::new(default));
    registry.register("abs", Box::new(abs));
    registry.register("date", Box::new(date));
    registry.register("date_iso", Box::new(date_iso));
    registry.register("date_sql", Box::new(date_sql));
    registry.register("table", Box::new(table));
    registry.register("unimarc_coordinates", Box::new(unimarc_coordinates));
    registry.register("noid_check_bnf", Box::new(noid_check_bnf));
}

fn arg_text(args: &[FilterValue], index: usize) -> Option<String> {
    args.get(index).filter(|v| !v.is_null()).map(|v| v.to_text())
}

fn arg_int(filter: &str, args: &[FilterValue], index: usize) -> Result<Option<i64>, FilterError> {
    match arg_text(args, index) {
        None => Ok(None),
        Some(text) => text
            .trim()
            .parse::<f64>()
            .map(|n| Some(n as i64))
            .map_err(|_| FilterError::invalid_args(filter, format!("'{}' is not a number", text))),
    }
}

fn arg_bool(args: &[FilterValue], index: usize) -> bool {
    matches!(
        arg_text(args, index).as_deref().map(str::trim),
        Some("true") | Some("1") | Some("yes")
    )
}

// Case and text

fn lower(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|s| s.to_lowercase()))
}

fn upper(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|s| s.to_uppercase()))
}

fn capitalize_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

fn capitalize(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(capitalize_word))
}

fn title(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|s| {
        let mut out = String::with_capacity(s.len());
        let mut word_start = true;
        for c in s.chars() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = c.is_whitespace() || c == '-';
        }
        out
    }))
}

fn case(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    let name = arg_text(args, 0)
        .ok_or_else(|| FilterError::invalid_args("case", "expected a case name"))?;
    let case = match name.to_lowercase().as_str() {
        "snake" => Case::Snake,
        "camel" => Case::Camel,
        "pascal" => Case::Pascal,
        "kebab" => Case::Kebab,
        "title" => Case::Title,
        "upper" => Case::Upper,
        "lower" => Case::Lower,
        "constant" | "screaming_snake" => Case::ScreamingSnake,
        other => {
            return Err(FilterError::invalid_args("case", format!("unknown case '{}'", other)));
        }
    };
    Ok(input.map_str(|s| s.to_case(case)))
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase).map(fold_diacritic) {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

fn slug(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(slugify))
}

fn trim(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    match arg_text(args, 0) {
        Some(chars) => Ok(input.map_str(|s| s.trim_matches(|c| chars.contains(c)).to_string())),
        None => Ok(input.map_str(|s| s.trim().to_string())),
    }
}

fn striptags(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));
    Ok(input.map_str(|s| tags.replace_all(s, "").into_owned()))
}

fn escape(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|s| {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#039;")
    }))
}

fn url_encode(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|s| {
        url::form_urlencoded::byte_serialize(s.as_bytes())
            .collect::<String>()
            .replace('+', "%20")
    }))
}

fn replace(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(FilterError::invalid_args("replace", "expected search/replacement pairs"));
    }
    let pairs: Vec<(String, String)> = args
        .chunks(2)
        .map(|pair| (pair[0].to_text(), pair[1].to_text()))
        .filter(|(search, _)| !search.is_empty())
        .collect();
    Ok(input.map_str(|s| {
        pairs
            .iter()
            .fold(s.to_string(), |acc, (search, replacement)| acc.replace(search.as_str(), replacement))
    }))
}

fn regex_replace(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    let pattern = arg_text(args, 0)
        .ok_or_else(|| FilterError::invalid_args("regex_replace", "expected a pattern"))?;
    let replacement = arg_text(args, 1).unwrap_or_default();
    let regex = Regex::new(&pattern)
        .map_err(|e| FilterError::invalid_args("regex_replace", e.to_string()))?;
    Ok(input.map_str(|s| regex.replace_all(s, replacement.as_str()).into_owned()))
}

// Lists

fn split_one(text: &str, delimiter: &str, limit: Option<usize>) -> Vec<String> {
    if delimiter.is_empty() {
        return text.chars().map(String::from).collect();
    }
    match limit {
        Some(limit) if limit > 0 => text.splitn(limit, delimiter).map(String::from).collect(),
        _ => text.split(delimiter).map(String::from).collect(),
    }
}

fn split(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    let delimiter = arg_text(args, 0).unwrap_or_else(|| ",".to_string());
    let limit = arg_int("split", args, 1)?.map(|n| n.max(0) as usize);
    Ok(match input {
        FilterValue::Null => FilterValue::Null,
        FilterValue::Str(s) => FilterValue::List(split_one(&s, &delimiter, limit)),
        FilterValue::List(items) => FilterValue::List(
            items
                .iter()
                .flat_map(|s| split_one(s, &delimiter, limit))
                .collect(),
        ),
    })
}

fn join(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    let glue = arg_text(args, 0).unwrap_or_default();
    Ok(match input {
        FilterValue::List(items) => FilterValue::Str(items.join(&glue)),
        other => other,
    })
}

fn first(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(match input {
        FilterValue::Null => FilterValue::Null,
        FilterValue::Str(s) => s
            .chars()
            .next()
            .map(|c| FilterValue::Str(c.to_string()))
            .unwrap_or(FilterValue::Null),
        FilterValue::List(items) => items.into_iter().next().map(FilterValue::Str).unwrap_or_default(),
    })
}

fn last(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(match input {
        FilterValue::Null => FilterValue::Null,
        FilterValue::Str(s) => s
            .chars()
            .last()
            .map(|c| FilterValue::Str(c.to_string()))
            .unwrap_or(FilterValue::Null),
        FilterValue::List(items) => items.into_iter().last().map(FilterValue::Str).unwrap_or_default(),
    })
}

/// Resolve a `slice(start, length)` window; negative values count from the end.
fn slice_bounds(len: usize, start: i64, length: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let begin = if start < 0 { len.saturating_add(start).max(0) } else { start.min(len) };
    let end = match length {
        None => len,
        Some(l) if l < 0 => len.saturating_add(l).max(begin),
        Some(l) => begin.saturating_add(l).min(len),
    };
    (begin as usize, end.max(begin) as usize)
}

fn slice(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    let start = arg_int("slice", args, 0)?
        .ok_or_else(|| FilterError::invalid_args("slice", "expected a start offset"))?;
    let length = arg_int("slice", args, 1)?;
    Ok(match input {
        FilterValue::Null => FilterValue::Null,
        FilterValue::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (begin, end) = slice_bounds(chars.len(), start, length);
            FilterValue::Str(chars[begin..end].iter().collect())
        }
        FilterValue::List(items) => {
            let (begin, end) = slice_bounds(items.len(), start, length);
            FilterValue::List(items[begin..end].to_vec())
        }
    })
}

fn length(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    let count = match &input {
        FilterValue::Null => 0,
        FilterValue::Str(s) => s.chars().count(),
        FilterValue::List(items) => items.len(),
    };
    Ok(FilterValue::Str(count.to_string()))
}

fn reverse(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(match input {
        FilterValue::List(mut items) => {
            items.reverse();
            FilterValue::List(items)
        }
        other => other.map_str(|s| s.chars().rev().collect()),
    })
}

/// `"%s, %s"|format(a, b)`: the input is the format string.
fn format(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|fmt| {
        let mut out = String::with_capacity(fmt.len());
        let mut next_arg = args.iter();
        let mut chars = fmt.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                Some('s') | Some('d') => {
                    chars.next();
                    if let Some(arg) = next_arg.next() {
                        out.push_str(&arg.to_text());
                    }
                }
                _ => out.push('%'),
            }
        }
        out
    }))
}

fn default(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    if input.is_empty() {
        Ok(args.first().cloned().unwrap_or_default())
    } else {
        Ok(input)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn abs(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    let mut failed = None;
    let output = input.map_str(|s| match s.trim().parse::<f64>() {
        Ok(n) => format_number(n.abs()),
        Err(_) => {
            failed.get_or_insert_with(|| s.to_string());
            String::new()
        }
    });
    match failed {
        Some(text) => Err(FilterError::ExecutionError(format!("abs: '{}' is not a number", text))),
        None => Ok(output),
    }
}

// Dates

/// Digits-only dates: `YYYY`, `YYYYMM`, `YYYYMMDD`, then hours, minutes and seconds.
fn parse_compact(text: &str) -> Option<NaiveDateTime> {
    if !text.chars().all(|c| c.is_ascii_digit()) || ![4, 6, 8, 10, 12, 14].contains(&text.len()) {
        return None;
    }
    let part = |from: usize, default: u32| -> Option<u32> {
        match text.get(from..from + 2) {
            Some(p) => p.parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = text[..4].parse().ok()?;
    NaiveDate::from_ymd_opt(year, part(4, 1)?, part(6, 1)?)?.and_hms_opt(
        part(8, 0)?,
        part(10, 0)?,
        part(12, 0)?,
    )
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Some(dt) = parse_compact(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Translate a PHP-style date format (`Y-m-d`) to chrono's strftime syntax.
fn php_to_strftime(format: &str) -> String {
    if format.contains('%') {
        return format.to_string();
    }
    let mut out = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        let item = match c {
            'd' => "%d",
            'j' => "%-d",
            'D' => "%a",
            'l' => "%A",
            'N' => "%u",
            'm' => "%m",
            'n' => "%-m",
            'M' => "%b",
            'F' => "%B",
            'Y' => "%Y",
            'y' => "%y",
            'H' => "%H",
            'G' => "%-H",
            'h' => "%I",
            'g' => "%-I",
            'i' => "%M",
            's' => "%S",
            'A' => "%p",
            'a' => "%P",
            'U' => "%s",
            'c' => "%Y-%m-%dT%H:%M:%S",
            '\\' => {
                if let Some(literal) = chars.next() {
                    out.push(literal);
                }
                continue;
            }
            other => {
                out.push(other);
                continue;
            }
        };
        out.push_str(item);
    }
    out
}

fn format_datetime(filter: &str, dt: &NaiveDateTime, strftime: &str) -> Result<String, FilterError> {
    let mut out = String::new();
    write!(out, "{}", dt.format(strftime))
        .map_err(|_| FilterError::invalid_args(filter, format!("invalid date format '{}'", strftime)))?;
    Ok(out)
}

fn map_dates<F>(filter: &str, input: FilterValue, mut f: F) -> FilterResult
where
    F: FnMut(&str) -> Result<String, FilterError>,
{
    let mut error = None;
    let output = input.map_str(|s| match f(s) {
        Ok(text) => text,
        Err(e) => {
            error.get_or_insert(e);
            String::new()
        }
    });
    match error {
        Some(FilterError::ExecutionError(msg)) => {
            Err(FilterError::ExecutionError(format!("{}: {}", filter, msg)))
        }
        Some(e) => Err(e),
        None => Ok(output),
    }
}

fn date(input: FilterValue, args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    let strftime = php_to_strftime(&arg_text(args, 0).unwrap_or_else(|| "F j, Y H:i".to_string()));
    map_dates("date", input, |s| {
        let dt = parse_datetime(s)
            .ok_or_else(|| FilterError::ExecutionError(format!("cannot parse date '{}'", s)))?;
        format_datetime("date", &dt, &strftime)
    })
}

/// Compact digit dates to ISO 8601; anything else is only trimmed.
fn compact_to_iso(text: &str) -> Option<String> {
    let text = text.trim();
    if !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (y, rest) = (text.get(..4)?, &text[4..]);
    let piece = |i: usize| rest.get(i..i + 2).unwrap_or("");
    match text.len() {
        4 => Some(y.to_string()),
        6 => Some(format!("{}-{}", y, piece(0))),
        8 => Some(format!("{}-{}-{}", y, piece(0), piece(2))),
        10 => Some(format!("{}-{}-{}T{}", y, piece(0), piece(2), piece(4))),
        12 => Some(format!("{}-{}-{}T{}:{}", y, piece(0), piece(2), piece(4), piece(6))),
        14 => Some(format!(
            "{}-{}-{}T{}:{}:{}",
            y,
            piece(0),
            piece(2),
            piece(4),
            piece(6),
            piece(8)
        )),
        _ => None,
    }
}

fn date_iso(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|s| compact_to_iso(s).unwrap_or_else(|| s.trim().to_string())))
}

fn date_sql(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    map_dates("date_sql", input, |s| match parse_datetime(s) {
        Some(dt) => format_datetime("date_sql", &dt, "%Y-%m-%d %H:%M:%S"),
        None => Ok(s.trim().to_string()),
    })
}

// Lookups

/// `table(name[, 'label'|'code'[, strict]])`
///
/// With `label` (the default) a code is replaced by its label; with `code` a label is
/// replaced by its code. Unmatched values pass through unless `strict` is set.
fn table(input: FilterValue, args: &[FilterValue], env: &FilterEnv<'_>) -> FilterResult {
    let name = arg_text(args, 0)
        .ok_or_else(|| FilterError::invalid_args("table", "expected a table name"))?;
    let table = tables::lookup(env.tables, &name)
        .ok_or_else(|| FilterError::invalid_args("table", format!("unknown table '{}'", name)))?;
    let to_label = match arg_text(args, 1).as_deref() {
        None | Some("label") => true,
        Some("code") => false,
        Some(other) => {
            return Err(FilterError::invalid_args("table", format!("unknown mode '{}'", other)));
        }
    };
    let strict = arg_bool(args, 2);

    let convert = |s: &str| -> Option<String> {
        let found = if to_label { table.label(s.trim()) } else { table.code(s.trim()) };
        match found {
            Some(v) => Some(v.to_string()),
            None if strict => None,
            None => Some(s.to_string()),
        }
    };

    Ok(match input {
        FilterValue::Null => FilterValue::Null,
        FilterValue::Str(s) => convert(&s).map(FilterValue::Str).unwrap_or_default(),
        FilterValue::List(items) => FilterValue::List(items.iter().filter_map(|s| convert(s)).collect()),
    })
}

// Bibliographic

/// UNIMARC 123 coordinates (`hDDDMMSS`) to signed decimal degrees.
fn decode_unimarc_coordinate(text: &str) -> Option<String> {
    static COORD: OnceLock<Regex> = OnceLock::new();
    let re = COORD.get_or_init(|| {
        Regex::new(r"^([EWNS+-])(\d{3})(\d{2})(\d{2})$").expect("coordinate pattern is valid")
    });
    let caps = re.captures(text.trim())?;
    let degrees: f64 = caps[2].parse().ok()?;
    let minutes: f64 = caps[3].parse().ok()?;
    let seconds: f64 = caps[4].parse().ok()?;
    let mut decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if matches!(&caps[1], "W" | "S" | "-") {
        decimal = -decimal;
    }
    Some(format!("{:.6}", decimal))
}

fn unimarc_coordinates(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|s| decode_unimarc_coordinate(s).unwrap_or_else(|| s.to_string())))
}

const NOID_ALPHABET: &str = "0123456789bcdfghjkmnpqrstvwxz";
const BNF_NAAN: &str = "ark:/12148/";
const BNF_CATALOGUE: &str = "https://catalogue.bnf.fr/";

/// NOID check character: position-weighted sum of ordinals, modulo the alphabet size.
pub fn noid_check_char(text: &str) -> char {
    let alphabet: Vec<char> = NOID_ALPHABET.chars().collect();
    let sum: usize = text
        .chars()
        .enumerate()
        .map(|(i, c)| (i + 1) * alphabet.iter().position(|&a| a == c).unwrap_or(0))
        .sum();
    alphabet[sum % alphabet.len()]
}

/// Full catalogue URI for a BnF record number, adding the check character when absent.
fn bnf_ark(text: &str) -> Option<String> {
    let text = text.trim();
    let tail = text.rsplit(BNF_NAAN).next().unwrap_or(text);
    let id = if tail.starts_with("cb") {
        tail.to_string()
    } else if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
        format!("cb{}", tail)
    } else {
        return None;
    };

    let body = &id[2..];
    let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
    let ark = match (body.len(), digits) {
        (8, 8) => {
            let base = format!("{}{}", BNF_NAAN, id);
            let check = noid_check_char(&base);
            format!("{}{}", base, check)
        }
        (9, d) if d >= 8 && body.chars().last().is_some_and(|c| NOID_ALPHABET.contains(c)) => {
            format!("{}{}", BNF_NAAN, id)
        }
        _ => return None,
    };
    Some(format!("{}{}", BNF_CATALOGUE, ark))
}

fn noid_check_bnf(input: FilterValue, _args: &[FilterValue], _env: &FilterEnv<'_>) -> FilterResult {
    Ok(input.map_str(|s| bnf_ark(s).unwrap_or_else(|| s.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::tables::{Table, Tables};

    fn run(name: &str, input: FilterValue, args: &[FilterValue]) -> FilterResult {
        let registry = FilterRegistry::with_builtins();
        let tables = Tables::new();
        let env = FilterEnv { tables: &tables };
        registry.call(name, input, args, &env)
    }

    fn s(text: &str) -> FilterValue {
        FilterValue::str(text)
    }

    fn list(items: &[&str]) -> FilterValue {
        FilterValue::List(items.iter().map(|i| i.to_string()).collect())
    }

    #[test]
    fn test_case_filters() {
        assert_eq!(run("upper", s("abc"), &[]).unwrap(), s("ABC"));
        assert_eq!(run("capitalize", s("hELLO world"), &[]).unwrap(), s("Hello world"));
        assert_eq!(run("title", s("the old man"), &[]).unwrap(), s("The Old Man"));
        assert_eq!(run("case", s("Old Man"), &[s("snake")]).unwrap(), s("old_man"));
        assert!(run("case", s("x"), &[s("weird")]).is_err());
        assert_eq!(run("slug", s("Éléments de l'art"), &[]).unwrap(), s("elements-de-l-art"));
    }

    #[test]
    fn test_text_filters() {
        assert_eq!(run("trim", s("  a  "), &[]).unwrap(), s("a"));
        assert_eq!(run("trim", s("--a-"), &[s("-")]).unwrap(), s("a"));
        assert_eq!(run("striptags", s("<b>bold</b> text"), &[]).unwrap(), s("bold text"));
        assert_eq!(run("e", s("a<b & 'c'"), &[]).unwrap(), s("a&lt;b &amp; &#039;c&#039;"));
        assert_eq!(run("url_encode", s("a b/c"), &[]).unwrap(), s("a%20b%2Fc"));
        assert_eq!(run("replace", s("a-b-c"), &[s("-"), s("+")]).unwrap(), s("a+b+c"));
        assert!(run("replace", s("a"), &[s("-")]).is_err());
        assert_eq!(
            run("regex_replace", s("2020-01"), &[s(r"(\d+)-(\d+)"), s("$2/$1")]).unwrap(),
            s("01/2020")
        );
        assert!(run("regex_replace", s("x"), &[s("(")]).is_err());
    }

    #[test]
    fn test_list_filters() {
        let parts = run("split", s("a;b;c"), &[s(";")]).unwrap();
        assert_eq!(parts, list(&["a", "b", "c"]));
        assert_eq!(run("join", parts.clone(), &[s("|")]).unwrap(), s("a|b|c"));
        assert_eq!(run("first", parts.clone(), &[]).unwrap(), s("a"));
        assert_eq!(run("last", parts.clone(), &[]).unwrap(), s("c"));
        assert_eq!(run("length", parts.clone(), &[]).unwrap(), s("3"));
        assert_eq!(run("reverse", parts, &[]).unwrap(), list(&["c", "b", "a"]));
        assert_eq!(run("split", s("a;b;c"), &[s(";"), s("2")]).unwrap(), list(&["a", "b;c"]));
        assert_eq!(run("first", s("abc"), &[]).unwrap(), s("a"));
        assert_eq!(run("length", FilterValue::Null, &[]).unwrap(), s("0"));
    }

    #[test]
    fn test_slice() {
        assert_eq!(run("slice", s("abcdef"), &[s("1"), s("3")]).unwrap(), s("bcd"));
        assert_eq!(run("slice", s("abcdef"), &[s("-2")]).unwrap(), s("ef"));
        assert_eq!(run("slice", s("abc"), &[s("5")]).unwrap(), s(""));
        assert_eq!(run("slice", list(&["a", "b", "c"]), &[s("0"), s("-1")]).unwrap(), list(&["a", "b"]));
        assert!(run("slice", s("abc"), &[]).is_err());
        assert_eq!(run("slice", s("abc"), &[s("1"), s("99999999999999999999")]).unwrap(), s("bc"));
        assert_eq!(run("slice", s("abc"), &[s("-99999999999999999999")]).unwrap(), s("abc"));
        assert_eq!(run("slice", s("abc"), &[s("0"), s("-99999999999999999999")]).unwrap(), s(""));
    }

    #[test]
    fn test_format_default_abs() {
        assert_eq!(run("format", s("%s (%d%%)"), &[s("a"), s("5")]).unwrap(), s("a (5%)"));
        assert_eq!(run("default", FilterValue::Null, &[s("none")]).unwrap(), s("none"));
        assert_eq!(run("default", s("x"), &[s("none")]).unwrap(), s("x"));
        assert_eq!(run("abs", s("-3"), &[]).unwrap(), s("3"));
        assert_eq!(run("abs", s("-2.5"), &[]).unwrap(), s("2.5"));
        assert!(run("abs", s("abc"), &[]).is_err());
    }

    #[test]
    fn test_date_filters() {
        assert_eq!(run("date", s("1999-03-15"), &[s("Y")]).unwrap(), s("1999"));
        assert_eq!(run("date", s("19990315"), &[s("d/m/Y")]).unwrap(), s("15/03/1999"));
        assert!(run("date", s("not a date"), &[s("Y")]).is_err());
        assert_eq!(run("date_iso", s("19990315103045"), &[]).unwrap(), s("1999-03-15T10:30:45"));
        assert_eq!(run("date_iso", s("199903"), &[]).unwrap(), s("1999-03"));
        assert_eq!(run("date_iso", s(" circa 1900 "), &[]).unwrap(), s("circa 1900"));
        assert_eq!(run("date_sql", s("19990315"), &[]).unwrap(), s("1999-03-15 00:00:00"));
        assert_eq!(run("date_sql", s("2001-02-03T04:05:06Z"), &[]).unwrap(), s("2001-02-03 04:05:06"));
    }

    #[test]
    fn test_table_filter() {
        let registry = FilterRegistry::with_builtins();
        let mut tables = Tables::new();
        let mut table = Table::new();
        table.insert("m".to_string(), "Manuscript".to_string());
        table.insert("p".to_string(), "Print".to_string());
        tables.insert("types".to_string(), table);
        let env = FilterEnv { tables: &tables };

        let label = registry.call("table", s("m"), &[s("types")], &env).unwrap();
        assert_eq!(label, s("Manuscript"));
        let code = registry.call("table", s("print"), &[s("types"), s("code")], &env).unwrap();
        assert_eq!(code, s("p"));
        let passthrough = registry.call("table", s("x"), &[s("types")], &env).unwrap();
        assert_eq!(passthrough, s("x"));
        let strict = registry
            .call("table", s("x"), &[s("types"), s("label"), s("true")], &env)
            .unwrap();
        assert_eq!(strict, FilterValue::Null);
        let language = registry.call("table", s("fre"), &[s("iso639")], &env).unwrap();
        assert_eq!(language, s("French"));
        assert!(registry.call("table", s("m"), &[s("nope")], &env).is_err());
    }

    #[test]
    fn test_bibliographic_filters() {
        assert_eq!(run("unimarc_coordinates", s("E0022200"), &[]).unwrap(), s("2.366667"));
        assert_eq!(run("unimarc_coordinates", s("W0013000"), &[]).unwrap(), s("-1.500000"));
        assert_eq!(run("unimarc_coordinates", s("garbage"), &[]).unwrap(), s("garbage"));

        let expected = "https://catalogue.bnf.fr/ark:/12148/cb11907966z";
        assert_eq!(run("noid_check_bnf", s("cb11907966"), &[]).unwrap(), s(expected));
        assert_eq!(run("noid_check_bnf", s("11907966"), &[]).unwrap(), s(expected));
        assert_eq!(run("noid_check_bnf", s("ark:/12148/cb11907966z"), &[]).unwrap(), s(expected));
        assert_eq!(run("noid_check_bnf", s("unknown"), &[]).unwrap(), s("unknown"));
    }
}

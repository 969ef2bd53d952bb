//! Delimited text tables supplied next to the config.
//!
//! Each table is a list of `;`-separated records. Blank lines and lines
//! starting with `#` are ignored; surrounding whitespace is trimmed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};

/// All three tables, already parsed.
#[derive(Debug, Default, Clone)]
pub struct Tables {
    /// Native name → managed name.
    pub name_overrides: BTreeMap<String, String>,
    pub bool_params: BoolParams,
    /// Native struct names implemented by the client.
    pub handlers: BTreeSet<String>,
}

impl Tables {
    /// Load whichever tables are configured; missing entries stay empty.
    pub fn load(
        name_overrides: Option<&Path>,
        bool_params: Option<&Path>,
        handlers: Option<&Path>,
    ) -> Result<Self> {
        let mut tables = Tables::default();
        if let Some(path) = name_overrides {
            tables.name_overrides = parse_name_overrides(&read(path)?)
                .with_context(|| format!("parsing {}", path.display()))?;
        }
        if let Some(path) = bool_params {
            tables.bool_params = BoolParams::parse(&read(path)?)
                .with_context(|| format!("parsing {}", path.display()))?;
        }
        if let Some(path) = handlers {
            tables.handlers = parse_handlers(&read(path)?);
        }
        Ok(tables)
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading table {}", path.display()))
}

/// Split a table into trimmed records, skipping comments.
fn records(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        Some((i + 1, line.split(';').map(str::trim).collect()))
    })
}

pub fn parse_name_overrides(text: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for (line, cols) in records(text) {
        match cols.as_slice() {
            [native, managed] if !native.is_empty() && !managed.is_empty() => {
                map.insert(native.to_string(), managed.to_string());
            }
            _ => anyhow::bail!("line {line}: expected `native;Managed`"),
        }
    }
    Ok(map)
}

pub fn parse_handlers(text: &str) -> BTreeSet<String> {
    records(text)
        .filter_map(|(_, cols)| cols.first().map(|c| c.to_string()))
        .filter(|c| !c.is_empty())
        .collect()
}

/// Integer parameters (and returns) that carry a boolean.
#[derive(Debug, Default, Clone)]
pub struct BoolParams {
    entries: Vec<BoolParamEntry>,
}

#[derive(Debug, Clone)]
struct BoolParamEntry {
    owner: Pattern,
    method: Pattern,
    param: Pattern,
}

#[derive(Debug, Clone)]
enum Pattern {
    Any,
    Exact(String),
}

impl Pattern {
    fn parse(s: &str) -> Self {
        if s == "*" {
            Pattern::Any
        } else {
            Pattern::Exact(s.to_string())
        }
    }

    fn matches(&self, s: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(e) => e == s,
        }
    }
}

/// Parameter name used in the table for a return value.
pub const RETURN_VALUE: &str = "return";

impl BoolParams {
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (line, cols) in records(text) {
            let [owner, method, param] = cols.as_slice() else {
                anyhow::bail!("line {line}: expected `type;method;param`");
            };
            entries.push(BoolParamEntry {
                owner: Pattern::parse(owner),
                method: Pattern::parse(method),
                param: Pattern::parse(param),
            });
        }
        Ok(Self { entries })
    }

    /// Whether `param` of `owner::method` is a boolean. Use
    /// [`RETURN_VALUE`] for the return value.
    pub fn contains(&self, owner: &str, method: &str, param: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.owner.matches(owner) && e.method.matches(method) && e.param.matches(param))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_overrides_skip_comments() {
        let map = parse_name_overrides("# header\n\ncef_urlrequest_t; CefUrlRequest\n").unwrap();
        assert_eq!(map.get("cef_urlrequest_t").map(String::as_str), Some("CefUrlRequest"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn name_overrides_reject_short_records() {
        assert!(parse_name_overrides("lonely\n").is_err());
    }

    #[test]
    fn bool_params_wildcards() {
        let table = BoolParams::parse("*;on_load_end;is_main\ncef_frame_t;*;return\n").unwrap();
        assert!(table.contains("cef_load_handler_t", "on_load_end", "is_main"));
        assert!(table.contains("cef_frame_t", "anything", RETURN_VALUE));
        assert!(!table.contains("cef_frame_t", "anything", "flag"));
    }
}

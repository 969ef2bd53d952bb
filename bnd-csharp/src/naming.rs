//! Naming normalization between native `snake_case` and managed names.

use std::collections::BTreeMap;

/// C# keywords that must be escaped with `@` when used as identifiers.
const CSHARP_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

/// Escape `name` if it collides with a C# keyword.
pub fn escape_identifier(name: &str) -> String {
    if CSHARP_KEYWORDS.contains(&name) {
        format!("@{name}")
    } else {
        name.to_string()
    }
}

/// `on_before_close` → `OnBeforeClose`, `RGBA_8888` → `Rgba8888`,
/// `identifiersCount` → `IdentifiersCount`.
pub fn pascal_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for segment in name.split('_').filter(|s| !s.is_empty()) {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            let rest = chars.as_str();
            // Mixed-case segments keep their humps.
            if segment.chars().any(|c| c.is_ascii_lowercase()) {
                out.push_str(rest);
            } else {
                out.push_str(&rest.to_lowercase());
            }
        }
    }
    out
}

/// `process_type` → `processType`.
pub fn camel_case(name: &str) -> String {
    let pascal = pascal_case(name);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A managed parameter name, escaped when needed.
pub fn parameter_name(native: &str) -> String {
    escape_identifier(&camel_case(native))
}

/// Translates native names into managed names, honoring the override table.
#[derive(Debug, Default, Clone)]
pub struct NameTranslator {
    overrides: BTreeMap<String, String>,
    type_suffix: String,
}

impl NameTranslator {
    pub fn new(overrides: BTreeMap<String, String>, type_suffix: impl Into<String>) -> Self {
        Self {
            overrides,
            type_suffix: type_suffix.into(),
        }
    }

    /// `cef_browser_host_t` → `CefBrowserHost`.
    pub fn type_name(&self, native: &str) -> String {
        if let Some(name) = self.overrides.get(native) {
            return name.clone();
        }
        let stem = native.strip_suffix(self.type_suffix.as_str()).unwrap_or(native);
        pascal_case(stem)
    }

    /// `get_main_frame` → `GetMainFrame`, or the override for
    /// `owner::member` / `member`.
    pub fn member_name(&self, owner: &str, native: &str) -> String {
        if let Some(name) = self.overrides.get(&format!("{owner}::{native}")) {
            return name.clone();
        }
        if let Some(name) = self.overrides.get(native) {
            return name.clone();
        }
        pascal_case(native)
    }

    /// Whether an explicit override exists for `native`.
    pub fn has_override(&self, native: &str) -> bool {
        self.overrides.contains_key(native)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_and_camel() {
        assert_eq!(pascal_case("on_before_close"), "OnBeforeClose");
        assert_eq!(pascal_case("RGBA_8888"), "Rgba8888");
        assert_eq!(camel_case("process_type"), "processType");
        assert_eq!(camel_case("identifiersCount"), "identifiersCount");
        assert_eq!(parameter_name("base"), "@base");
    }

    #[test]
    fn type_names_strip_suffix_and_honor_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("cef_urlrequest_t".to_string(), "CefUrlRequest".to_string());
        let names = NameTranslator::new(overrides, "_t");
        assert_eq!(names.type_name("cef_browser_host_t"), "CefBrowserHost");
        assert_eq!(names.type_name("cef_urlrequest_t"), "CefUrlRequest");
    }
}

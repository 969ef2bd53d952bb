//! Alias resolution — raw native spellings to canonical binding names.
//!
//! Built once from the header model, then read-only.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::Conventions;
use crate::error::shape_bail;
use crate::model::{CType, HeaderModel};
use crate::naming::NameTranslator;

/// Maps a native type name to the name the bindings use for it.
///
/// Passed explicitly to every emitter that spells native type names.
pub trait TypeNameResolver {
    fn resolve(&self, name: &str) -> Option<&str>;

    /// [`resolve`](Self::resolve), passing unresolved names through.
    fn resolve_or_identity<'a>(&'a self, name: &'a str) -> &'a str {
        self.resolve(name).unwrap_or(name)
    }
}

/// The alias tables of one run.
#[derive(Debug, Default, Clone)]
pub struct AliasResolver {
    /// `_cef_app_t` → `cef_app_t`, plus the reversed platform typedefs.
    typedefs: BTreeMap<String, String>,
    /// `cef_color_type_t` → `CefColorType`.
    enums: BTreeMap<String, String>,
}

impl AliasResolver {
    pub fn build(
        model: &HeaderModel,
        conventions: &Conventions,
        names: &NameTranslator,
    ) -> Result<Self> {
        let mut typedefs = BTreeMap::new();
        for td in model.typedefs() {
            let spelling = strip_elaborated(&td.aliased_spelling);
            if conventions.platform_typedefs.iter().any(|p| p == &td.name) {
                // Platform-dependent spelling: refer to the underlying type
                // rather than to a typedef that differs per platform.
                debug!(typedef = %td.name, spelling, "platform typedef");
                typedefs.insert(td.name.clone(), spelling.to_string());
            } else if !conventions.reserved_prefix.is_empty()
                && spelling.starts_with(conventions.reserved_prefix.as_str())
            {
                debug!(spelling, typedef = %td.name, "reserved spelling");
                typedefs.insert(spelling.to_string(), td.name.clone());
            }
        }

        let mut enums = BTreeMap::new();
        for en in model.enums() {
            let Some(stem) = en.name.strip_suffix(conventions.enum_suffix.as_str()) else {
                shape_bail!(
                    &en.name,
                    "enum name must end with `{}`",
                    conventions.enum_suffix
                );
            };
            let managed = if names.has_override(&en.name) {
                names.type_name(&en.name)
            } else {
                crate::naming::pascal_case(stem)
            };
            enums.insert(en.name.clone(), managed);
        }

        info!(
            typedefs = typedefs.len(),
            enums = enums.len(),
            "built alias tables"
        );
        Ok(Self { typedefs, enums })
    }

    /// Managed name of an enum, if `name` is one.
    pub fn enum_name(&self, name: &str) -> Option<&str> {
        self.enums.get(name).map(String::as_str)
    }

    pub fn enums(&self) -> impl Iterator<Item = (&str, &str)> {
        self.enums.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolve the name behind a `CType::Named`, if the type is one.
    pub fn resolve_type_name<'a>(&'a self, ty: &'a CType) -> Option<&'a str> {
        ty.name().map(|n| self.resolve_or_identity(n))
    }
}

impl TypeNameResolver for AliasResolver {
    fn resolve(&self, name: &str) -> Option<&str> {
        self.typedefs
            .get(name)
            .or_else(|| self.enums.get(name))
            .map(String::as_str)
    }
}

/// `struct _cef_app_t` → `_cef_app_t`.
pub fn strip_elaborated(spelling: &str) -> &str {
    let spelling = spelling.trim();
    for keyword in ["struct ", "union ", "enum "] {
        if let Some(rest) = spelling.strip_prefix(keyword) {
            return rest.trim();
        }
    }
    spelling
}

//! Enum emission with common-prefix trimming.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::debug;

use crate::context::PipelineContext;
use crate::error::shape_bail;
use crate::ir::{CodeFile, EnumItem as IrItem, Member, Modifiers, Namespace, TypeDecl, TypeKind, TypeRef};
use crate::model::{CType, EnumDecl};
use crate::naming::pascal_case;
use crate::output::{self, GeneratedUnit};

use super::types::primitive_keyword;

/// The shared underscore-delimited prefix of `names`, or `None` when
/// stripping it would leave an empty name or one starting with a digit.
pub fn common_prefix<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let first = names.first()?;
    let mut prefix = match first.rfind('_') {
        Some(i) => &first[..=i],
        None => return None,
    };
    for name in &names[1..] {
        while !name.starts_with(prefix) {
            prefix = shrink(prefix);
        }
    }
    if prefix.is_empty() {
        return None;
    }
    let usable = names.iter().all(|name| {
        name[prefix.len()..]
            .chars()
            .next()
            .is_some_and(|c| !c.is_ascii_digit())
    });
    usable.then(|| prefix.to_string())
}

/// Drop the last segment: `FOO_BAR_` → `FOO_`, `FOO_` → ``.
fn shrink(prefix: &str) -> &str {
    let body = prefix.strip_suffix('_').unwrap_or(prefix);
    match body.rfind('_') {
        Some(i) => &prefix[..=i],
        None => "",
    }
}

/// Managed item names, in item order.
pub fn item_names(en: &EnumDecl) -> Vec<String> {
    let Some(prefix) = common_prefix(en.items.iter().map(|i| i.name.as_str())) else {
        return en.items.iter().map(|i| i.name.clone()).collect();
    };
    let trimmed: Vec<String> = en
        .items
        .iter()
        .map(|i| pascal_case(&i.name[prefix.len()..]))
        .collect();
    let distinct: BTreeSet<&String> = trimmed.iter().collect();
    if distinct.len() == trimmed.len() {
        trimmed
    } else {
        en.items.iter().map(|i| i.name.clone()).collect()
    }
}

/// A bit-flag set is recognized by a left shift in any item's initializer.
pub fn is_flags(en: &EnumDecl) -> bool {
    en.items
        .iter()
        .any(|i| i.expression.as_deref().is_some_and(|e| e.contains("<<")))
}

fn item_value(value: i64, underlying: &CType, flags: bool) -> String {
    if !flags || value < 0 {
        return value.to_string();
    }
    match underlying {
        CType::I64 | CType::U64 => format!("0x{value:016X}"),
        _ => format!("0x{value:08X}"),
    }
}

pub fn emit_enum(en: &EnumDecl, ctx: &PipelineContext) -> Result<GeneratedUnit> {
    let Some(managed) = ctx.aliases.enum_name(&en.name) else {
        shape_bail!(&en.name, "enum has no managed name");
    };
    let flags = is_flags(en);

    let mut ty = TypeDecl::new(managed, TypeKind::Enum, Modifiers::PUBLIC);
    if flags {
        ty.attributes.push(crate::ir::Attribute::new("Flags"));
    }
    match primitive_keyword(&en.underlying) {
        Some("int") | None => {}
        Some(keyword) => ty.base = Some(TypeRef::named(keyword)),
    }
    for (item, name) in en.items.iter().zip(item_names(en)) {
        ty.members.push(Member::EnumItem(IrItem {
            name,
            value: item_value(item.value, &en.underlying, flags),
            comment: Vec::new(),
        }));
    }

    debug!(name = %en.name, managed, items = en.items.len(), flags, "emitted enum");
    let file = CodeFile {
        header: Vec::new(),
        usings: vec!["System".to_string()],
        namespaces: vec![Namespace {
            name: ctx.output.namespace.clone(),
            types: vec![ty],
        }],
    };
    Ok(GeneratedUnit::source(
        output::MANAGED_ENUMS,
        managed,
        BTreeSet::from([en.source.file.clone()]),
        file,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_prefix_is_trimmed() {
        let prefix = common_prefix(["FOO_BAR_A", "FOO_BAR_B", "FOO_BAR_C"]);
        assert_eq!(prefix.as_deref(), Some("FOO_BAR_"));
    }

    #[test]
    fn prefix_shrinks_segment_by_segment() {
        let prefix = common_prefix(["CEF_X_ONE", "CEF_X_TWO", "CEF_Y_THREE"]);
        assert_eq!(prefix.as_deref(), Some("CEF_"));
    }

    #[test]
    fn digit_after_prefix_falls_back() {
        assert_eq!(common_prefix(["FOO_1", "FOO_2"]), None);
    }

    #[test]
    fn nothing_shared() {
        assert_eq!(common_prefix(["ALPHA_A", "BETA_B"]), None);
    }
}

//! Type classifier — structural classification over the compiled bindings.
//!
//! A struct's class follows from the first field of its *emitted* binding:
//! the ref-counted base, the scoped base, a `size` field of pointer-sized
//! unsigned type, or none of these. Enums are classified by name when the
//! alias tables are built.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::{debug, info};

use crate::alias::{TypeNameResolver, strip_elaborated};
use crate::context::PipelineContext;
use crate::error::shape_bail;
use crate::ir::{TypeKind, TypeRef};
use crate::model::{NativeDeclaration, StructDecl};
use crate::native::NativeSurface;
use crate::symbols::{SymbolModel, TypeSymbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeClassification {
    Simple,
    Sized,
    RefCounted,
    Scoped,
    Enum,
}

/// Which way a wrapper faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WrapperRole {
    /// Forwards managed calls into a native instance.
    Proxy,
    /// Implements a native instance with managed callbacks.
    Handler,
}

/// The four disjoint struct maps, the enum map and the wrapper roles.
#[derive(Debug, Default, Clone)]
pub struct Classification {
    simple: BTreeSet<String>,
    sized: BTreeSet<String>,
    ref_counted: BTreeSet<String>,
    scoped: BTreeSet<String>,
    /// Native enum name → managed name.
    enums: BTreeMap<String, String>,
    roles: BTreeMap<String, WrapperRole>,
}

impl Classification {
    /// Class of a binding name (or native enum name).
    pub fn of(&self, name: &str) -> Option<TypeClassification> {
        if self.simple.contains(name) {
            Some(TypeClassification::Simple)
        } else if self.sized.contains(name) {
            Some(TypeClassification::Sized)
        } else if self.ref_counted.contains(name) {
            Some(TypeClassification::RefCounted)
        } else if self.scoped.contains(name) {
            Some(TypeClassification::Scoped)
        } else if self.enums.contains_key(name) {
            Some(TypeClassification::Enum)
        } else {
            None
        }
    }

    /// Record one classification. A second one for the same name is a
    /// shape mismatch.
    pub fn insert(&mut self, name: &str, class: TypeClassification) -> Result<()> {
        if let Some(existing) = self.of(name) {
            shape_bail!(name, "classified as both {existing:?} and {class:?}");
        }
        let name = name.to_string();
        match class {
            TypeClassification::Simple => self.simple.insert(name),
            TypeClassification::Sized => self.sized.insert(name),
            TypeClassification::RefCounted => self.ref_counted.insert(name),
            TypeClassification::Scoped => self.scoped.insert(name),
            TypeClassification::Enum => {
                shape_bail!(&name, "enums are classified through the alias tables")
            }
        };
        Ok(())
    }

    pub fn role(&self, binding: &str) -> Option<WrapperRole> {
        self.roles.get(binding).copied()
    }

    pub fn enum_name(&self, native: &str) -> Option<&str> {
        self.enums.get(native).map(String::as_str)
    }

    /// Every classified struct or typedef binding with its class, by name.
    pub fn structs(&self) -> Vec<(&str, TypeClassification)> {
        let groups = [
            (&self.simple, TypeClassification::Simple),
            (&self.sized, TypeClassification::Sized),
            (&self.ref_counted, TypeClassification::RefCounted),
            (&self.scoped, TypeClassification::Scoped),
        ];
        let mut all: Vec<(&str, TypeClassification)> = groups
            .into_iter()
            .flat_map(|(set, class)| set.iter().map(move |n| (n.as_str(), class)))
            .collect();
        all.sort();
        all
    }

    /// The class of a header declaration; `None` for functions and for
    /// anything left unclassified.
    pub fn of_declaration(
        &self,
        decl: &NativeDeclaration,
        surface: &NativeSurface<'_>,
    ) -> Option<TypeClassification> {
        match decl {
            NativeDeclaration::Enum(e) => self.enums.contains_key(&e.name).then_some(TypeClassification::Enum),
            NativeDeclaration::Struct(s) => self.of(surface.binding_name(&s.name)),
            NativeDeclaration::Typedef(t) => self.of(&t.name).or_else(|| {
                let spelling = strip_elaborated(&t.aliased_spelling);
                self.of(surface.aliases.resolve_or_identity(spelling))
            }),
            NativeDeclaration::Function(_) => None,
        }
    }
}

/// Classify every struct of the compiled bindings.
pub fn classify(
    symbols: &SymbolModel,
    surface: &NativeSurface<'_>,
    ctx: &PipelineContext,
) -> Result<Classification> {
    let mut classes = Classification::default();
    for (native, managed) in ctx.aliases.enums() {
        classes.enums.insert(native.to_string(), managed.to_string());
    }

    for symbol in symbols.types_in(&ctx.output.native_namespace) {
        if symbol.kind != TypeKind::Struct {
            continue;
        }
        let class = classify_symbol(symbol, ctx)?;
        classes.insert(&symbol.name, class)?;
        if matches!(
            class,
            TypeClassification::RefCounted | TypeClassification::Scoped
        ) {
            let role = surface
                .struct_decl(&symbol.name)
                .map(|decl| role_of(&symbol.name, decl, ctx))
                .unwrap_or(WrapperRole::Proxy);
            classes.roles.insert(symbol.name.clone(), role);
        }
        debug!(name = %symbol.name, ?class, "classified");
    }

    // Folded and opaque typedefs have no symbol of their own; they are
    // plain data and opaque handles.
    for td in surface.folded_typedefs().chain(surface.opaque_typedefs()) {
        classes.insert(&td.name, TypeClassification::Simple)?;
    }

    let unclassified: Vec<&str> = surface
        .model
        .declarations
        .iter()
        .filter(|d| !matches!(d, NativeDeclaration::Function(_)))
        .filter(|d| classes.of_declaration(d, surface).is_none())
        .map(NativeDeclaration::name)
        .collect();
    if let Some(first) = unclassified.first() {
        shape_bail!(
            *first,
            "left unclassified along with {} other declaration(s): {}",
            unclassified.len() - 1,
            unclassified.join(", ")
        );
    }

    info!(
        simple = classes.simple.len(),
        sized = classes.sized.len(),
        ref_counted = classes.ref_counted.len(),
        scoped = classes.scoped.len(),
        enums = classes.enums.len(),
        handlers = classes
            .roles
            .values()
            .filter(|r| **r == WrapperRole::Handler)
            .count(),
        "classified types"
    );
    Ok(classes)
}

/// The four-way rule on the first emitted field.
pub fn classify_symbol(symbol: &TypeSymbol, ctx: &PipelineContext) -> Result<TypeClassification> {
    let conventions = &ctx.conventions;
    let Some(first) = symbol.first_field() else {
        shape_bail!(symbol.full_name(), "struct has no fields to classify by");
    };
    let class = match &first.ty {
        TypeRef::Named(n) if *n == conventions.ref_counted_base => TypeClassification::RefCounted,
        TypeRef::Named(n) if *n == conventions.scoped_base => TypeClassification::Scoped,
        TypeRef::Named(n) if first.name == "size" && n == "UIntPtr" => TypeClassification::Sized,
        _ => {
            // Only the caller storage is left: a callback table without a
            // lifetime marker.
            let data = symbol
                .fields
                .iter()
                .filter(|f| {
                    let raw = f.name.trim_start_matches('@');
                    symbol.method_by_native_name(raw).is_none()
                })
                .count();
            if data == 0 {
                shape_bail!(
                    symbol.full_name(),
                    "function-pointer table without a recognized base field"
                );
            }
            TypeClassification::Simple
        }
    };
    Ok(class)
}

/// Handler when listed in the handler table or marked as client-implemented
/// on the line before its declaration.
pub fn role_of(binding: &str, decl: &StructDecl, ctx: &PipelineContext) -> WrapperRole {
    let listed =
        ctx.tables.handlers.contains(binding) || ctx.tables.handlers.contains(&decl.name);
    let marked = decl
        .source
        .marker
        .as_deref()
        .is_some_and(|m| m.contains(ctx.conventions.handler_marker.as_str()));
    if listed || marked {
        WrapperRole::Handler
    } else {
        WrapperRole::Proxy
    }
}

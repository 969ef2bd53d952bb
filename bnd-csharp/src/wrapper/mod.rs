//! Managed wrapper builder — one wrapper per classified struct.
//!
//! Driven by the compiled bindings: every callable field must have a caller
//! in the symbol model, found through its native-name tag.

pub mod handler;
pub mod property;
pub mod proxy;
pub mod structure;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::{debug, info};

use crate::classify::{TypeClassification, WrapperRole};
use crate::context::PipelineContext;
use crate::error::shape_bail;
use crate::ir::*;
use crate::marshal::Planner;
use crate::model::{FieldDescriptor, MethodSignature, StructDecl};
use crate::native::{NativeSurface, has_receiver};
use crate::output::{self, GeneratedUnit};
use crate::symbols::{SymbolModel, TypeSymbol};

/// A struct about to be wrapped.
#[derive(Debug)]
pub struct WrapperTarget<'a> {
    pub binding: &'a str,
    pub managed: String,
    pub decl: &'a StructDecl,
    pub symbol: &'a TypeSymbol,
    pub class: TypeClassification,
}

/// A function-pointer field and the caller the bindings synthesized for it.
#[derive(Debug, Clone)]
pub struct Callable<'a> {
    pub field: &'a FieldDescriptor,
    pub signature: &'a MethodSignature,
    pub caller: String,
    pub receiver: bool,
}

impl<'a> WrapperTarget<'a> {
    pub fn callables(&self, ctx: &PipelineContext) -> Result<Vec<Callable<'a>>> {
        let mut out = Vec::new();
        for field in &self.decl.fields {
            let Some(signature) = &field.signature else {
                continue;
            };
            let Some(caller) = self.symbol.method_by_native_name(&field.name) else {
                shape_bail!(
                    self.binding,
                    "no caller for `{}` in the compiled bindings",
                    field.name
                );
            };
            out.push(Callable {
                field,
                signature,
                caller: caller.name.clone(),
                receiver: has_receiver(self.binding, signature, &ctx.aliases),
            });
        }
        Ok(out)
    }

    pub fn native(&self) -> TypeRef {
        TypeRef::named(self.binding)
    }
}

/// Build the wrappers of every classified struct.
pub fn build(
    symbols: &SymbolModel,
    surface: &NativeSurface<'_>,
    ctx: &PipelineContext,
) -> Result<Vec<GeneratedUnit>> {
    let planner = Planner::new(ctx, surface);
    let mut taken: BTreeMap<String, &str> = BTreeMap::new();
    let mut units = Vec::new();
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();

    for (binding, class) in ctx.classes.structs() {
        // Folded and mirrored typedefs have no layout to wrap.
        let Some(decl) = surface.struct_decl(binding) else {
            continue;
        };
        let managed = ctx.names.type_name(binding);
        if !wraps(binding, &managed, ctx) {
            debug!(binding, "left to the runtime library");
            continue;
        }
        if let Some(other) = taken.insert(managed.clone(), binding) {
            shape_bail!(binding, "managed name `{managed}` is also taken by `{other}`");
        }
        let full_name = format!("{}.{binding}", ctx.output.native_namespace);
        let Some(symbol) = symbols.get(&full_name) else {
            shape_bail!(binding, "missing from the compiled bindings");
        };
        let target = WrapperTarget {
            binding,
            managed,
            decl,
            symbol,
            class,
        };

        let (kind, types) = match class {
            TypeClassification::RefCounted | TypeClassification::Scoped => {
                match ctx.classes.role(binding).unwrap_or(WrapperRole::Proxy) {
                    WrapperRole::Proxy => ("proxies", proxy::build(&target, &planner, ctx)?),
                    WrapperRole::Handler => ("handlers", handler::build(&target, &planner, ctx)?),
                }
            }
            TypeClassification::Simple | TypeClassification::Sized => {
                ("structures", structure::build(&target, &planner, ctx)?)
            }
            TypeClassification::Enum => continue,
        };
        *counts.entry(kind).or_default() += 1;
        debug!(binding, managed = %target.managed, kind, "built wrapper");

        units.push(GeneratedUnit::source(
            output::MANAGED_TYPES,
            &target.managed,
            BTreeSet::from([decl.source.file.clone()]),
            managed_file(ctx, types),
        ));
    }

    info!(
        proxies = counts.get("proxies").copied().unwrap_or(0),
        handlers = counts.get("handlers").copied().unwrap_or(0),
        structures = counts.get("structures").copied().unwrap_or(0),
        "built managed wrappers"
    );
    Ok(units)
}

/// String structs, lifetime bases and runtime-provided types get no
/// generated wrapper.
fn wraps(binding: &str, managed: &str, ctx: &PipelineContext) -> bool {
    let conventions = &ctx.conventions;
    binding != conventions.string_type
        && binding != conventions.ref_counted_base
        && binding != conventions.scoped_base
        && !ctx.runtime.provided_types.iter().any(|t| t == managed)
}

pub fn managed_file(ctx: &PipelineContext, types: Vec<TypeDecl>) -> CodeFile {
    CodeFile {
        header: Vec::new(),
        usings: ctx.managed_usings(),
        namespaces: vec![Namespace {
            name: ctx.output.namespace.clone(),
            types,
        }],
    }
}

/// `CefBaseRefCounted<cef_x_t>` or `CefBaseScoped<cef_x_t>`.
pub fn base_type(target: &WrapperTarget<'_>, ctx: &PipelineContext) -> TypeRef {
    let base = match target.class {
        TypeClassification::Scoped => &ctx.runtime.scoped_wrapper,
        _ => &ctx.runtime.ref_counted_wrapper,
    };
    TypeRef::Generic(base.clone(), vec![target.native()])
}

pub fn native_name_attribute(ctx: &PipelineContext, native: &str) -> Attribute {
    Attribute::new(ctx.runtime.native_name_attribute.trim_end_matches("Attribute"))
        .arg(format!("\"{native}\""))
}

/// Constructor adopting an existing native instance.
pub fn pointer_constructor(target: &WrapperTarget<'_>) -> Member {
    Member::Constructor(Constructor {
        modifiers: Modifiers::INTERNAL,
        params: vec![Param::new("instance", target.native().pointer())],
        initializer: Some("base(instance)".to_string()),
        body: Vec::new(),
    })
}

/// `Wrap(T*)`: the registered wrapper of `instance`, or a new one.
pub fn wrap_method(target: &WrapperTarget<'_>, ctx: &PipelineContext) -> Member {
    let managed = &target.managed;
    let mut found = Vec::new();
    if target.class == TypeClassification::RefCounted {
        // The caller's reference is not needed by an existing wrapper.
        found.push(Stmt::line(format!(
            "(({}*)instance)->Release();",
            ctx.conventions.ref_counted_base
        )));
    }
    found.push(Stmt::line("return existing;"));

    let mut method = Method::new(
        "Wrap",
        TypeRef::named(managed),
        Modifiers::INTERNAL | Modifiers::STATIC,
    );
    method.params = vec![Param::new("instance", target.native().pointer())];
    method.body = Some(vec![
        Stmt::block("if (instance == null)", vec![Stmt::line("return null;")]),
        Stmt::line(format!(
            "{managed} existing = {}(instance) as {managed};",
            ctx.runtime.instance_lookup
        )),
        Stmt::block("if (existing != null)", found),
        Stmt::line(format!("return new {managed}(instance);")),
    ]);
    Member::Method(method)
}

/// `return expr;`, or `expr;` for `void`.
pub fn return_or_discard(ret: &TypeRef, expr: String) -> Stmt {
    if ret.is_void() {
        Stmt::line(format!("{expr};"))
    } else {
        Stmt::line(format!("return {expr};"))
    }
}

//! Override detector — identity-comparison routines for handler callbacks.
//!
//! The wrappers are compiled a second time, now with their virtual methods,
//! and every `IsOverridden<Method>` query of a handler's private interface
//! gets an ILAsm body comparing the instance's dispatch target for
//! `<Method>` with the handler's own implementation.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info};

use crate::context::PipelineContext;
use crate::error::shape_bail;
use crate::ir::cil::{
    IlClass, IlCondition, IlCustom, IlMethod, IlMethodRef, IlType, Instr, primitive_name,
};
use crate::ir::{TypeKind, TypeRef};
use crate::output::{self, GeneratedUnit, UnitContent, sources_of};
use crate::symbols::{self, CompileOptions, MethodSymbol, SymbolModel, TypeSymbol};
use crate::wrapper::handler::private_interface;

/// Symbol defined by the assembler on Windows builds.
const WINDOWS_DEFINE: &str = "WINDOWS";

/// Compile the native and managed units together.
pub fn recompile(units: &[GeneratedUnit], ctx: &PipelineContext) -> Result<SymbolModel> {
    symbols::compile(
        units,
        CompileOptions {
            defines: &ctx.output.defines,
            provided: &ctx.runtime.provided_types,
            tool: "override detector",
        },
    )
}

/// One `.il` unit per handler class with at least one override query.
pub fn emit(
    symbols: &SymbolModel,
    units: &[GeneratedUnit],
    ctx: &PipelineContext,
) -> Result<Vec<GeneratedUnit>> {
    let mut out = Vec::new();
    let mut routines = 0;
    for class in symbols.types_in(&ctx.output.namespace) {
        if class.kind != TypeKind::Class {
            continue;
        }
        let private = private_interface(&class.name);
        if !class.implements(&private) {
            continue;
        }
        let Some(iface) = symbols.get(&format!("{}.{private}", class.namespace)) else {
            shape_bail!(class.full_name(), "private interface `{private}` is missing");
        };

        let mut methods = Vec::new();
        for query in &iface.methods {
            methods.push(routine(class, iface, query, symbols, ctx)?);
        }
        routines += methods.len();
        debug!(class = %class.full_name(), routines = methods.len(), "override checks");

        let il = IlClass {
            header: Vec::new(),
            name: class.full_name(),
            extends: class
                .base
                .as_ref()
                .map(|b| il_type(b, symbols, ctx))
                .transpose()?,
            implements: vec![IlType::Class(iface.full_name())],
            methods,
        };
        out.push(GeneratedUnit {
            path: Path::new(output::MANAGED_OVERRIDES).join(format!("{}.il", class.name)),
            sources: sources_of(units, &class.unit),
            content: UnitContent::Instructions(il),
        });
    }
    info!(classes = out.len(), routines, "emitted override checks");
    Ok(out)
}

fn routine(
    class: &TypeSymbol,
    iface: &TypeSymbol,
    query: &MethodSymbol,
    symbols: &SymbolModel,
    ctx: &PipelineContext,
) -> Result<IlMethod> {
    let Some(guarded) = query.name.strip_prefix("IsOverridden") else {
        shape_bail!(iface.full_name(), "`{}` is not an override query", query.name);
    };
    let Some(target) = class.method(guarded).filter(|m| m.is_virtual()) else {
        shape_bail!(class.full_name(), "no virtual method `{guarded}` for `{}`", query.name);
    };
    let Some(native) = target.native_name.as_deref() else {
        shape_bail!(class.full_name(), "virtual method `{guarded}` has no native name");
    };
    let mut params = Vec::with_capacity(target.params.len());
    for p in &target.params {
        params.push(il_type(&p.ty, symbols, ctx)?.with_direction(p.direction));
    }
    let guarded_ref = IlMethodRef {
        owner: IlType::Class(class.full_name()),
        name: guarded.to_string(),
        ret: il_type(&target.ret, symbols, ctx)?,
        params,
        instance: true,
    };

    Ok(IlMethod {
        name: format!("{}.{}", iface.full_name(), query.name),
        ret: IlType::primitive("bool"),
        params: Vec::new(),
        custom: callback_attributes(native, ctx),
        overrides: Some(IlMethodRef {
            owner: IlType::Class(iface.full_name()),
            name: query.name.clone(),
            ret: IlType::primitive("bool"),
            params: Vec::new(),
            instance: true,
        }),
        max_stack: 2,
        body: vec![
            Instr::LoadThis,
            Instr::LoadVirtualTarget(guarded_ref.clone()),
            Instr::LoadDeclaredTarget(guarded_ref),
            Instr::CompareEqual,
            Instr::LoadZero,
            Instr::CompareEqual,
            Instr::Return,
        ],
    })
}

/// `NativeCallbackAttribute(name, callConv)`, per platform unless forced.
fn callback_attributes(native: &str, ctx: &PipelineContext) -> Vec<IlCustom> {
    let attribute = IlType::Class(format!(
        "{}.{}",
        ctx.output.namespace, ctx.runtime.native_callback_attribute
    ));
    let custom = |conv: &str, condition| IlCustom {
        attribute: attribute.clone(),
        args: vec![native.to_string(), conv.to_string()],
        condition,
    };
    if ctx.stdcall {
        return vec![custom("stdcall", None)];
    }
    vec![
        custom(
            "stdcall",
            Some(IlCondition {
                symbol: WINDOWS_DEFINE.to_string(),
                defined: true,
            }),
        ),
        custom(
            "cdecl",
            Some(IlCondition {
                symbol: WINDOWS_DEFINE.to_string(),
                defined: false,
            }),
        ),
    ]
}

/// Managed type as ILAsm spells it in a method reference.
fn il_type(ty: &TypeRef, symbols: &SymbolModel, ctx: &PipelineContext) -> Result<IlType> {
    let out = match ty {
        TypeRef::Void => IlType::primitive("void"),
        TypeRef::Named(name) => named(name, symbols, ctx)?,
        TypeRef::Pointer(inner) => IlType::Pointer(Box::new(il_type(inner, symbols, ctx)?)),
        TypeRef::Array(inner) => IlType::Array(Box::new(il_type(inner, symbols, ctx)?)),
        TypeRef::Generic(name, args) => {
            let args = args
                .iter()
                .map(|a| il_type(a, symbols, ctx))
                .collect::<Result<Vec<_>>>()?;
            let qualified = match lookup(name, symbols, ctx) {
                Some(symbol) => symbol.full_name(),
                None => format!("{}.{name}", ctx.output.namespace),
            };
            IlType::GenericInstance(qualified, args)
        }
        TypeRef::FunctionPointer { .. } => IlType::primitive("native int"),
    };
    Ok(out)
}

fn named(name: &str, symbols: &SymbolModel, ctx: &PipelineContext) -> Result<IlType> {
    if let Some(primitive) = primitive_name(name) {
        return Ok(IlType::primitive(primitive));
    }
    if let Some(symbol) = lookup(name, symbols, ctx) {
        return Ok(match symbol.kind {
            TypeKind::Struct | TypeKind::Enum => IlType::ValueType(symbol.full_name()),
            TypeKind::Class | TypeKind::Interface => IlType::Class(symbol.full_name()),
        });
    }
    if ctx.runtime.provided_types.iter().any(|t| t == name) {
        return Ok(IlType::Class(format!("{}.{name}", ctx.output.namespace)));
    }
    shape_bail!(name, "type has no instruction-level spelling");
}

/// Resolve a simple name the way the wrapper sources see it: their own
/// namespace first, then the native one.
fn lookup<'s>(name: &str, symbols: &'s SymbolModel, ctx: &PipelineContext) -> Option<&'s TypeSymbol> {
    [&ctx.output.namespace, &ctx.output.native_namespace]
        .into_iter()
        .find_map(|ns| symbols.get(&format!("{ns}.{name}")))
        .or_else(|| symbols.get(name))
}

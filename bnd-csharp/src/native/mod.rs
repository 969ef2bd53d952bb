//! Native binding emitter — mirrored layouts, callers, typedefs and imports.
//!
//! Every struct is mirrored field for field. Function-pointer fields are
//! stored as `void*` and get a caller method performing the indirect call;
//! the modern caller uses an unmanaged function pointer, the legacy caller a
//! marshaled delegate.

pub mod enums;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::{debug, info, trace, warn};

use crate::alias::{AliasResolver, TypeNameResolver, strip_elaborated};
use crate::context::PipelineContext;
use crate::ir::csharp::type_ref;
use crate::ir::*;
use crate::model::*;
use crate::naming::{escape_identifier, pascal_case};
use crate::output::{self, GeneratedUnit};

pub use types::native_type;

/// How a typedef shows up in the bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedefDisposition<'m> {
    /// Names a struct or enum emitted under the typedef name.
    Absorbed,
    /// Replaced by its aliased type wherever it is referenced.
    Folded(&'m CType),
    /// Emitted as a single-field `Value` struct.
    Mirrored,
    /// Names a struct that is declared but never defined. Only ever used
    /// through pointers, which bind as `void*`.
    Opaque,
}

/// The header model as the bindings see it: structs keyed by binding name,
/// typedefs with their disposition.
#[derive(Debug)]
pub struct NativeSurface<'m> {
    pub model: &'m HeaderModel,
    pub aliases: &'m AliasResolver,
    structs: BTreeMap<String, &'m StructDecl>,
    typedefs: BTreeMap<String, (&'m TypedefDecl, TypedefDisposition<'m>)>,
}

impl<'m> NativeSurface<'m> {
    pub fn new(model: &'m HeaderModel, aliases: &'m AliasResolver) -> Self {
        let mut structs = BTreeMap::new();
        for decl in model.structs() {
            let binding = aliases.resolve_or_identity(&decl.name).to_string();
            if let Some(previous) = structs.insert(binding.clone(), decl) {
                warn!(binding, first = %previous.name, second = %decl.name, "struct binding defined twice");
            }
        }

        let mut typedefs = BTreeMap::new();
        for td in model.typedefs() {
            let disposition = typedef_disposition(td, &structs, aliases);
            trace!(typedef = %td.name, ?disposition, "typedef disposition");
            typedefs.insert(td.name.clone(), (td, disposition));
        }

        Self {
            model,
            aliases,
            structs,
            typedefs,
        }
    }

    /// Binding name of a raw native name.
    pub fn binding_name<'a>(&'a self, raw: &'a str) -> &'a str {
        self.aliases.resolve_or_identity(raw)
    }

    pub fn struct_decl(&self, binding: &str) -> Option<&'m StructDecl> {
        self.structs.get(binding).copied()
    }

    /// Structs in binding-name order.
    pub fn structs(&self) -> impl Iterator<Item = (&str, &'m StructDecl)> {
        self.structs.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_mirrored(&self, binding: &str) -> bool {
        matches!(
            self.typedefs.get(binding),
            Some((_, TypedefDisposition::Mirrored))
        )
    }

    /// The aliased type of a folded typedef.
    pub fn folded(&self, name: &str) -> Option<&'m CType> {
        match self.typedefs.get(name) {
            Some((_, TypedefDisposition::Folded(ty))) => Some(*ty),
            _ => None,
        }
    }

    pub fn disposition(&self, name: &str) -> Option<&TypedefDisposition<'m>> {
        self.typedefs.get(name).map(|(_, d)| d)
    }

    pub fn mirrored_typedefs(&self) -> impl Iterator<Item = &'m TypedefDecl> {
        self.typedefs.values().filter_map(|(td, d)| match d {
            TypedefDisposition::Mirrored => Some(*td),
            _ => None,
        })
    }

    pub fn opaque_typedefs(&self) -> impl Iterator<Item = &'m TypedefDecl> {
        self.typedefs.values().filter_map(|(td, d)| match d {
            TypedefDisposition::Opaque => Some(*td),
            _ => None,
        })
    }

    pub fn folded_typedefs(&self) -> impl Iterator<Item = &'m TypedefDecl> {
        self.typedefs.values().filter_map(|(td, d)| match d {
            TypedefDisposition::Folded(_) => Some(*td),
            _ => None,
        })
    }

    /// Whether `binding` names a type the bindings define.
    pub fn defines(&self, binding: &str) -> bool {
        self.structs.contains_key(binding) || self.is_mirrored(binding)
    }
}

fn typedef_disposition<'m>(
    td: &'m TypedefDecl,
    structs: &BTreeMap<String, &'m StructDecl>,
    aliases: &AliasResolver,
) -> TypedefDisposition<'m> {
    let spelling = strip_elaborated(&td.aliased_spelling);
    let names_enum = aliases.enum_name(spelling).is_some() || aliases.enum_name(&td.name).is_some();
    let names_tag = aliases.resolve_or_identity(spelling) == td.name;
    if names_tag && !names_enum && !structs.contains_key(&td.name) {
        TypedefDisposition::Opaque
    } else if names_tag || names_enum {
        TypedefDisposition::Absorbed
    } else if is_foldable(&td.aliased, structs, aliases) {
        TypedefDisposition::Folded(&td.aliased)
    } else {
        TypedefDisposition::Mirrored
    }
}

/// Types that carry no struct or enum identity of their own.
fn is_foldable(ty: &CType, structs: &BTreeMap<String, &StructDecl>, aliases: &AliasResolver) -> bool {
    match ty {
        CType::Array { .. } => false,
        CType::Ptr { pointee, .. } => match pointee.as_ref() {
            CType::Void | CType::FnPtr { .. } => true,
            inner => is_foldable(inner, structs, aliases),
        },
        CType::Named { name, resolved } => {
            if structs.contains_key(aliases.resolve_or_identity(name))
                || aliases.enum_name(name).is_some()
            {
                return false;
            }
            resolved
                .as_deref()
                .is_some_and(|r| is_foldable(r, structs, aliases))
        }
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Emission entry point
// ---------------------------------------------------------------------------

/// Emit the low-level bindings and the managed enums.
pub fn emit(surface: &NativeSurface<'_>, ctx: &PipelineContext) -> Result<Vec<GeneratedUnit>> {
    let mut units = Vec::new();

    for (binding, decl) in surface.structs() {
        units.push(emit_struct(binding, decl, surface, ctx));
    }
    let structs = units.len();

    for td in surface.mirrored_typedefs() {
        units.push(emit_typedef(td, surface, ctx));
    }
    let typedefs = units.len() - structs;

    for en in surface.model.enums() {
        units.push(enums::emit_enum(en, ctx)?);
    }
    let enum_count = units.len() - structs - typedefs;

    if let Some(unit) = emit_functions(surface, ctx) {
        units.push(unit);
    }

    info!(
        structs,
        typedefs,
        enums = enum_count,
        functions = surface.model.functions().count(),
        "emitted native bindings"
    );
    Ok(units)
}

fn native_file(ctx: &PipelineContext, ty: TypeDecl) -> CodeFile {
    CodeFile {
        header: Vec::new(),
        usings: vec![
            "System".to_string(),
            "System.Runtime.InteropServices".to_string(),
        ],
        namespaces: vec![Namespace {
            name: ctx.output.native_namespace.clone(),
            types: vec![ty],
        }],
    }
}

fn sources_of(source: &SourceInfo) -> BTreeSet<std::path::PathBuf> {
    BTreeSet::from([source.file.clone()])
}

// ---------------------------------------------------------------------------
// Struct emission
// ---------------------------------------------------------------------------

fn emit_struct(
    binding: &str,
    decl: &StructDecl,
    surface: &NativeSurface<'_>,
    ctx: &PipelineContext,
) -> GeneratedUnit {
    let mut ty = TypeDecl::new(
        binding,
        TypeKind::Struct,
        Modifiers::PUBLIC | Modifiers::UNSAFE | Modifiers::PARTIAL,
    );
    let layout = if decl.is_union {
        "LayoutKind.Explicit"
    } else {
        "LayoutKind.Sequential"
    };
    ty.attributes.push(Attribute::new("StructLayout").arg(layout));

    let mut callers = Vec::new();
    let mut delegates = Vec::new();
    for field in &decl.fields {
        trace!(owner = binding, field = %field.name, callable = field.is_function_pointer(), "field");
        ty.members
            .extend(data_fields(field, decl.is_union, surface).into_iter().map(Member::Field));
        if let Some(sig) = &field.signature {
            let (caller, delegate) = emit_caller(binding, field, sig, surface, ctx);
            callers.push(Member::Method(caller));
            delegates.push(Member::Delegate(delegate));
        }
    }
    if !delegates.is_empty() {
        ty.members.push(Member::Conditional(ConditionalGroup {
            symbol: ctx.conventions.legacy_define.clone(),
            then: delegates,
            otherwise: Vec::new(),
        }));
    }
    ty.members.extend(callers);

    debug!(
        name = binding,
        fields = decl.fields.len(),
        union = decl.is_union,
        "emitted struct"
    );
    GeneratedUnit::source(
        output::NATIVE_TYPES,
        binding,
        sources_of(&decl.source),
        native_file(ctx, ty),
    )
}

/// The stored fields for one native field. Fixed arrays of non-primitive
/// elements are spelled out element by element.
fn data_fields(field: &FieldDescriptor, is_union: bool, surface: &NativeSurface<'_>) -> Vec<Field> {
    let with_offset = |mut f: Field| {
        if is_union {
            f.attributes.push(Attribute::new("FieldOffset").arg("0"));
        }
        f
    };
    let name = escape_identifier(&field.name);
    match &field.ty {
        _ if field.is_function_pointer() => {
            vec![with_offset(Field::new(name, TypeRef::void_ptr(), Modifiers::PUBLIC))]
        }
        CType::Array { element, len } => {
            let element = native_type(element, surface);
            if types::is_fixed_buffer_element(&element) {
                let mut f = Field::new(name, element, Modifiers::PUBLIC);
                f.fixed_len = Some(*len);
                vec![with_offset(f)]
            } else {
                (0..*len)
                    .map(|i| {
                        with_offset(Field::new(
                            format!("{}_{i}", field.name),
                            element.clone(),
                            Modifiers::PUBLIC,
                        ))
                    })
                    .collect()
            }
        }
        ty => vec![with_offset(Field::new(
            name,
            native_type(ty, surface),
            Modifiers::PUBLIC,
        ))],
    }
}

/// Name of the caller synthesized for a function-pointer field.
pub fn caller_name(field: &str) -> String {
    pascal_case(field)
}

/// Whether the first parameter is the receiver: named `self` and typed as a
/// pointer to the enclosing struct.
pub fn has_receiver(binding: &str, sig: &MethodSignature, aliases: &AliasResolver) -> bool {
    let Some(first) = sig.params.first() else {
        return false;
    };
    first.name == "self"
        && first
            .ty
            .pointee()
            .and_then(CType::name)
            .is_some_and(|n| aliases.resolve_or_identity(n) == binding)
}

/// Parameter identifier, with a positional fallback for unnamed parameters.
pub fn param_ident(param: &ParamDescriptor, index: usize) -> String {
    if param.name.is_empty() {
        format!("param{index}")
    } else {
        escape_identifier(&param.name)
    }
}

fn emit_caller(
    binding: &str,
    field: &FieldDescriptor,
    sig: &MethodSignature,
    surface: &NativeSurface<'_>,
    ctx: &PipelineContext,
) -> (Method, DelegateDecl) {
    let receiver = has_receiver(binding, sig, surface.aliases);
    let name = caller_name(&field.name);
    let ret = native_type(&sig.return_type, surface);
    let params: Vec<Param> = sig
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let ident = if receiver && i == 0 {
                "self".to_string()
            } else {
                param_ident(p, i)
            };
            Param::new(ident, native_type(&p.ty, surface))
        })
        .collect();
    let exposed = if receiver { &params[1..] } else { &params[..] };

    let args = params
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let field_ident = escape_identifier(&field.name);
    let pointer = TypeRef::FunctionPointer {
        convention: types::unmanaged_convention(sig.calling_convention).to_string(),
        params: params.iter().map(|p| p.ty.clone()).collect(),
        ret: Box::new(ret.clone()),
    };
    let delegate_name = format!("{name}Delegate");
    let modern = format!("(({}){field_ident})({args})", type_ref(&pointer));
    let legacy = format!(
        "(({delegate_name})Marshal.GetDelegateForFunctionPointer((IntPtr){field_ident}, typeof({delegate_name})))({args})"
    );
    let call = |expr: String| {
        if ret.is_void() {
            Stmt::line(format!("{expr};"))
        } else {
            Stmt::line(format!("return {expr};"))
        }
    };
    let dispatch = vec![Stmt::Conditional {
        symbol: ctx.conventions.legacy_define.clone(),
        then: vec![call(legacy)],
        otherwise: vec![call(modern)],
    }];

    let mut method = Method::new(name, ret.clone(), Modifiers::PUBLIC | Modifiers::UNSAFE);
    method.params = exposed.to_vec();
    method.native_name = Some(field.name.clone());
    method.attributes.push(
        Attribute::new(ctx.runtime.native_name_attribute.trim_end_matches("Attribute"))
            .arg(format!("\"{}\"", field.name)),
    );
    method.body = Some(if receiver {
        vec![Stmt::block(format!("fixed ({binding}* self = &this)"), dispatch)]
    } else {
        dispatch
    });

    let delegate = DelegateDecl {
        name: delegate_name,
        ret,
        params,
        modifiers: Modifiers::PRIVATE | Modifiers::UNSAFE,
        attributes: vec![
            Attribute::new("UnmanagedFunctionPointer")
                .arg(types::calling_convention(sig.calling_convention)),
        ],
    };
    (method, delegate)
}

// ---------------------------------------------------------------------------
// Typedef emission
// ---------------------------------------------------------------------------

fn emit_typedef(td: &TypedefDecl, surface: &NativeSurface<'_>, ctx: &PipelineContext) -> GeneratedUnit {
    let mut ty = TypeDecl::new(
        &td.name,
        TypeKind::Struct,
        Modifiers::PUBLIC | Modifiers::UNSAFE | Modifiers::PARTIAL,
    );
    ty.attributes
        .push(Attribute::new("StructLayout").arg("LayoutKind.Sequential"));
    // Opaque handles (`typedef struct x* name` with no definition) store an
    // IntPtr rather than a pointer to nothing.
    let value = match native_type(&td.aliased, surface) {
        TypeRef::Void => TypeRef::named("IntPtr"),
        other => other,
    };
    let mut field = Field::new("Value", value, Modifiers::PUBLIC);
    field.comment = vec![format!(
        "typedef {} {};",
        td.aliased_spelling.trim(),
        td.name
    )];
    ty.members.push(Member::Field(field));

    debug!(name = %td.name, "emitted typedef");
    GeneratedUnit::source(
        output::NATIVE_TYPEDEFS,
        &td.name,
        sources_of(&td.source),
        native_file(ctx, ty),
    )
}

// ---------------------------------------------------------------------------
// Function imports
// ---------------------------------------------------------------------------

fn emit_functions(surface: &NativeSurface<'_>, ctx: &PipelineContext) -> Option<GeneratedUnit> {
    let mut functions: Vec<&FunctionDecl> = surface.model.functions().collect();
    if functions.is_empty() {
        return None;
    }
    functions.sort_by(|a, b| a.name.cmp(&b.name));
    functions.dedup_by(|a, b| a.name == b.name);

    let mut class = TypeDecl::new(
        &ctx.output.functions_class,
        TypeKind::Class,
        Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::UNSAFE | Modifiers::PARTIAL,
    );
    let mut sources = BTreeSet::new();
    for f in &functions {
        let mut method = Method::new(
            &f.name,
            native_type(&f.signature.return_type, surface),
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::EXTERN,
        );
        method.params = f
            .signature
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| Param::new(param_ident(p, i), native_type(&p.ty, surface)))
            .collect();
        method.native_name = Some(f.name.clone());
        method.attributes.push(
            Attribute::new("DllImport")
                .arg(format!("\"{}\"", ctx.output.library))
                .arg(format!(
                    "CallingConvention = {}",
                    types::calling_convention(f.signature.calling_convention)
                )),
        );
        class.members.push(Member::Method(method));
        sources.insert(f.source.file.clone());
        debug!(name = %f.name, "emitted import");
    }

    Some(GeneratedUnit::source(
        output::NATIVE_TYPES,
        &ctx.output.functions_class,
        sources,
        native_file(ctx, class),
    ))
}

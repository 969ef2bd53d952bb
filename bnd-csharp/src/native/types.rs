//! `CType` → C# spelling of the low-level bindings.

use crate::alias::TypeNameResolver;
use crate::ir::TypeRef;
use crate::model::{CType, CallConv};

use super::NativeSurface;

/// Spell `ty` as the bindings declare it.
pub fn native_type(ty: &CType, surface: &NativeSurface<'_>) -> TypeRef {
    match ty {
        CType::Void => TypeRef::Void,
        CType::Ptr { pointee, .. } => match pointee.as_ref() {
            CType::FnPtr { .. } => TypeRef::void_ptr(),
            inner => native_type(inner, surface).pointer(),
        },
        // Struct fields lay arrays out themselves; anywhere else they decay.
        CType::Array { element, .. } => native_type(element, surface).pointer(),
        CType::FnPtr { .. } => TypeRef::void_ptr(),
        CType::Named { name, resolved } => named_type(name, resolved.as_deref(), surface),
        primitive => TypeRef::named(primitive_keyword(primitive).unwrap_or("int")),
    }
}

fn named_type(name: &str, resolved: Option<&CType>, surface: &NativeSurface<'_>) -> TypeRef {
    let aliases = surface.aliases;
    let binding = aliases.resolve_or_identity(name);
    if let Some(managed) = aliases.enum_name(name) {
        return TypeRef::named(managed);
    }
    if surface.is_mirrored(binding) {
        return TypeRef::named(binding);
    }
    if let Some(keyword) = well_known_typedef(name).or_else(|| well_known_typedef(binding)) {
        return TypeRef::named(keyword);
    }
    if let Some(aliased) = surface.folded(name) {
        return native_type(aliased, surface);
    }
    match resolved {
        Some(canonical) => native_type(canonical, surface),
        None if surface.defines(binding) => TypeRef::named(binding),
        // Incomplete type, only ever reached through a pointer.
        None => TypeRef::Void,
    }
}

/// Typedefs whose meaning is lost in their canonical type.
fn well_known_typedef(name: &str) -> Option<&'static str> {
    Some(match name {
        "size_t" | "uintptr_t" => "UIntPtr",
        "ssize_t" | "intptr_t" | "ptrdiff_t" => "IntPtr",
        "char16_t" | "char16" => "char",
        _ => return None,
    })
}

pub fn primitive_keyword(ty: &CType) -> Option<&'static str> {
    Some(match ty {
        CType::Bool => "byte",
        CType::I8 => "sbyte",
        CType::U8 => "byte",
        CType::I16 => "short",
        CType::U16 => "ushort",
        CType::I32 => "int",
        CType::U32 => "uint",
        CType::I64 => "long",
        CType::U64 => "ulong",
        CType::F32 => "float",
        CType::F64 => "double",
        CType::ISize => "IntPtr",
        CType::USize => "UIntPtr",
        _ => return None,
    })
}

/// Whether a C# type keyword is a fixed-buffer element type.
pub fn is_fixed_buffer_element(ty: &TypeRef) -> bool {
    matches!(
        ty,
        TypeRef::Named(n) if matches!(
            n.as_str(),
            "byte" | "sbyte" | "short" | "ushort" | "int" | "uint" | "long" | "ulong" | "float"
                | "double" | "char"
        )
    )
}

/// `Cdecl` as used in `delegate* unmanaged[...]`.
pub fn unmanaged_convention(cc: CallConv) -> &'static str {
    match cc {
        CallConv::Cdecl => "Cdecl",
        CallConv::Stdcall => "Stdcall",
        CallConv::Fastcall => "Fastcall",
    }
}

/// `CallingConvention.Cdecl` as used by `[DllImport]` and delegates.
pub fn calling_convention(cc: CallConv) -> &'static str {
    match cc {
        CallConv::Cdecl => "CallingConvention.Cdecl",
        CallConv::Stdcall => "CallingConvention.StdCall",
        CallConv::Fastcall => "CallingConvention.FastCall",
    }
}

/// The C spelling of a type, for comments.
pub fn c_spelling(ty: &CType) -> String {
    match ty {
        CType::Void => "void".to_string(),
        CType::Bool => "bool".to_string(),
        CType::I8 => "char".to_string(),
        CType::U8 => "unsigned char".to_string(),
        CType::I16 => "short".to_string(),
        CType::U16 => "unsigned short".to_string(),
        CType::I32 => "int".to_string(),
        CType::U32 => "unsigned int".to_string(),
        CType::I64 => "int64".to_string(),
        CType::U64 => "uint64".to_string(),
        CType::F32 => "float".to_string(),
        CType::F64 => "double".to_string(),
        CType::ISize => "intptr_t".to_string(),
        CType::USize => "size_t".to_string(),
        CType::Ptr { pointee, is_const } => {
            let inner = c_spelling(pointee);
            if *is_const {
                format!("const {inner}*")
            } else {
                format!("{inner}*")
            }
        }
        CType::Array { element, len } => format!("{}[{len}]", c_spelling(element)),
        CType::Named { name, .. } => name.clone(),
        CType::FnPtr { .. } => "void*".to_string(),
    }
}

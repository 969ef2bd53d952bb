//! Header model — the native declarations every later stage consumes.
//!
//! These types are clang-independent and C#-independent, so the emitters can
//! be exercised without libclang by building a [`HeaderModel`] by hand.

use std::path::PathBuf;

/// Everything extracted from the native headers, in source order.
#[derive(Debug, Default, Clone)]
pub struct HeaderModel {
    pub declarations: Vec<NativeDeclaration>,
}

impl HeaderModel {
    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.declarations.iter().filter_map(|d| match d {
            NativeDeclaration::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDecl> {
        self.declarations.iter().filter_map(|d| match d {
            NativeDeclaration::Enum(e) => Some(e),
            _ => None,
        })
    }

    pub fn typedefs(&self) -> impl Iterator<Item = &TypedefDecl> {
        self.declarations.iter().filter_map(|d| match d {
            NativeDeclaration::Typedef(t) => Some(t),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.declarations.iter().filter_map(|d| match d {
            NativeDeclaration::Function(f) => Some(f),
            _ => None,
        })
    }

    /// Find a struct by its raw (tag) name.
    pub fn find_struct(&self, name: &str) -> Option<&StructDecl> {
        self.structs().find(|s| s.name == name)
    }

    pub fn find_typedef(&self, name: &str) -> Option<&TypedefDecl> {
        self.typedefs().find(|t| t.name == name)
    }
}

/// One top-level native declaration.
#[derive(Debug, Clone)]
pub enum NativeDeclaration {
    Enum(EnumDecl),
    Struct(StructDecl),
    Typedef(TypedefDecl),
    Function(FunctionDecl),
}

impl NativeDeclaration {
    pub fn name(&self) -> &str {
        match self {
            NativeDeclaration::Enum(e) => &e.name,
            NativeDeclaration::Struct(s) => &s.name,
            NativeDeclaration::Typedef(t) => &t.name,
            NativeDeclaration::Function(f) => &f.name,
        }
    }

    pub fn source(&self) -> &SourceInfo {
        match self {
            NativeDeclaration::Enum(e) => &e.source,
            NativeDeclaration::Struct(s) => &s.source,
            NativeDeclaration::Typedef(t) => &t.source,
            NativeDeclaration::Function(f) => &f.source,
        }
    }
}

/// Where a declaration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// Header path relative to the source root, `/`-separated.
    pub file: PathBuf,
    /// The source line immediately preceding the declaration, trimmed.
    pub marker: Option<String>,
}

impl SourceInfo {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            marker: None,
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }
}

/// A C struct or union definition.
#[derive(Debug, Clone)]
pub struct StructDecl {
    /// Tag name as spelled in the header (`_cef_app_t`), or the typedef name
    /// for anonymous records.
    pub name: String,
    pub source: SourceInfo,
    pub fields: Vec<FieldDescriptor>,
    pub is_union: bool,
}

/// A single struct field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: CType,
    /// Present iff the field is a function pointer.
    pub signature: Option<MethodSignature>,
}

impl FieldDescriptor {
    pub fn data(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
            signature: None,
        }
    }

    pub fn callable(name: impl Into<String>, signature: MethodSignature) -> Self {
        Self {
            name: name.into(),
            ty: CType::Ptr {
                pointee: Box::new(CType::FnPtr {
                    return_type: Box::new(signature.return_type.clone()),
                    params: signature.params.iter().map(|p| p.ty.clone()).collect(),
                    calling_convention: signature.calling_convention,
                }),
                is_const: false,
            },
            signature: Some(signature),
        }
    }

    pub fn is_function_pointer(&self) -> bool {
        self.signature.is_some()
    }
}

/// Parameters, return type and calling convention of a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub params: Vec<ParamDescriptor>,
    pub return_type: CType,
    pub calling_convention: CallConv,
}

/// A named parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: CType,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A C enum definition.
#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub source: SourceInfo,
    /// The underlying integer type (e.g. `CType::U32`).
    pub underlying: CType,
    pub items: Vec<EnumItem>,
}

/// A single enum item.
#[derive(Debug, Clone)]
pub struct EnumItem {
    pub name: String,
    pub value: i64,
    /// Raw tokens of the initializer expression, if one was written.
    pub expression: Option<String>,
}

impl EnumItem {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            expression: None,
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

/// A C typedef.
#[derive(Debug, Clone)]
pub struct TypedefDecl {
    pub name: String,
    pub source: SourceInfo,
    pub aliased: CType,
    /// The aliased type as spelled in the header (`struct _cef_app_t`).
    pub aliased_spelling: String,
}

/// An externally linked C function.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub source: SourceInfo,
    pub signature: MethodSignature,
}

/// Calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallConv {
    /// Platform default (cdecl on most platforms).
    Cdecl,
    /// stdcall (Windows x86).
    Stdcall,
    /// Fastcall.
    Fastcall,
}

/// A C type — our intermediate representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    Void,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    ISize,
    USize,
    /// Pointer to a type. `is_const` indicates `const T*`.
    Ptr {
        pointee: Box<CType>,
        is_const: bool,
    },
    /// Fixed-size array: `T[N]`.
    Array {
        element: Box<CType>,
        len: usize,
    },
    /// A named type reference (struct, enum, typedef).
    /// For typedefs, `resolved` holds the canonical type from clang, used
    /// when the name is not mirrored by the generator.
    Named {
        name: String,
        resolved: Option<Box<CType>>,
    },
    /// A function pointer type.
    FnPtr {
        return_type: Box<CType>,
        params: Vec<CType>,
        calling_convention: CallConv,
    },
}

impl CType {
    pub fn named(name: impl Into<String>) -> Self {
        CType::Named {
            name: name.into(),
            resolved: None,
        }
    }

    /// A named typedef with a canonical fallback.
    pub fn alias(name: impl Into<String>, resolved: CType) -> Self {
        CType::Named {
            name: name.into(),
            resolved: Some(Box::new(resolved)),
        }
    }

    pub fn ptr(pointee: CType) -> Self {
        CType::Ptr {
            pointee: Box::new(pointee),
            is_const: false,
        }
    }

    pub fn const_ptr(pointee: CType) -> Self {
        CType::Ptr {
            pointee: Box::new(pointee),
            is_const: true,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            CType::Bool
                | CType::I8
                | CType::U8
                | CType::I16
                | CType::U16
                | CType::I32
                | CType::U32
                | CType::I64
                | CType::U64
                | CType::F32
                | CType::F64
                | CType::ISize
                | CType::USize
        )
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CType::Void)
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::Ptr { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    /// Number of pointer levels wrapped around the innermost type.
    pub fn indirection(&self) -> usize {
        match self {
            CType::Ptr { pointee, .. } => 1 + pointee.indirection(),
            _ => 0,
        }
    }

    /// The type with every pointer level removed.
    pub fn innermost(&self) -> &CType {
        match self {
            CType::Ptr { pointee, .. } => pointee.innermost(),
            other => other,
        }
    }

    pub fn is_function_pointer(&self) -> bool {
        matches!(self.pointee(), Some(CType::FnPtr { .. })) || matches!(self, CType::FnPtr { .. })
    }

    /// Name of the named type, if this is one.
    pub fn name(&self) -> Option<&str> {
        match self {
            CType::Named { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether the outermost type is `size_t` (or another pointer-sized
    /// unsigned integer).
    pub fn is_pointer_sized_unsigned(&self) -> bool {
        match self {
            CType::USize => true,
            CType::Named { name, .. } => matches!(name.as_str(), "size_t" | "uintptr_t"),
            _ => false,
        }
    }
}

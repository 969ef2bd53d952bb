//! Intermediate code model shared by every emission stage.
//!
//! A file holds namespaces, namespaces hold types, types hold members.
//! Types are spelled structurally ([`TypeRef`]) so the symbol model can
//! check them; method bodies are plain statements.

pub mod cil;
pub mod csharp;

use bitflags::bitflags;

/// One generated source file.
#[derive(Debug, Clone, Default)]
pub struct CodeFile {
    /// Comment lines written before anything else.
    pub header: Vec<String>,
    pub usings: Vec<String>,
    pub namespaces: Vec<Namespace>,
}

impl CodeFile {
    pub fn types(&self) -> impl Iterator<Item = (&str, &TypeDecl)> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.types.iter().map(move |t| (ns.name.as_str(), t)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Namespace {
    pub name: String,
    pub types: Vec<TypeDecl>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }
}

bitflags! {
    /// Declaration modifiers, rendered in a fixed order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const PUBLIC = 1 << 0;
        const PRIVATE = 1 << 1;
        const PROTECTED = 1 << 2;
        const INTERNAL = 1 << 3;
        const STATIC = 1 << 4;
        const SEALED = 1 << 5;
        const ABSTRACT = 1 << 6;
        const READONLY = 1 << 7;
        const EXTERN = 1 << 8;
        const UNSAFE = 1 << 9;
        const VIRTUAL = 1 << 10;
        const OVERRIDE = 1 << 11;
        const PARTIAL = 1 << 12;
    }
}

/// A structurally spelled type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeRef {
    Void,
    /// A keyword or type name (`int`, `IntPtr`, `cef_app_t`).
    Named(String),
    Pointer(Box<TypeRef>),
    Array(Box<TypeRef>),
    Generic(String, Vec<TypeRef>),
    /// `delegate* unmanaged[Conv]<params..., ret>`.
    FunctionPointer {
        convention: String,
        params: Vec<TypeRef>,
        ret: Box<TypeRef>,
    },
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn pointer(self) -> Self {
        TypeRef::Pointer(Box::new(self))
    }

    pub fn array(self) -> Self {
        TypeRef::Array(Box::new(self))
    }

    pub fn void_ptr() -> Self {
        TypeRef::Void.pointer()
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    /// Every type name this reference mentions.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeRef::Void => {}
            TypeRef::Named(n) => out.push(n),
            TypeRef::Pointer(inner) | TypeRef::Array(inner) => inner.collect_names(out),
            TypeRef::Generic(n, args) => {
                out.push(n);
                for a in args {
                    a.collect_names(out);
                }
            }
            TypeRef::FunctionPointer { params, ret, .. } => {
                for p in params {
                    p.collect_names(out);
                }
                ret.collect_names(out);
            }
        }
    }
}

/// `[Name(args)]`, optionally only under a compilation symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub args: Vec<String>,
    /// When set, the attribute is emitted only if the symbol is not defined.
    pub unless: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            unless: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn unless(mut self, symbol: impl Into<String>) -> Self {
        self.unless = Some(symbol.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub modifiers: Modifiers,
    pub attributes: Vec<Attribute>,
    /// Base class, or underlying type of an enum.
    pub base: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub comment: Vec<String>,
    pub members: Vec<Member>,
}

impl TypeDecl {
    pub fn new(name: impl Into<String>, kind: TypeKind, modifiers: Modifiers) -> Self {
        Self {
            name: name.into(),
            kind,
            modifiers,
            attributes: Vec::new(),
            base: None,
            interfaces: Vec::new(),
            comment: Vec::new(),
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Member {
    Field(Field),
    Method(Method),
    Constructor(Constructor),
    Property(Property),
    Delegate(DelegateDecl),
    EnumItem(EnumItem),
    Comment(Vec<String>),
    Conditional(ConditionalGroup),
}

/// A contiguous run of members compiled only under a symbol.
#[derive(Debug, Clone, Default)]
pub struct ConditionalGroup {
    pub symbol: String,
    pub then: Vec<Member>,
    pub otherwise: Vec<Member>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    pub attributes: Vec<Attribute>,
    /// `fixed T name[N]` buffer length.
    pub fixed_len: Option<usize>,
    pub initializer: Option<String>,
    pub comment: Vec<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeRef, modifiers: Modifiers) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers,
            attributes: Vec::new(),
            fixed_len: None,
            initializer: None,
            comment: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamDirection {
    In,
    Ref,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub direction: ParamDirection,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: ParamDirection::In,
        }
    }

    pub fn by_ref(mut self) -> Self {
        self.direction = ParamDirection::Ref;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub ret: TypeRef,
    pub params: Vec<Param>,
    pub modifiers: Modifiers,
    pub attributes: Vec<Attribute>,
    /// Explicit interface implementation (`bool IFoo.Bar()`).
    pub explicit_interface: Option<TypeRef>,
    /// Native function-pointer field this method corresponds to.
    pub native_name: Option<String>,
    /// `None` renders a declaration terminated by `;`.
    pub body: Option<Vec<Stmt>>,
    pub comment: Vec<String>,
}

impl Method {
    pub fn new(name: impl Into<String>, ret: TypeRef, modifiers: Modifiers) -> Self {
        Self {
            name: name.into(),
            ret,
            params: Vec::new(),
            modifiers,
            attributes: Vec::new(),
            explicit_interface: None,
            native_name: None,
            body: None,
            comment: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Constructor {
    pub modifiers: Modifiers,
    pub params: Vec<Param>,
    /// `base(...)` or `this(...)`.
    pub initializer: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    pub attributes: Vec<Attribute>,
    pub getter: Option<Vec<Stmt>>,
    pub setter: Option<Vec<Stmt>>,
    pub comment: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DelegateDecl {
    pub name: String,
    pub ret: TypeRef,
    pub params: Vec<Param>,
    pub modifiers: Modifiers,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone)]
pub struct EnumItem {
    pub name: String,
    pub value: String,
    pub comment: Vec<String>,
}

/// A statement inside a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Line(String),
    Blank,
    /// `head { body }`.
    Block { head: String, body: Vec<Stmt> },
    /// `#if symbol ... #else ... #endif`.
    Conditional {
        symbol: String,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

impl Stmt {
    pub fn line(text: impl Into<String>) -> Self {
        Stmt::Line(text.into())
    }

    pub fn block(head: impl Into<String>, body: Vec<Stmt>) -> Self {
        Stmt::Block {
            head: head.into(),
            body,
        }
    }
}

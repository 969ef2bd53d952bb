//! Instruction-level renderer: IR → ILAsm source.
//!
//! Only the narrow routines the override detector emits are expressible
//! here; the opcode set is closed.

use std::fmt::Write as _;

use super::ParamDirection;

/// A class fragment whose methods are merged into the compiled wrapper.
#[derive(Debug, Clone)]
pub struct IlClass {
    pub header: Vec<String>,
    /// Full name (`Cef.CefApp`).
    pub name: String,
    pub extends: Option<IlType>,
    pub implements: Vec<IlType>,
    pub methods: Vec<IlMethod>,
}

#[derive(Debug, Clone)]
pub struct IlMethod {
    /// `Cef.ICefAppPrivate.IsOverriddenOnClose` for explicit implementations.
    pub name: String,
    pub ret: IlType,
    pub params: Vec<IlType>,
    pub custom: Vec<IlCustom>,
    /// Interface method this body implements.
    pub overrides: Option<IlMethodRef>,
    pub max_stack: u16,
    pub body: Vec<Instr>,
}

/// A `.custom` attribute, optionally under an ILAsm preprocessor test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlCustom {
    pub attribute: IlType,
    pub args: Vec<String>,
    pub condition: Option<IlCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlCondition {
    pub symbol: String,
    pub defined: bool,
}

/// A method reference as it appears after `ldftn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlMethodRef {
    pub owner: IlType,
    pub name: String,
    pub ret: IlType,
    pub params: Vec<IlType>,
    pub instance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IlType {
    /// `void`, `int32`, `string`, `native int`, ...
    Primitive(String),
    Class(String),
    ValueType(String),
    Pointer(Box<IlType>),
    Array(Box<IlType>),
    ByRef(Box<IlType>),
    /// `class Name`N<args>`.
    GenericInstance(String, Vec<IlType>),
}

impl IlType {
    pub fn primitive(name: &str) -> Self {
        IlType::Primitive(name.to_string())
    }

    pub fn with_direction(self, direction: ParamDirection) -> Self {
        match direction {
            ParamDirection::In => self,
            ParamDirection::Ref | ParamDirection::Out => IlType::ByRef(Box::new(self)),
        }
    }
}

/// The operations an override check is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    LoadThis,
    /// Resolve the instance's dispatch target for a virtual method.
    LoadVirtualTarget(IlMethodRef),
    /// Load the declared (non-virtual) target of a method.
    LoadDeclaredTarget(IlMethodRef),
    CompareEqual,
    LoadZero,
    Return,
}

/// Opcode spelled for each operation.
fn mnemonic(instr: &Instr) -> &'static str {
    match instr {
        Instr::LoadThis => "ldarg.0",
        Instr::LoadVirtualTarget(_) => "ldvirtftn",
        Instr::LoadDeclaredTarget(_) => "ldftn",
        Instr::CompareEqual => "ceq",
        Instr::LoadZero => "ldc.i4.0",
        Instr::Return => "ret",
    }
}

/// ILAsm name of a C# built-in type keyword.
pub fn primitive_name(keyword: &str) -> Option<&'static str> {
    Some(match keyword {
        "void" => "void",
        "bool" => "bool",
        "char" => "char",
        "sbyte" => "int8",
        "byte" => "uint8",
        "short" => "int16",
        "ushort" => "uint16",
        "int" => "int32",
        "uint" => "uint32",
        "long" => "int64",
        "ulong" => "uint64",
        "float" => "float32",
        "double" => "float64",
        "string" => "string",
        "object" => "object",
        "IntPtr" | "nint" => "native int",
        "UIntPtr" | "nuint" => "native uint",
        _ => return None,
    })
}

pub fn type_name(ty: &IlType) -> String {
    match ty {
        IlType::Primitive(p) => p.clone(),
        IlType::Class(n) => format!("class {n}"),
        IlType::ValueType(n) => format!("valuetype {n}"),
        IlType::Pointer(inner) => format!("{}*", type_name(inner)),
        IlType::Array(inner) => format!("{}[]", type_name(inner)),
        IlType::ByRef(inner) => format!("{}&", type_name(inner)),
        IlType::GenericInstance(n, args) => {
            let args: Vec<String> = args.iter().map(type_name).collect();
            format!("class {n}`{}<{}>", args.len(), args.join(", "))
        }
    }
}

/// Type spec without the `class` keyword, as used after `implements` and in
/// `.override` targets.
fn type_spec(ty: &IlType) -> String {
    match ty {
        IlType::Class(n) => n.clone(),
        other => type_name(other),
    }
}

fn method_ref(m: &IlMethodRef) -> String {
    let params: Vec<String> = m.params.iter().map(type_name).collect();
    format!(
        "{}{} {}::{}({})",
        if m.instance { "instance " } else { "" },
        type_name(&m.ret),
        type_spec(&m.owner),
        m.name,
        params.join(", ")
    )
}

fn instruction(instr: &Instr) -> String {
    match instr {
        Instr::LoadVirtualTarget(m) | Instr::LoadDeclaredTarget(m) => {
            format!("{} {}", mnemonic(instr), method_ref(m))
        }
        _ => mnemonic(instr).to_string(),
    }
}

/// Render one class fragment. Pure function of the IR.
pub fn render(class: &IlClass) -> String {
    let mut out = String::new();
    for line in &class.header {
        if line.is_empty() {
            out.push_str("//\n");
        } else {
            let _ = writeln!(out, "// {line}");
        }
    }
    if !class.header.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, ".class public auto ansi beforefieldinit {}", class.name);
    if let Some(base) = &class.extends {
        let _ = writeln!(out, "\textends {}", type_name(base));
    }
    if !class.implements.is_empty() {
        let specs: Vec<String> = class.implements.iter().map(type_spec).collect();
        let _ = writeln!(out, "\timplements {}", specs.join(", "));
    }
    out.push_str("{\n");
    for (i, method) in class.methods.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        render_method(&mut out, method);
    }
    out.push_str("}\n");
    out
}

fn render_method(out: &mut String, m: &IlMethod) {
    let params: Vec<String> = m.params.iter().map(type_name).collect();
    let _ = writeln!(out, "\t.method private hidebysig newslot virtual final");
    let _ = writeln!(
        out,
        "\t\tinstance {} {}({}) cil managed",
        type_name(&m.ret),
        m.name,
        params.join(", ")
    );
    out.push_str("\t{\n");
    for custom in &m.custom {
        if let Some(cond) = &custom.condition {
            let directive = if cond.defined { "#ifdef" } else { "#ifndef" };
            let _ = writeln!(out, "{directive} {}", cond.symbol);
        }
        let kinds: Vec<&str> = custom.args.iter().map(|_| "string").collect();
        let values: Vec<String> = custom
            .args
            .iter()
            .map(|a| format!("string('{}')", a.replace('\'', "\\'")))
            .collect();
        let _ = writeln!(
            out,
            "\t\t.custom instance void {}::.ctor({}) = {{ {} }}",
            type_spec(&custom.attribute),
            kinds.join(", "),
            values.join(" ")
        );
        if custom.condition.is_some() {
            out.push_str("#endif\n");
        }
    }
    if let Some(target) = &m.overrides {
        let _ = writeln!(out, "\t\t.override {}::{}", type_spec(&target.owner), target.name);
    }
    let _ = writeln!(out, "\t\t.maxstack {}", m.max_stack);
    for instr in &m.body {
        let _ = writeln!(out, "\t\t{}", instruction(instr));
    }
    out.push_str("\t}\n");
}

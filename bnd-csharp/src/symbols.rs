//! Symbol model — the type-checked view of generated sources.
//!
//! Built directly from the IR of previously generated units. Every type
//! reference must resolve to a generated type, a C# built-in, or a type the
//! runtime library provides; duplicate types and duplicate members are
//! reported the way a compiler would. Any diagnostic fails the compilation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::GenError;
use crate::ir::*;
use crate::output::GeneratedUnit;

/// C# keywords usable as type names.
const BUILTIN_TYPES: &[&str] = &[
    "bool", "byte", "sbyte", "short", "ushort", "int", "uint", "long", "ulong", "float", "double",
    "decimal", "char", "string", "object", "nint", "nuint",
];

/// Base class library types the generated code may name.
const FRAMEWORK_TYPES: &[&str] = &[
    "IntPtr",
    "UIntPtr",
    "IDisposable",
    "Delegate",
    "Exception",
    "Type",
    "GCHandle",
    "ValueType",
];

#[derive(Debug, Clone)]
pub struct FieldSymbol {
    pub name: String,
    pub ty: TypeRef,
    pub fixed_len: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct MethodSymbol {
    pub name: String,
    pub ret: TypeRef,
    pub params: Vec<Param>,
    pub modifiers: Modifiers,
    pub explicit_interface: Option<TypeRef>,
    pub native_name: Option<String>,
    pub has_body: bool,
}

impl MethodSymbol {
    pub fn is_virtual(&self) -> bool {
        self.modifiers
            .intersects(Modifiers::VIRTUAL | Modifiers::OVERRIDE | Modifiers::ABSTRACT)
    }

    fn signature_key(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{:?} {}", p.direction, csharp::type_ref(&p.ty)))
            .collect();
        let owner = self
            .explicit_interface
            .as_ref()
            .map(csharp::type_ref)
            .unwrap_or_default();
        format!("{owner}.{}({})", self.name, params.join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct PropertySymbol {
    pub name: String,
    pub ty: TypeRef,
    pub readable: bool,
    pub writable: bool,
}

/// One type of the compiled sources, with its active members.
#[derive(Debug, Clone)]
pub struct TypeSymbol {
    pub namespace: String,
    pub name: String,
    pub kind: TypeKind,
    pub base: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub fields: Vec<FieldSymbol>,
    pub methods: Vec<MethodSymbol>,
    pub properties: Vec<PropertySymbol>,
    /// Delegates declared inside the type.
    pub nested: Vec<DelegateDecl>,
    pub unit: PathBuf,
}

impl TypeSymbol {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn first_field(&self) -> Option<&FieldSymbol> {
        self.fields.first()
    }

    pub fn method(&self, name: &str) -> Option<&MethodSymbol> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.explicit_interface.is_none())
    }

    pub fn method_by_native_name(&self, native: &str) -> Option<&MethodSymbol> {
        self.methods
            .iter()
            .find(|m| m.native_name.as_deref() == Some(native))
    }

    /// Whether the type lists `interface` among its interfaces.
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces
            .iter()
            .any(|i| matches!(i, TypeRef::Named(n) if n == interface || n.ends_with(&format!(".{interface}"))))
    }
}

/// The flattened, sorted and checked set of types.
#[derive(Debug, Default)]
pub struct SymbolModel {
    symbols: Vec<TypeSymbol>,
    by_full_name: BTreeMap<String, usize>,
    by_name: BTreeMap<String, Vec<usize>>,
}

impl SymbolModel {
    pub fn symbols(&self) -> &[TypeSymbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Types declared in `namespace`, in name order.
    pub fn types_in<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a TypeSymbol> {
        self.symbols.iter().filter(move |s| s.namespace == namespace)
    }

    /// Look a type up by full name, or by simple name when unambiguous.
    pub fn get(&self, name: &str) -> Option<&TypeSymbol> {
        if let Some(&i) = self.by_full_name.get(name) {
            return Some(&self.symbols[i]);
        }
        match self.by_name.get(name).map(Vec::as_slice) {
            Some([i]) => Some(&self.symbols[*i]),
            _ => None,
        }
    }
}

/// What a compilation may assume beyond the sources themselves.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions<'a> {
    /// Conditional-compilation symbols considered defined.
    pub defines: &'a [String],
    /// Type names supplied by the runtime library.
    pub provided: &'a [String],
    /// Name reported in diagnostics.
    pub tool: &'static str,
}

/// Compile the C# units among `units` into a symbol model.
pub fn compile(units: &[GeneratedUnit], options: CompileOptions<'_>) -> Result<SymbolModel> {
    let namespaces: Vec<(&Path, &Namespace)> = units
        .iter()
        .filter_map(|u| u.code().map(|f| (u.path.as_path(), f)))
        .flat_map(|(path, file)| file.namespaces.iter().map(move |ns| (path, ns)))
        .collect();

    let collected: Mutex<Vec<TypeSymbol>> = Mutex::new(Vec::new());
    namespaces.par_iter().for_each(|(path, ns)| {
        let flat: Vec<TypeSymbol> = ns
            .types
            .iter()
            .map(|ty| flatten(ty, &ns.name, path, options.defines))
            .collect();
        collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(flat);
    });
    let mut symbols = collected
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    symbols.sort_by(|a, b| {
        a.full_name()
            .cmp(&b.full_name())
            .then_with(|| a.unit.cmp(&b.unit))
    });

    let mut diagnostics = Vec::new();
    let mut by_full_name = BTreeMap::new();
    let mut by_name: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, symbol) in symbols.iter().enumerate() {
        let full = symbol.full_name();
        if let Some(&first) = by_full_name.get(&full) {
            let first: &TypeSymbol = &symbols[first];
            diagnostics.push(format!(
                "{}: error CS0101: namespace `{}` already contains a definition for `{}` (first in {})",
                symbol.unit.display(),
                symbol.namespace,
                symbol.name,
                first.unit.display()
            ));
            continue;
        }
        by_full_name.insert(full, i);
        by_name.entry(symbol.name.clone()).or_default().push(i);
    }

    let model = SymbolModel {
        symbols,
        by_full_name,
        by_name,
    };
    let checker = Checker {
        model: &model,
        provided: options.provided.iter().map(String::as_str).collect(),
    };
    for symbol in &model.symbols {
        checker.check_type(symbol, &mut diagnostics);
    }

    if !diagnostics.is_empty() {
        return Err(GenError::ToolDiagnostics {
            tool: options.tool,
            diagnostics,
        }
        .into());
    }
    info!(
        tool = options.tool,
        units = units.len(),
        types = model.len(),
        "compiled symbol model"
    );
    Ok(model)
}

/// Reduce a type declaration to its active members.
fn flatten(ty: &TypeDecl, namespace: &str, unit: &Path, defines: &[String]) -> TypeSymbol {
    let mut symbol = TypeSymbol {
        namespace: namespace.to_string(),
        name: ty.name.clone(),
        kind: ty.kind,
        base: ty.base.clone(),
        interfaces: ty.interfaces.clone(),
        fields: Vec::new(),
        methods: Vec::new(),
        properties: Vec::new(),
        nested: Vec::new(),
        unit: unit.to_path_buf(),
    };
    collect_members(&ty.members, defines, &mut symbol);
    debug!(
        name = %symbol.full_name(),
        fields = symbol.fields.len(),
        methods = symbol.methods.len(),
        "collected symbol"
    );
    symbol
}

fn collect_members(members: &[Member], defines: &[String], symbol: &mut TypeSymbol) {
    for member in members {
        match member {
            Member::Field(f) => symbol.fields.push(FieldSymbol {
                name: f.name.clone(),
                ty: f.ty.clone(),
                fixed_len: f.fixed_len,
            }),
            Member::Method(m) => symbol.methods.push(MethodSymbol {
                name: m.name.clone(),
                ret: m.ret.clone(),
                params: m.params.clone(),
                modifiers: m.modifiers,
                explicit_interface: m.explicit_interface.clone(),
                native_name: m.native_name.clone(),
                has_body: m.body.is_some(),
            }),
            Member::Property(p) => symbol.properties.push(PropertySymbol {
                name: p.name.clone(),
                ty: p.ty.clone(),
                readable: p.getter.is_some(),
                writable: p.setter.is_some(),
            }),
            Member::Delegate(d) => symbol.nested.push(d.clone()),
            Member::Conditional(group) => {
                let active = if defines.contains(&group.symbol) {
                    &group.then
                } else {
                    &group.otherwise
                };
                collect_members(active, defines, symbol);
            }
            Member::Constructor(_) | Member::EnumItem(_) | Member::Comment(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Type checking
// ---------------------------------------------------------------------------

struct Checker<'a> {
    model: &'a SymbolModel,
    provided: BTreeSet<&'a str>,
}

impl Checker<'_> {
    fn check_type(&self, symbol: &TypeSymbol, out: &mut Vec<String>) {
        let at = |what: &str| format!("{}: {}.{what}", symbol.unit.display(), symbol.full_name());

        if let Some(base) = &symbol.base {
            self.check_ref(base, symbol, &at("<base>"), out);
        }
        for iface in &symbol.interfaces {
            self.check_ref(iface, symbol, &at("<interface>"), out);
        }

        let mut member_names: BTreeMap<&str, &'static str> = BTreeMap::new();
        for f in &symbol.fields {
            if conflicts(&mut member_names, &f.name, "field") {
                out.push(already_defined(&at(&f.name), &f.name));
            }
            if f.ty.is_void() {
                out.push(format!("{}: error CS0670: field cannot have void type", at(&f.name)));
            }
            self.check_ref(&f.ty, symbol, &at(&f.name), out);
        }
        for p in &symbol.properties {
            if conflicts(&mut member_names, &p.name, "property") {
                out.push(already_defined(&at(&p.name), &p.name));
            }
            self.check_ref(&p.ty, symbol, &at(&p.name), out);
        }

        let mut signatures = BTreeSet::new();
        for m in &symbol.methods {
            if m.explicit_interface.is_none() && conflicts(&mut member_names, &m.name, "method") {
                out.push(already_defined(&at(&m.name), &m.name));
            }
            if !signatures.insert(m.signature_key()) {
                out.push(format!(
                    "{}: error CS0111: member `{}` is already defined with the same parameter types",
                    at(&m.name),
                    m.name
                ));
            }
            self.check_ref(&m.ret, symbol, &at(&m.name), out);
            for p in &m.params {
                if p.ty.is_void() {
                    out.push(format!(
                        "{}: error CS1536: invalid parameter type void for `{}`",
                        at(&m.name),
                        p.name
                    ));
                }
                self.check_ref(&p.ty, symbol, &at(&m.name), out);
            }
            if let Some(iface) = &m.explicit_interface {
                self.check_ref(iface, symbol, &at(&m.name), out);
            }
        }
        for d in &symbol.nested {
            self.check_ref(&d.ret, symbol, &at(&d.name), out);
            for p in &d.params {
                self.check_ref(&p.ty, symbol, &at(&d.name), out);
            }
        }
    }

    fn check_ref(&self, ty: &TypeRef, scope: &TypeSymbol, at: &str, out: &mut Vec<String>) {
        for name in ty.names() {
            if !self.resolves(name, scope) {
                out.push(format!(
                    "{at}: error CS0246: the type or namespace name `{name}` could not be found"
                ));
            }
        }
    }

    fn resolves(&self, name: &str, scope: &TypeSymbol) -> bool {
        BUILTIN_TYPES.contains(&name)
            || FRAMEWORK_TYPES.contains(&name)
            || self.provided.contains(name)
            || scope.nested.iter().any(|d| d.name == name)
            || self.model.by_full_name.contains_key(name)
            || self.model.by_name.contains_key(name)
    }
}

/// Record a member name; methods may overload each other, nothing else may
/// share a name.
fn conflicts<'s>(names: &mut BTreeMap<&'s str, &'static str>, name: &'s str, kind: &'static str) -> bool {
    match names.insert(name, kind) {
        Some(previous) => previous != "method" || kind != "method",
        None => false,
    }
}

fn already_defined(at: &str, name: &str) -> String {
    format!("{at}: error CS0102: the type already contains a definition for `{name}`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::UnitContent;

    fn unit(path: &str, ns: &str, types: Vec<TypeDecl>) -> GeneratedUnit {
        GeneratedUnit {
            path: PathBuf::from(path),
            sources: BTreeSet::new(),
            content: UnitContent::Source(CodeFile {
                header: Vec::new(),
                usings: Vec::new(),
                namespaces: vec![Namespace {
                    name: ns.to_string(),
                    types,
                }],
            }),
        }
    }

    fn options() -> CompileOptions<'static> {
        CompileOptions {
            defines: &[],
            provided: &[],
            tool: "test",
        }
    }

    #[test]
    fn unknown_type_is_a_diagnostic() {
        let mut ty = TypeDecl::new("a_t", TypeKind::Struct, Modifiers::PUBLIC);
        ty.members.push(Member::Field(Field::new(
            "b",
            TypeRef::named("missing_t").pointer(),
            Modifiers::PUBLIC,
        )));
        let err = compile(&[unit("A.cs", "N", vec![ty])], options()).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("CS0246"), "{text}");
        assert!(text.contains("missing_t"), "{text}");
    }

    #[test]
    fn duplicate_types_are_reported_once_per_copy() {
        let a = TypeDecl::new("a_t", TypeKind::Struct, Modifiers::PUBLIC);
        let err = compile(
            &[
                unit("A.cs", "N", vec![a.clone()]),
                unit("B.cs", "N", vec![a]),
            ],
            options(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("CS0101"));
    }

    #[test]
    fn inactive_branch_is_not_collected() {
        let mut ty = TypeDecl::new("a_t", TypeKind::Struct, Modifiers::PUBLIC);
        ty.members.push(Member::Conditional(ConditionalGroup {
            symbol: "LEGACY".to_string(),
            then: vec![Member::Field(Field::new(
                "legacy",
                TypeRef::named("nowhere_t"),
                Modifiers::PUBLIC,
            ))],
            otherwise: vec![Member::Field(Field::new(
                "modern",
                TypeRef::named("int"),
                Modifiers::PUBLIC,
            ))],
        }));
        let model = compile(&[unit("A.cs", "N", vec![ty])], options()).unwrap();
        let symbol = model.get("N.a_t").unwrap();
        assert_eq!(symbol.fields.len(), 1);
        assert_eq!(symbol.fields[0].name, "modern");
    }
}

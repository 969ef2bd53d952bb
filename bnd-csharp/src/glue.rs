//! Glue generator — forwarding classes between hand-written hosts and the
//! generated handlers.
//!
//! A hand-written partial class carrying the glue marker is a host. Each
//! `internal` host method named like a handler's virtual method (same name,
//! same arity) is forwarded to from a generated handler subclass; an
//! `internal bool Avoid<Method>()` gate on the host turns the callback off.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::classify::WrapperRole;
use crate::context::PipelineContext;
use crate::error::shape_bail;
use crate::extract::collect_files;
use crate::ir::*;
use crate::output::{self, GeneratedUnit, sources_of};
use crate::symbols::{MethodSymbol, SymbolModel, TypeSymbol};
use crate::wrapper::handler::{override_query, private_interface};
use crate::wrapper::return_or_discard;

/// The kinds of host the runtime library ships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlueHost {
    Application,
    WebView,
    Other(String),
}

impl GlueHost {
    pub fn from_name(name: &str) -> Self {
        if name.ends_with("Application") {
            GlueHost::Application
        } else if name.ends_with("WebView") {
            GlueHost::WebView
        } else {
            GlueHost::Other(name.to_string())
        }
    }

    /// Prefix of the forwarding classes generated for this host.
    pub fn prefix(&self) -> &str {
        match self {
            GlueHost::Application => "App",
            GlueHost::WebView => "WebView",
            GlueHost::Other(name) => name,
        }
    }
}

/// An `internal` method of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMethod {
    pub name: String,
    pub ret: String,
    pub arity: usize,
}

/// A parsed hand-written host file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlueSource {
    /// Relative to the source root.
    pub path: PathBuf,
    pub namespace: Option<String>,
    pub host: String,
    pub methods: Vec<HostMethod>,
    /// Methods named by an `Avoid<Method>()` gate.
    pub gates: BTreeSet<String>,
}

/// Read every `.cs` file under `dir` carrying the glue marker. A missing
/// directory has no hosts.
pub fn scan(dir: &Path, root: &Path, marker: &str) -> Result<Vec<GlueSource>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no hand-written sources");
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for file in collect_files(dir, "cs")? {
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("reading {}", file.display()))?;
        if !text.contains(marker) {
            continue;
        }
        let relative = file.strip_prefix(root).unwrap_or(&file).to_path_buf();
        match parse(relative, &text) {
            Some(source) => out.push(source),
            None => debug!(file = %file.display(), "marker without a partial class"),
        }
    }
    Ok(out)
}

/// Extract the host class, its `internal` methods and its gates.
pub fn parse(path: PathBuf, text: &str) -> Option<GlueSource> {
    let mut namespace = None;
    let mut host = None;
    let mut methods = Vec::new();
    let mut gates = BTreeSet::new();
    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("namespace ") {
            if namespace.is_none() {
                namespace = Some(rest.trim_end_matches([';', '{', ' ']).to_string());
            }
        } else if host.is_none()
            && let Some(pos) = line.find("partial class ")
        {
            let rest = &line[pos + "partial class ".len()..];
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                host = Some(name);
            }
        } else if let Some(method) = line.strip_prefix("internal ").and_then(parse_method) {
            match method.name.strip_prefix("Avoid") {
                Some(gated) if method.ret == "bool" && method.arity == 0 => {
                    gates.insert(gated.to_string());
                }
                _ => methods.push(method),
            }
        }
    }
    Some(GlueSource {
        path,
        namespace,
        host: host?,
        methods,
        gates,
    })
}

/// `void OnClose(CefBrowser browser)` → name, return type, arity.
fn parse_method(decl: &str) -> Option<HostMethod> {
    let open = decl.find('(')?;
    let close = decl.rfind(')')?;
    let head: Vec<&str> = decl[..open].split_whitespace().collect();
    let (name, modifiers_and_ret) = head.split_last()?;
    let ret: Vec<&str> = modifiers_and_ret
        .iter()
        .copied()
        .filter(|t| !matches!(*t, "static" | "virtual" | "override" | "unsafe" | "async"))
        .collect();
    if ret.is_empty() || ret.contains(&"class") || ret.contains(&"=") {
        return None;
    }
    let params = decl.get(open + 1..close)?;
    Some(HostMethod {
        name: name.to_string(),
        ret: ret.join(" "),
        arity: parameter_count(params),
    })
}

/// Parameters in a C# parameter list. Commas inside generic arguments,
/// tuples and array ranks do not separate parameters.
fn parameter_count(params: &str) -> usize {
    if params.trim().is_empty() {
        return 0;
    }
    let mut depth = 0usize;
    let mut count = 1;
    for c in params.chars() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => count += 1,
            _ => {}
        }
    }
    count
}

/// Forwarding classes, the host's private interface and the partial host.
pub fn generate(
    sources: &[GlueSource],
    symbols: &SymbolModel,
    units: &[GeneratedUnit],
    ctx: &PipelineContext,
) -> Result<Vec<GeneratedUnit>> {
    let handlers: Vec<&TypeSymbol> = ctx
        .classes
        .structs()
        .into_iter()
        .filter(|(binding, _)| ctx.classes.role(binding) == Some(WrapperRole::Handler))
        .filter_map(|(binding, _)| {
            let managed = ctx.names.type_name(binding);
            symbols.get(&format!("{}.{managed}", ctx.output.namespace))
        })
        .collect();

    let mut out = Vec::new();
    for source in sources {
        let host = GlueHost::from_name(&source.host);
        let mut forwarded: BTreeMap<&str, (&TypeSymbol, Vec<&MethodSymbol>)> = BTreeMap::new();
        for method in &source.methods {
            let hits: Vec<(&TypeSymbol, &MethodSymbol)> = handlers
                .iter()
                .filter_map(|h| {
                    h.methods
                        .iter()
                        .find(|v| {
                            v.is_virtual() && v.name == method.name && v.params.len() == method.arity
                        })
                        .map(|v| (*h, v))
                })
                .collect();
            match hits.as_slice() {
                [] => {}
                [(handler, virtual_method)] => {
                    let (handler, virtual_method) = (*handler, *virtual_method);
                    forwarded
                        .entry(handler.name.as_str())
                        .or_insert_with(|| (handler, Vec::new()))
                        .1
                        .push(virtual_method);
                }
                several => {
                    let names: Vec<&str> = several.iter().map(|(h, _)| h.name.as_str()).collect();
                    shape_bail!(
                        &source.host,
                        "`{}` matches virtual methods of several handlers: {}",
                        method.name,
                        names.join(", ")
                    );
                }
            }
        }

        let mut sources_set = BTreeSet::from([source.path.clone()]);
        let mut types = Vec::new();
        for (handler, virtuals) in forwarded.values() {
            sources_set.extend(sources_of(units, &handler.unit));
            types.push(forwarding_class(&host, source, handler, virtuals, symbols, ctx));
        }
        types.push(host_interface(source));

        let host_namespace = source
            .namespace
            .clone()
            .unwrap_or_else(|| ctx.output.namespace.clone());
        let mut usings = ctx.managed_usings();
        usings.push(ctx.output.namespace.clone());
        usings.push(ctx.output.internal_namespace.clone());
        let file = CodeFile {
            header: Vec::new(),
            usings,
            namespaces: vec![
                Namespace {
                    name: ctx.output.internal_namespace.clone(),
                    types,
                },
                Namespace {
                    name: host_namespace,
                    types: vec![partial_host(source)],
                },
            ],
        };
        info!(
            host = %source.host,
            handlers = forwarded.len(),
            gates = source.gates.len(),
            "generated glue"
        );
        out.push(GeneratedUnit::source(
            output::MANAGED_INTERNAL,
            &format!("{}Glue", source.host),
            sources_set,
            file,
        ));
    }
    Ok(out)
}

fn host_private(host: &str) -> String {
    format!("I{host}Private")
}

fn forwarding_class(
    host: &GlueHost,
    source: &GlueSource,
    handler: &TypeSymbol,
    virtuals: &[&MethodSymbol],
    symbols: &SymbolModel,
    ctx: &PipelineContext,
) -> TypeDecl {
    let stem = handler
        .name
        .strip_prefix(ctx.output.namespace.rsplit('.').next().unwrap_or_default())
        .filter(|s| !s.is_empty())
        .unwrap_or(&handler.name);
    let mut ty = TypeDecl::new(
        format!("{}{stem}Glue", host.prefix()),
        TypeKind::Class,
        Modifiers::INTERNAL | Modifiers::SEALED | Modifiers::UNSAFE,
    );
    ty.base = Some(TypeRef::named(&handler.name));

    let mut host_field = Field::new(
        "_host",
        TypeRef::named(&source.host),
        Modifiers::PRIVATE | Modifiers::READONLY,
    );
    host_field.comment = vec![format!("Forwards to {}.", source.host)];
    ty.members.push(Member::Field(host_field));
    ty.members.push(Member::Constructor(Constructor {
        modifiers: Modifiers::INTERNAL,
        params: vec![Param::new("host", TypeRef::named(&source.host))],
        initializer: None,
        body: vec![Stmt::line("_host = host;")],
    }));

    let private = private_interface(&handler.name);
    let queries: BTreeSet<String> = symbols
        .get(&format!("{}.{private}", handler.namespace))
        .map(|iface| iface.methods.iter().map(|m| m.name.clone()).collect())
        .unwrap_or_default();

    let mut answers = Vec::new();
    for v in virtuals {
        let args: Vec<String> = v
            .params
            .iter()
            .map(|p| match p.direction {
                ParamDirection::In => p.name.clone(),
                ParamDirection::Ref => format!("ref {}", p.name),
                ParamDirection::Out => format!("out {}", p.name),
            })
            .collect();
        let mut method = Method::new(
            &v.name,
            v.ret.clone(),
            Modifiers::PROTECTED | Modifiers::INTERNAL | Modifiers::OVERRIDE,
        );
        method.params = v.params.clone();
        method.native_name = v.native_name.clone();
        method.body = Some(vec![return_or_discard(
            &v.ret,
            format!("_host.{}({})", v.name, args.join(", ")),
        )]);
        ty.members.push(Member::Method(method));

        let query = override_query(&v.name);
        if queries.contains(&query) {
            let answer = if source.gates.contains(&v.name) {
                format!("return !_host.Avoid{}();", v.name)
            } else {
                "return true;".to_string()
            };
            let mut method = Method::new(query, TypeRef::named("bool"), Modifiers::empty());
            method.explicit_interface = Some(TypeRef::named(&private));
            method.body = Some(vec![Stmt::line(answer)]);
            answers.push(Member::Method(method));
        }
    }
    if !answers.is_empty() {
        ty.interfaces.push(TypeRef::named(&private));
        ty.members.extend(answers);
    }
    debug!(glue = %ty.name, handler = %handler.name, methods = virtuals.len(), "forwarding class");
    ty
}

fn host_interface(source: &GlueSource) -> TypeDecl {
    let mut iface = TypeDecl::new(
        host_private(&source.host),
        TypeKind::Interface,
        Modifiers::INTERNAL,
    );
    for gated in &source.gates {
        iface.members.push(Member::Method(Method::new(
            format!("Avoid{gated}"),
            TypeRef::named("bool"),
            Modifiers::empty(),
        )));
    }
    iface
}

fn partial_host(source: &GlueSource) -> TypeDecl {
    let private = host_private(&source.host);
    let mut host = TypeDecl::new(&source.host, TypeKind::Class, Modifiers::PARTIAL);
    host.interfaces.push(TypeRef::named(&private));
    for gated in &source.gates {
        let mut method = Method::new(
            format!("Avoid{gated}"),
            TypeRef::named("bool"),
            Modifiers::empty(),
        );
        method.explicit_interface = Some(TypeRef::named(&private));
        method.body = Some(vec![Stmt::line(format!("return Avoid{gated}();"))]);
        host.members.push(Member::Method(method));
    }
    host
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = r#"
// @glue-host
namespace Cef.Hosting
{
	public partial class CefApplication
	{
		internal void OnContextInitialized()
		{
		}

		internal bool AvoidOnContextInitialized()
		{
			return false;
		}

		internal static int Helper(int a, int b) => a + b;
	}
}
"#;

    #[test]
    fn generic_parameters_count_once() {
        assert_eq!(parameter_count(""), 0);
        assert_eq!(parameter_count("CefBrowser browser"), 1);
        assert_eq!(parameter_count("Dictionary<string, int> map, int flags"), 2);
        assert_eq!(parameter_count("(int x, int y) point, int[,] grid"), 2);

        let method = parse_method("void Apply(Dictionary<string, List<int>> map)").unwrap();
        assert_eq!(method.name, "Apply");
        assert_eq!(method.arity, 1);
    }

    #[test]
    fn host_methods_and_gates() {
        let source = parse(PathBuf::from("Hosting/CefApplication.cs"), HOST).unwrap();
        assert_eq!(source.host, "CefApplication");
        assert_eq!(source.namespace.as_deref(), Some("Cef.Hosting"));
        assert!(source.gates.contains("OnContextInitialized"));
        let names: Vec<&str> = source.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["OnContextInitialized", "Helper"]);
        assert_eq!(source.methods[1].arity, 2);
    }

    #[test]
    fn host_kinds() {
        assert_eq!(GlueHost::from_name("CefApplication"), GlueHost::Application);
        assert_eq!(GlueHost::from_name("OffscreenWebView"), GlueHost::WebView);
        assert_eq!(GlueHost::from_name("Tray").prefix(), "Tray");
        assert_eq!(GlueHost::Application.prefix(), "App");
    }
}

//! Extraction — clang `Entity`/`Type` → [`HeaderModel`].
//!
//! Every header below the configured header directory is pulled into one
//! in-memory translation unit; only declarations located in those headers
//! are kept.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clang::diagnostic::Severity;
use clang::{CallingConvention, Clang, Entity, EntityKind, Index, Type as ClangType, TypeKind, Unsaved};
use tracing::{debug, info, trace, warn};

use crate::config::{InputConfig, resolve_path};
use crate::error::GenError;
use crate::model::*;

/// Name of the in-memory header including every scanned header.
const WRAPPER_HEADER: &str = "bnd_csharp_all.h";

/// Parse the headers of `source` into a header model.
pub fn extract(source: &Path, input: &InputConfig) -> Result<HeaderModel> {
    let root = canonical(source);
    let header_dir = canonical(&resolve_path(&input.header_dir, &root));
    let headers = collect_files(&header_dir, "h")?;
    info!(dir = %header_dir.display(), headers = headers.len(), "scanning headers");

    let clang = Clang::new().map_err(|e| anyhow::anyhow!("failed to initialize libclang: {e}"))?;
    let index = Index::new(&clang, false, false);

    let mut args: Vec<String> = input.clang_args.clone();
    for inc in &input.include_paths {
        let flag = format!("-I{}", resolve_path(inc, &root).display());
        if !args.contains(&flag) {
            args.push(flag);
        }
    }

    let wrapper = root.join(WRAPPER_HEADER);
    let contents: String = headers
        .iter()
        .map(|h| format!("#include \"{}\"\n", h.display()))
        .collect();
    let tu = index
        .parser(&wrapper)
        .arguments(&args)
        .unsaved(&[Unsaved::new(&wrapper, &contents)])
        .skip_function_bodies(true)
        .parse()
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e:?}", header_dir.display()))?;

    let diagnostics: Vec<String> = tu
        .get_diagnostics()
        .iter()
        .filter(|d| matches!(d.get_severity(), Severity::Error | Severity::Fatal))
        .map(|d| {
            let location = d.get_location().get_file_location();
            match location.file {
                Some(file) => format!(
                    "{}:{}:{}: {}",
                    file.get_path().display(),
                    location.line,
                    location.column,
                    d.get_text()
                ),
                None => d.get_text(),
            }
        })
        .collect();
    if !diagnostics.is_empty() {
        return Err(GenError::ToolDiagnostics {
            tool: "clang",
            diagnostics,
        }
        .into());
    }

    let mut extractor = Extractor {
        root: &root,
        header_dir: &header_dir,
        anonymous: HashMap::new(),
        lines: HashMap::new(),
        seen: HashSet::new(),
        model: HeaderModel::default(),
    };
    let entities = top_level(tu.get_entity());
    extractor.name_anonymous(&entities);
    for entity in &entities {
        extractor.visit(entity)?;
    }

    let model = extractor.model;
    info!(
        structs = model.structs().count(),
        enums = model.enums().count(),
        typedefs = model.typedefs().count(),
        functions = model.functions().count(),
        "header extraction complete"
    );
    Ok(model)
}

/// Every file below `dir` with extension `ext`, recursively, sorted.
pub fn collect_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .with_context(|| format!("reading directory {}", current.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("reading directory {}", current.display()))?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == ext) {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Top-level declarations, looking through `extern "C"` blocks.
fn top_level(root: Entity<'_>) -> Vec<Entity<'_>> {
    let mut out = Vec::new();
    for child in root.get_children() {
        if child.get_kind() == EntityKind::LinkageSpec {
            out.extend(child.get_children());
        } else {
            out.push(child);
        }
    }
    out
}

/// The spelled name of a declaration, or `None` for anonymous ones.
fn declared_name(entity: &Entity<'_>) -> Option<String> {
    if entity.is_anonymous() {
        return None;
    }
    entity
        .get_name()
        .filter(|n| !n.is_empty() && !n.contains("(unnamed") && !n.contains("(anonymous"))
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

struct Extractor<'a, 'tu> {
    root: &'a Path,
    header_dir: &'a Path,
    /// Anonymous records and enums named by the typedef that declares them.
    anonymous: HashMap<Entity<'tu>, String>,
    /// Source lines of every header read so far, for marker lookup.
    lines: HashMap<PathBuf, Vec<String>>,
    seen: HashSet<String>,
    model: HeaderModel,
}

impl<'tu> Extractor<'_, 'tu> {
    fn name_anonymous(&mut self, entities: &[Entity<'tu>]) {
        for entity in entities {
            if entity.get_kind() != EntityKind::TypedefDecl {
                continue;
            }
            let (Some(name), Some(underlying)) =
                (entity.get_name(), entity.get_typedef_underlying_type())
            else {
                continue;
            };
            if let Some(decl) = underlying.get_canonical_type().get_declaration()
                && declared_name(&decl).is_none()
            {
                trace!(typedef = %name, "names anonymous declaration");
                self.anonymous.insert(decl, name);
            }
        }
    }

    fn visit(&mut self, entity: &Entity<'tu>) -> Result<()> {
        let Some(file) = self.header_of(entity) else {
            return Ok(());
        };
        match entity.get_kind() {
            EntityKind::StructDecl | EntityKind::UnionDecl if entity.is_definition() => {
                let Some(name) = self.name_of(entity) else {
                    return Ok(());
                };
                if !self.seen.insert(name.clone()) {
                    return Ok(());
                }
                let source = self.source_info(entity, file)?;
                let mut nested = Vec::new();
                let decl = struct_decl(entity, &name, source.clone(), &mut nested)
                    .with_context(|| format!("extracting struct `{name}`"))?;
                debug!(name = %decl.name, fields = decl.fields.len(), union = decl.is_union, "extracted struct");
                for mut inner in nested {
                    inner.source = source.clone();
                    debug!(name = %inner.name, fields = inner.fields.len(), "  nested anonymous type");
                    self.model.declarations.push(NativeDeclaration::Struct(inner));
                }
                self.model.declarations.push(NativeDeclaration::Struct(decl));
            }
            EntityKind::EnumDecl if entity.is_definition() => {
                let Some(name) = self.name_of(entity) else {
                    warn!(file = %file.display(), "skipping enum without a name");
                    return Ok(());
                };
                if !self.seen.insert(name.clone()) {
                    return Ok(());
                }
                let source = self.source_info(entity, file)?;
                let decl = enum_decl(entity, name, source);
                debug!(name = %decl.name, items = decl.items.len(), "extracted enum");
                self.model.declarations.push(NativeDeclaration::Enum(decl));
            }
            EntityKind::TypedefDecl => {
                let Some(name) = entity.get_name() else {
                    return Ok(());
                };
                if !self.seen.insert(format!("typedef {name}")) {
                    return Ok(());
                }
                let underlying = entity
                    .get_typedef_underlying_type()
                    .context("typedef has no underlying type")?;
                // Anonymous definitions already carry the typedef name.
                if underlying
                    .get_canonical_type()
                    .get_declaration()
                    .is_some_and(|d| self.anonymous.get(&d) == Some(&name))
                {
                    trace!(name = %name, "typedef names an anonymous declaration");
                    return Ok(());
                }
                let aliased = map_clang_type(&underlying)
                    .with_context(|| format!("unsupported type for typedef `{name}`"))?;
                let source = self.source_info(entity, file)?;
                debug!(name = %name, spelling = %underlying.get_display_name(), "extracted typedef");
                self.model.declarations.push(NativeDeclaration::Typedef(TypedefDecl {
                    name,
                    source,
                    aliased,
                    aliased_spelling: underlying.get_display_name(),
                }));
            }
            EntityKind::FunctionDecl => {
                let Some(name) = entity.get_name() else {
                    return Ok(());
                };
                if entity.is_variadic() {
                    warn!(name = %name, "skipping variadic function");
                    return Ok(());
                }
                if !self.seen.insert(format!("fn {name}")) {
                    trace!(name = %name, "skipping duplicate function");
                    return Ok(());
                }
                let source = self.source_info(entity, file)?;
                let signature = function_signature(entity)
                    .with_context(|| format!("extracting function `{name}`"))?;
                debug!(name = %name, params = signature.params.len(), "extracted function");
                self.model.declarations.push(NativeDeclaration::Function(FunctionDecl {
                    name,
                    source,
                    signature,
                }));
            }
            _ => {}
        }
        Ok(())
    }

    fn name_of(&self, entity: &Entity<'tu>) -> Option<String> {
        declared_name(entity).or_else(|| self.anonymous.get(entity).cloned())
    }

    /// The header an entity is located in, if it is below the header
    /// directory.
    fn header_of(&self, entity: &Entity<'tu>) -> Option<PathBuf> {
        let file = entity.get_location()?.get_file_location().file?;
        let path = canonical(&file.get_path());
        path.starts_with(self.header_dir).then_some(path)
    }

    fn source_info(&mut self, entity: &Entity<'tu>, file: PathBuf) -> Result<SourceInfo> {
        let relative: PathBuf = file
            .strip_prefix(self.root)
            .unwrap_or(&file)
            .components()
            .collect();
        let line = entity
            .get_range()
            .map(|r| r.get_start().get_file_location().line)
            .unwrap_or(0) as usize;
        if !self.lines.contains_key(&file) {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            self.lines
                .insert(file.clone(), text.lines().map(str::to_string).collect());
        }
        let marker = line
            .checked_sub(2)
            .and_then(|i| self.lines.get(&file).and_then(|lines| lines.get(i)))
            .map(|l| l.trim().to_string());
        Ok(SourceInfo {
            file: relative,
            marker,
        })
    }
}

// ---------------------------------------------------------------------------
// Struct extraction
// ---------------------------------------------------------------------------

fn struct_decl(
    entity: &Entity<'_>,
    name: &str,
    source: SourceInfo,
    nested: &mut Vec<StructDecl>,
) -> Result<StructDecl> {
    let mut fields = Vec::new();
    for child in entity.get_children() {
        if child.get_kind() != EntityKind::FieldDecl {
            continue;
        }
        let field_name = child.get_name().unwrap_or_default();
        let field_type = child.get_type().context("field has no type")?;

        let ty = match anonymous_field(&field_type, name, &field_name, nested)? {
            Some(synthetic) => CType::named(synthetic),
            None => map_clang_type(&field_type)
                .with_context(|| format!("unsupported type for field `{field_name}`"))?,
        };
        let field = match callable_parts(&ty) {
            Some((return_type, params, calling_convention)) => {
                let names = parameter_names(&child);
                FieldDescriptor::callable(
                    field_name,
                    MethodSignature {
                        params: params
                            .iter()
                            .enumerate()
                            .map(|(i, ty)| {
                                let name = names
                                    .get(i)
                                    .cloned()
                                    .unwrap_or_else(|| format!("param{i}"));
                                ParamDescriptor::new(name, ty.clone())
                            })
                            .collect(),
                        return_type: return_type.clone(),
                        calling_convention,
                    },
                )
            }
            None => FieldDescriptor::data(field_name, ty),
        };
        trace!(field = %field.name, ty = ?field.ty, "  field");
        fields.push(field);
    }

    Ok(StructDecl {
        name: name.to_string(),
        source,
        fields,
        is_union: entity.get_kind() == EntityKind::UnionDecl,
    })
}

/// Extract an anonymous record field type as `Parent_field`.
fn anonymous_field(
    field_type: &ClangType<'_>,
    parent: &str,
    field: &str,
    nested: &mut Vec<StructDecl>,
) -> Result<Option<String>> {
    let canonical = field_type.get_canonical_type();
    if canonical.get_kind() != TypeKind::Record {
        return Ok(None);
    }
    let Some(decl) = canonical.get_declaration() else {
        return Ok(None);
    };
    if declared_name(&decl).is_some() {
        return Ok(None);
    }
    let synthetic = format!("{parent}_{field}");
    let inner = struct_decl(&decl, &synthetic, SourceInfo::default(), nested)?;
    nested.push(inner);
    Ok(Some(synthetic))
}

/// Parameter names of a function-pointer field, read from its `ParmDecl`
/// children. Empty when the pointer type comes from a typedef.
fn parameter_names(field: &Entity<'_>) -> Vec<String> {
    field
        .get_children()
        .iter()
        .filter(|c| c.get_kind() == EntityKind::ParmDecl)
        .enumerate()
        .map(|(i, c)| {
            c.get_name()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("param{i}"))
        })
        .collect()
}

/// Return type, parameter types and calling convention of a function
/// pointer, looking through typedefs.
fn callable_parts(ty: &CType) -> Option<(&CType, &[CType], CallConv)> {
    match ty {
        CType::Ptr { pointee, .. } => match pointee.as_ref() {
            CType::FnPtr {
                return_type,
                params,
                calling_convention,
            } => Some((&**return_type, params.as_slice(), *calling_convention)),
            _ => None,
        },
        CType::Named {
            resolved: Some(resolved),
            ..
        } => callable_parts(resolved),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Enum extraction
// ---------------------------------------------------------------------------

fn enum_decl(entity: &Entity<'_>, name: String, source: SourceInfo) -> EnumDecl {
    let underlying = entity
        .get_enum_underlying_type()
        .and_then(|t| map_clang_type(&t).ok())
        .unwrap_or(CType::I32);

    let mut items = Vec::new();
    for child in entity.get_children() {
        if child.get_kind() != EntityKind::EnumConstantDecl {
            continue;
        }
        let item_name = child.get_name().unwrap_or_default();
        let (value, _) = child.get_enum_constant_value().unwrap_or((0, 0));
        let mut item = EnumItem::new(item_name, value);
        if let Some(expression) = initializer_tokens(&child) {
            item = item.with_expression(expression);
        }
        items.push(item);
    }

    EnumDecl {
        name,
        source,
        underlying,
        items,
    }
}

/// Tokens after `=` in an enum item, space-separated.
fn initializer_tokens(item: &Entity<'_>) -> Option<String> {
    let tokens: Vec<String> = item
        .get_range()?
        .tokenize()
        .iter()
        .map(|t| t.get_spelling())
        .collect();
    let start = tokens.iter().position(|t| t == "=")?;
    let expression = tokens[start + 1..].join(" ");
    (!expression.is_empty()).then_some(expression)
}

// ---------------------------------------------------------------------------
// Function extraction
// ---------------------------------------------------------------------------

fn function_signature(entity: &Entity<'_>) -> Result<MethodSignature> {
    let fn_type = entity.get_type().context("function has no type")?;
    let ret_type = fn_type
        .get_result_type()
        .context("function has no return type")?;
    let return_type = map_clang_type(&ret_type)?;
    let calling_convention = fn_type
        .get_calling_convention()
        .map(map_calling_convention)
        .unwrap_or(CallConv::Cdecl);

    let args = entity.get_arguments().unwrap_or_default();
    let arg_types = fn_type.get_argument_types().unwrap_or_default();
    let mut params = Vec::new();
    for (i, ty) in arg_types.iter().enumerate() {
        let name = args
            .get(i)
            .and_then(|a| a.get_name())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("param{i}"));
        // Array parameters decay to pointers.
        let ty = match map_clang_type(ty)? {
            CType::Array { element, .. } => CType::Ptr {
                pointee: element,
                is_const: false,
            },
            other => other,
        };
        params.push(ParamDescriptor::new(name, ty));
    }

    Ok(MethodSignature {
        params,
        return_type,
        calling_convention,
    })
}

// ---------------------------------------------------------------------------
// Type mapping: clang TypeKind → CType
// ---------------------------------------------------------------------------

fn map_clang_type(ty: &ClangType<'_>) -> Result<CType> {
    match ty.get_kind() {
        TypeKind::Void => Ok(CType::Void),
        TypeKind::Bool => Ok(CType::Bool),
        TypeKind::CharS | TypeKind::SChar => Ok(CType::I8),
        TypeKind::CharU | TypeKind::UChar => Ok(CType::U8),
        TypeKind::Short => Ok(CType::I16),
        TypeKind::UShort | TypeKind::Char16 => Ok(CType::U16),
        TypeKind::Int => Ok(CType::I32),
        TypeKind::UInt | TypeKind::Char32 => Ok(CType::U32),
        // `long` and `wchar_t` follow the target's data model.
        TypeKind::Long => Ok(sized_integer(ty, CType::I32, CType::I64)),
        TypeKind::ULong => Ok(sized_integer(ty, CType::U32, CType::U64)),
        TypeKind::WChar => Ok(match ty.get_sizeof() {
            Ok(2) => CType::U16,
            _ => CType::I32,
        }),
        TypeKind::LongLong => Ok(CType::I64),
        TypeKind::ULongLong => Ok(CType::U64),
        TypeKind::Float => Ok(CType::F32),
        TypeKind::Double => Ok(CType::F64),

        TypeKind::Pointer => {
            let pointee = ty
                .get_pointee_type()
                .context("pointer has no pointee type")?;
            Ok(CType::Ptr {
                is_const: pointee.is_const_qualified(),
                pointee: Box::new(map_clang_type(&pointee)?),
            })
        }

        TypeKind::ConstantArray => {
            let elem = ty.get_element_type().context("array has no element type")?;
            Ok(CType::Array {
                element: Box::new(map_clang_type(&elem)?),
                len: ty.get_size().unwrap_or(0),
            })
        }

        TypeKind::IncompleteArray => {
            let elem = ty
                .get_element_type()
                .context("incomplete array has no element type")?;
            Ok(CType::ptr(map_clang_type(&elem)?))
        }

        TypeKind::Elaborated => {
            let inner = ty
                .get_elaborated_type()
                .context("elaborated type has no inner type")?;
            map_clang_type(&inner)
        }

        TypeKind::Typedef => {
            if let Some(decl) = ty.get_declaration()
                && let Some(name) = decl.get_name().filter(|n| !n.is_empty())
            {
                if matches!(
                    name.as_str(),
                    "va_list" | "__builtin_va_list" | "__gnuc_va_list"
                ) {
                    return Ok(CType::ptr(CType::Void));
                }
                // Keep the name; the canonical type is the fallback for
                // typedefs the bindings fold away.
                let resolved = map_clang_type(&ty.get_canonical_type()).ok().map(Box::new);
                return Ok(CType::Named { name, resolved });
            }
            map_clang_type(&ty.get_canonical_type())
        }

        TypeKind::Record | TypeKind::Enum => {
            let Some(decl) = ty.get_declaration() else {
                anyhow::bail!("type `{}` has no declaration", ty.get_display_name());
            };
            let Some(name) = declared_name(&decl) else {
                anyhow::bail!("anonymous type `{}` without a typedef", ty.get_display_name());
            };
            if name == "__va_list_tag" {
                return Ok(CType::Void);
            }
            // Opaque records only appear behind pointers.
            if ty.get_kind() == TypeKind::Record && ty.get_sizeof().is_err() {
                debug!(name = %name, "incomplete record type, mapping to Void");
                return Ok(CType::Void);
            }
            Ok(CType::named(name))
        }

        TypeKind::FunctionPrototype => {
            let ret = ty
                .get_result_type()
                .context("function prototype has no return type")?;
            let mut params = Vec::new();
            for at in ty.get_argument_types().unwrap_or_default() {
                params.push(map_clang_type(&at)?);
            }
            Ok(CType::FnPtr {
                return_type: Box::new(map_clang_type(&ret)?),
                params,
                calling_convention: ty
                    .get_calling_convention()
                    .map(map_calling_convention)
                    .unwrap_or(CallConv::Cdecl),
            })
        }

        TypeKind::FunctionNoPrototype => Ok(CType::FnPtr {
            return_type: Box::new(CType::Void),
            params: vec![],
            calling_convention: CallConv::Cdecl,
        }),

        other => anyhow::bail!("unsupported clang TypeKind: {other:?}"),
    }
}

fn sized_integer(ty: &ClangType<'_>, narrow: CType, wide: CType) -> CType {
    match ty.get_sizeof() {
        Ok(4) => narrow,
        _ => wide,
    }
}

fn map_calling_convention(cc: CallingConvention) -> CallConv {
    match cc {
        CallingConvention::Stdcall => CallConv::Stdcall,
        CallingConvention::Fastcall => CallConv::Fastcall,
        _ => CallConv::Cdecl,
    }
}

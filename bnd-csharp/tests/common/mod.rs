//! A hand-built model of a small CEF-like header set, shared by the
//! integration tests. Nothing here touches libclang.

#![allow(dead_code)]

use bnd_csharp::config::Config;
use bnd_csharp::glue::GlueSource;
use bnd_csharp::model::*;
use bnd_csharp::output::GeneratedTree;
use bnd_csharp::tables::{BoolParams, Tables};

pub const APP_HEADER: &str = "include/capi/cef_app_capi.h";
pub const BROWSER_HEADER: &str = "include/capi/cef_browser_capi.h";
pub const CLIENT_HEADER: &str = "include/capi/cef_client_capi.h";
pub const TASK_HEADER: &str = "include/capi/cef_task_capi.h";
pub const BASE_HEADER: &str = "include/capi/cef_base_capi.h";
pub const STRING_HEADER: &str = "include/internal/cef_string_types.h";
pub const TYPES_HEADER: &str = "include/internal/cef_types.h";

pub const CLIENT_MARKER: &str = "/*--cef(source=client)--*/";

pub fn size_t() -> CType {
    CType::alias("size_t", CType::U64)
}

/// `self` pointing at the record tagged `_{name}`.
pub fn receiver(name: &str) -> ParamDescriptor {
    ParamDescriptor::new("self", CType::ptr(CType::named(format!("_{name}"))))
}

pub fn callback(
    field: &str,
    owner: &str,
    params: Vec<ParamDescriptor>,
    return_type: CType,
) -> FieldDescriptor {
    let mut all = vec![receiver(owner)];
    all.extend(params);
    FieldDescriptor::callable(
        field,
        MethodSignature {
            params: all,
            return_type,
            calling_convention: CallConv::Cdecl,
        },
    )
}

/// `typedef struct _{name} { ... } {name};`
pub fn record(
    model: &mut HeaderModel,
    name: &str,
    source: SourceInfo,
    fields: Vec<FieldDescriptor>,
) {
    model.declarations.push(NativeDeclaration::Struct(StructDecl {
        name: format!("_{name}"),
        source: source.clone(),
        fields,
        is_union: false,
    }));
    model.declarations.push(NativeDeclaration::Typedef(TypedefDecl {
        name: name.to_string(),
        source,
        aliased: CType::named(format!("_{name}")),
        aliased_spelling: format!("struct _{name}"),
    }));
}

fn base(ty: &str) -> FieldDescriptor {
    FieldDescriptor::data("base", CType::named(ty))
}

fn string_userfree() -> CType {
    CType::named("cef_string_userfree_t")
}

fn const_string() -> CType {
    CType::const_ptr(CType::named("cef_string_t"))
}

/// The whole fixture model.
pub fn model() -> HeaderModel {
    let mut m = HeaderModel::default();

    // Strings.
    record(
        &mut m,
        "cef_string_t",
        SourceInfo::new(STRING_HEADER),
        vec![
            FieldDescriptor::data("str", CType::ptr(CType::U16)),
            FieldDescriptor::data("length", size_t()),
            FieldDescriptor::callable(
                "dtor",
                MethodSignature {
                    params: vec![ParamDescriptor::new("str", CType::ptr(CType::U16))],
                    return_type: CType::Void,
                    calling_convention: CallConv::Cdecl,
                },
            ),
        ],
    );
    m.declarations.push(NativeDeclaration::Typedef(TypedefDecl {
        name: "cef_string_userfree_t".to_string(),
        source: SourceInfo::new(STRING_HEADER),
        aliased: CType::ptr(CType::named("cef_string_t")),
        aliased_spelling: "cef_string_t*".to_string(),
    }));

    // Lifetime bases.
    record(
        &mut m,
        "cef_base_ref_counted_t",
        SourceInfo::new(BASE_HEADER),
        vec![
            FieldDescriptor::data("size", size_t()),
            callback("add_ref", "cef_base_ref_counted_t", vec![], CType::Void),
            callback("release", "cef_base_ref_counted_t", vec![], CType::I32),
            callback("has_one_ref", "cef_base_ref_counted_t", vec![], CType::I32),
        ],
    );
    record(
        &mut m,
        "cef_base_scoped_t",
        SourceInfo::new(BASE_HEADER),
        vec![
            FieldDescriptor::data("size", size_t()),
            callback("del", "cef_base_scoped_t", vec![], CType::Void),
        ],
    );

    // Enums.
    m.declarations.push(NativeDeclaration::Enum(EnumDecl {
        name: "cef_log_severity_t".to_string(),
        source: SourceInfo::new(TYPES_HEADER),
        underlying: CType::I32,
        items: vec![
            EnumItem::new("LOGSEVERITY_DEFAULT", 0),
            EnumItem::new("LOGSEVERITY_VERBOSE", 1),
            EnumItem::new("LOGSEVERITY_INFO", 2),
        ],
    }));
    m.declarations.push(NativeDeclaration::Enum(EnumDecl {
        name: "cef_event_flags_t".to_string(),
        source: SourceInfo::new(TYPES_HEADER),
        underlying: CType::U32,
        items: vec![
            EnumItem::new("EVENTFLAG_NONE", 0).with_expression("0"),
            EnumItem::new("EVENTFLAG_CAPS_LOCK_ON", 1).with_expression("1 << 0"),
            EnumItem::new("EVENTFLAG_SHIFT_DOWN", 2).with_expression("1 << 1"),
        ],
    }));

    // Plain data.
    record(
        &mut m,
        "cef_settings_t",
        SourceInfo::new(TYPES_HEADER),
        vec![
            FieldDescriptor::data("size", size_t()),
            FieldDescriptor::data("no_sandbox", CType::I32),
            FieldDescriptor::data("log_severity", CType::named("cef_log_severity_t")),
            FieldDescriptor::data("cache_path", CType::named("cef_string_t")),
        ],
    );
    record(
        &mut m,
        "cef_rect_t",
        SourceInfo::new(TYPES_HEADER),
        ["x", "y", "width", "height"]
            .into_iter()
            .map(|f| FieldDescriptor::data(f, CType::I32))
            .collect(),
    );

    // Proxies.
    record(
        &mut m,
        "cef_browser_t",
        SourceInfo::new(BROWSER_HEADER).with_marker("/*--cef(source=library)--*/"),
        vec![
            base("cef_base_ref_counted_t"),
            callback("is_loading", "cef_browser_t", vec![], CType::I32),
            callback("get_identifier", "cef_browser_t", vec![], CType::I32),
            callback("reload", "cef_browser_t", vec![], CType::Void),
            callback("get_frame_count", "cef_browser_t", vec![], size_t()),
            callback(
                "get_frame_identifiers",
                "cef_browser_t",
                vec![
                    ParamDescriptor::new("identifiersCount", CType::ptr(size_t())),
                    ParamDescriptor::new("identifiers", CType::ptr(CType::I64)),
                ],
                CType::Void,
            ),
            callback("get_url", "cef_browser_t", vec![], string_userfree()),
            callback(
                "set_url",
                "cef_browser_t",
                vec![ParamDescriptor::new("url", const_string())],
                CType::Void,
            ),
        ],
    );
    record(
        &mut m,
        "cef_task_info_t",
        SourceInfo::new(TASK_HEADER),
        vec![
            base("cef_base_scoped_t"),
            callback("get_name", "cef_task_info_t", vec![], string_userfree()),
        ],
    );

    // Handlers.
    record(
        &mut m,
        "cef_app_t",
        SourceInfo::new(APP_HEADER).with_marker(CLIENT_MARKER),
        vec![
            base("cef_base_ref_counted_t"),
            callback(
                "on_before_command_line_processing",
                "cef_app_t",
                vec![
                    ParamDescriptor::new("process_type", const_string()),
                    ParamDescriptor::new("browser", CType::ptr(CType::named("_cef_browser_t"))),
                ],
                CType::Void,
            ),
            callback("get_default_title", "cef_app_t", vec![], string_userfree()),
            callback("can_close", "cef_app_t", vec![], CType::I32),
            callback(
                "on_rects",
                "cef_app_t",
                vec![
                    ParamDescriptor::new("rectsCount", size_t()),
                    ParamDescriptor::new("rects", CType::const_ptr(CType::named("cef_rect_t"))),
                ],
                CType::Void,
            ),
        ],
    );
    record(
        &mut m,
        "cef_client_t",
        SourceInfo::new(CLIENT_HEADER),
        vec![
            base("cef_base_ref_counted_t"),
            callback(
                "get_browser",
                "cef_client_t",
                vec![],
                CType::ptr(CType::named("_cef_browser_t")),
            ),
        ],
    );

    // Platform typedef and an exported function.
    m.declarations.push(NativeDeclaration::Typedef(TypedefDecl {
        name: "cef_platform_thread_id_t".to_string(),
        source: SourceInfo::new(TYPES_HEADER),
        aliased: CType::alias("pid_t", CType::I32),
        aliased_spelling: "pid_t".to_string(),
    }));
    m.declarations.push(NativeDeclaration::Function(FunctionDecl {
        name: "cef_execute_process".to_string(),
        source: SourceInfo::new(APP_HEADER),
        signature: MethodSignature {
            params: vec![
                ParamDescriptor::new("application", CType::ptr(CType::named("cef_app_t"))),
                ParamDescriptor::new("windows_sandbox_info", CType::ptr(CType::Void)),
            ],
            return_type: CType::I32,
            calling_convention: CallConv::Cdecl,
        },
    }));

    m
}

pub fn tables() -> Tables {
    Tables {
        name_overrides: Default::default(),
        bool_params: BoolParams::parse("cef_settings_t;no_sandbox;no_sandbox\n")
            .expect("parse bool table"),
        handlers: ["cef_client_t".to_string()].into_iter().collect(),
    }
}

pub fn generate_with(
    model: &HeaderModel,
    tables: Tables,
    handwritten: &[GlueSource],
) -> anyhow::Result<GeneratedTree> {
    bnd_csharp::generate_from_model(model, &Config::default(), tables, false, handwritten)
}

/// The fixture rendered with default configuration and no hosts.
pub fn generate() -> GeneratedTree {
    generate_with(&model(), tables(), &[]).expect("generate fixture tree")
}

/// The file at `path`, failing with the list of rendered paths.
pub fn file<'t>(tree: &'t GeneratedTree, path: &str) -> &'t str {
    tree.get(path).unwrap_or_else(|| {
        let paths: Vec<_> = tree.paths().map(|p| p.display().to_string()).collect();
        panic!("{path} missing. Found: {paths:?}")
    })
}

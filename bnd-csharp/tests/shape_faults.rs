//! Inputs outside the recognized conventions abort the run.

mod common;

use bnd_csharp::error::GenError;
use bnd_csharp::model::*;

fn shape_detail(err: &anyhow::Error) -> String {
    match err.downcast_ref::<GenError>() {
        Some(GenError::ShapeMismatch { subject, detail }) => format!("{subject}: {detail}"),
        other => panic!("expected a shape mismatch, got {other:?}: {err:#}"),
    }
}

#[test]
fn counted_object_by_value() {
    let mut model = common::model();
    common::record(
        &mut model,
        "cef_frame_t",
        SourceInfo::new("include/capi/cef_frame_capi.h"),
        vec![
            FieldDescriptor::data("base", CType::named("cef_base_ref_counted_t")),
            common::callback(
                "attach",
                "cef_frame_t",
                vec![ParamDescriptor::new("browser", CType::named("cef_browser_t"))],
                CType::Void,
            ),
        ],
    );
    let err = common::generate_with(&model, common::tables(), &[]).unwrap_err();
    let detail = shape_detail(&err);
    assert!(detail.contains("cef_frame_t::attach"), "{detail}");
    assert!(detail.contains("passes a counted object by value"), "{detail}");
}

#[test]
fn managed_name_collision() {
    let mut tables = common::tables();
    tables
        .name_overrides
        .insert("cef_task_info_t".to_string(), "CefBrowser".to_string());
    let err = common::generate_with(&common::model(), tables, &[]).unwrap_err();
    let detail = shape_detail(&err);
    assert!(detail.contains("`CefBrowser` is also taken by `cef_browser_t`"), "{detail}");
}

#[test]
fn handler_callback_without_receiver() {
    let mut model = common::model();
    common::record(
        &mut model,
        "cef_visitor_t",
        SourceInfo::new("include/capi/cef_visitor_capi.h").with_marker(common::CLIENT_MARKER),
        vec![
            FieldDescriptor::data("base", CType::named("cef_base_ref_counted_t")),
            FieldDescriptor::callable(
                "visit",
                MethodSignature {
                    params: vec![ParamDescriptor::new("value", CType::I32)],
                    return_type: CType::Void,
                    calling_convention: CallConv::Cdecl,
                },
            ),
        ],
    );
    let err = common::generate_with(&model, common::tables(), &[]).unwrap_err();
    let detail = shape_detail(&err);
    assert!(detail.contains("has no receiver parameter"), "{detail}");
}

#[test]
fn callback_table_without_base() {
    let mut model = common::model();
    common::record(
        &mut model,
        "cef_callbacks_t",
        SourceInfo::new("include/capi/cef_callbacks_capi.h"),
        vec![common::callback("run", "cef_callbacks_t", vec![], CType::Void)],
    );
    let err = common::generate_with(&model, common::tables(), &[]).unwrap_err();
    let detail = shape_detail(&err);
    assert!(detail.contains("without a recognized base field"), "{detail}");
}

#[test]
fn enum_without_suffix() {
    let mut model = common::model();
    model.declarations.push(NativeDeclaration::Enum(EnumDecl {
        name: "cef_color_model".to_string(),
        source: SourceInfo::new(common::TYPES_HEADER),
        underlying: CType::I32,
        items: vec![EnumItem::new("COLOR_MODEL_GRAY", 0)],
    }));
    let err = common::generate_with(&model, common::tables(), &[]).unwrap_err();
    let detail = shape_detail(&err);
    assert!(detail.contains("must end with `_t`"), "{detail}");
}

#[test]
fn void_field_fails_the_binding_compilation() {
    let mut model = common::model();
    common::record(
        &mut model,
        "cef_opaque_holder_t",
        SourceInfo::new(common::TYPES_HEADER),
        vec![FieldDescriptor::data("inner", CType::named("cef_missing_t"))],
    );
    let err = common::generate_with(&model, common::tables(), &[]).unwrap_err();
    match err.downcast_ref::<GenError>() {
        Some(GenError::ToolDiagnostics { tool, diagnostics }) => {
            assert_eq!(*tool, "binding compilation");
            assert!(
                diagnostics.iter().any(|d| d.contains("CS0670")),
                "{diagnostics:?}"
            );
        }
        other => panic!("expected compiler diagnostics, got {other:?}: {err:#}"),
    }
}

//! Parameter marshaling plans selected against the compiled fixture.

mod common;

use bnd_csharp::classify::{self, TypeClassification, WrapperRole};
use bnd_csharp::config::Config;
use bnd_csharp::context::PipelineContext;
use bnd_csharp::ir::csharp::type_ref;
use bnd_csharp::ir::ParamDirection;
use bnd_csharp::marshal::{
    Direction, MethodPlan, ParameterMarshalPlan, PlanVariant, Planner, StringForm,
    ensure_symmetric,
};
use bnd_csharp::model::{
    CType, FieldDescriptor, HeaderModel, NativeDeclaration, SourceInfo, TypedefDecl,
};
use bnd_csharp::native::{self, NativeSurface, TypedefDisposition};
use bnd_csharp::symbols::{self, CompileOptions};

/// Runs the pipeline up to classification, then hands the planner to `f`.
fn with_planner<R>(f: impl FnOnce(&Planner<'_>, &NativeSurface<'_>, &PipelineContext) -> R) -> R {
    with_model_planner(&common::model(), f)
}

fn with_model_planner<R>(
    model: &HeaderModel,
    f: impl FnOnce(&Planner<'_>, &NativeSurface<'_>, &PipelineContext) -> R,
) -> R {
    let config = Config::default();
    let mut ctx = PipelineContext::new(&config, common::tables(), model, false).expect("context");
    let surface = NativeSurface::new(model, &ctx.aliases);
    let units = native::emit(&surface, &ctx).expect("native units");
    let bindings = symbols::compile(
        &units,
        CompileOptions {
            defines: &ctx.output.defines,
            provided: &ctx.runtime.provided_types,
            tool: "binding compilation",
        },
    )
    .expect("compile bindings");
    ctx.classes = classify::classify(&bindings, &surface, &ctx).expect("classify");
    let planner = Planner::new(&ctx, &surface);
    f(&planner, &surface, &ctx)
}

/// Plans for `binding::field` in both directions.
fn plans(binding: &str, field: &str) -> (MethodPlan, MethodPlan) {
    with_planner(|planner, surface, _| {
        let decl = surface.struct_decl(binding).expect("struct");
        let sig = decl
            .fields
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| f.signature.as_ref())
            .expect("callable field");
        let out = planner
            .plan_method(binding, field, sig, true, Direction::ManagedToNative)
            .expect("proxy plan");
        let back = planner
            .plan_method(binding, field, sig, true, Direction::NativeToManaged)
            .expect("handler plan");
        (out, back)
    })
}

fn variants(plan: &MethodPlan) -> Vec<PlanVariant> {
    plan.params.iter().map(|p| p.plan.variant()).collect()
}

#[test]
fn classification_of_the_fixture() {
    with_planner(|_, _, ctx| {
        let classes = &ctx.classes;
        assert_eq!(classes.of("cef_browser_t"), Some(TypeClassification::RefCounted));
        assert_eq!(classes.of("cef_task_info_t"), Some(TypeClassification::Scoped));
        assert_eq!(classes.of("cef_settings_t"), Some(TypeClassification::Sized));
        assert_eq!(classes.of("cef_rect_t"), Some(TypeClassification::Simple));
        assert_eq!(classes.of("cef_platform_thread_id_t"), Some(TypeClassification::Simple));
        assert_eq!(classes.of("cef_log_severity_t"), Some(TypeClassification::Enum));
        assert_eq!(classes.enum_name("cef_event_flags_t"), Some("CefEventFlags"));

        assert_eq!(classes.role("cef_browser_t"), Some(WrapperRole::Proxy));
        assert_eq!(classes.role("cef_app_t"), Some(WrapperRole::Handler));
        assert_eq!(classes.role("cef_client_t"), Some(WrapperRole::Handler));
        assert_eq!(classes.role("cef_rect_t"), None);
    });
}

/// `typedef struct _XDisplay XDisplay;` with no definition of `_XDisplay`,
/// reached only through a pointer field.
fn with_opaque_display() -> HeaderModel {
    let mut model = common::model();
    let source = SourceInfo::new("include/internal/cef_types_linux.h");
    model.declarations.push(NativeDeclaration::Typedef(TypedefDecl {
        name: "XDisplay".to_string(),
        source: source.clone(),
        aliased: CType::named("_XDisplay"),
        aliased_spelling: "struct _XDisplay".to_string(),
    }));
    common::record(
        &mut model,
        "cef_main_args_t",
        source,
        vec![
            FieldDescriptor::data("display", CType::ptr(CType::named("XDisplay"))),
            FieldDescriptor::data("argc", CType::I32),
        ],
    );
    model
}

#[test]
fn every_declaration_is_classified() {
    for model in [common::model(), with_opaque_display()] {
        with_model_planner(&model, |_, surface, ctx| {
            let missing: Vec<&str> = model
                .declarations
                .iter()
                .filter(|d| !matches!(d, NativeDeclaration::Function(_)))
                .filter(|d| ctx.classes.of_declaration(d, surface).is_none())
                .map(|d| d.name())
                .collect();
            assert!(missing.is_empty(), "unclassified: {missing:?}");
        });
    }
}

#[test]
fn opaque_typedefs_are_simple_handles() {
    let model = with_opaque_display();
    with_model_planner(&model, |_, surface, ctx| {
        assert_eq!(surface.disposition("XDisplay"), Some(&TypedefDisposition::Opaque));
        assert_eq!(ctx.classes.of("XDisplay"), Some(TypeClassification::Simple));
        assert_eq!(ctx.classes.of("cef_main_args_t"), Some(TypeClassification::Simple));
    });

    let tree = common::generate_with(&model, common::tables(), &[]).expect("generate");
    let text = common::file(&tree, "Native/Types/cef_main_args_t.cs");
    assert!(text.contains("public void* display;"), "{text}");
    assert!(tree.get("Native/Typedefs/XDisplay.cs").is_none());
}

#[test]
fn count_and_array_fuse_into_one_parameter() {
    let (out, back) = plans("cef_browser_t", "get_frame_identifiers");
    assert_eq!(variants(&out), [PlanVariant::Array]);
    ensure_symmetric("get_frame_identifiers", &out, &back).expect("symmetric");

    let managed = out.managed_params();
    assert_eq!(managed.len(), 2);
    assert_eq!(managed[0].name, "identifiersCount");
    assert_eq!(managed[0].direction, ParamDirection::Ref);
    assert_eq!(type_ref(&managed[0].ty), "UIntPtr");
    assert_eq!(managed[1].name, "identifiers");
    assert_eq!(type_ref(&managed[1].ty), "long[]");
}

#[test]
fn strings_and_objects() {
    let (out, back) = plans("cef_app_t", "on_before_command_line_processing");
    assert_eq!(variants(&out), [PlanVariant::String, PlanVariant::RefCounted]);
    assert_eq!(
        out.params[0].plan,
        ParameterMarshalPlan::String(StringForm::Borrowed)
    );
    assert_eq!(out.params[0].managed_name, "processType");
    assert!(back.skippable());

    let (title, _) = plans("cef_app_t", "get_default_title");
    assert_eq!(title.ret, Some(ParameterMarshalPlan::String(StringForm::Userfree)));
    assert!(!title.skippable());
}

#[test]
fn boolean_returns_by_prefix() {
    let (out, _) = plans("cef_app_t", "can_close");
    assert!(matches!(out.ret, Some(ParameterMarshalPlan::BoolAsInt { .. })));
    assert_eq!(type_ref(&out.managed_return()), "bool");
    assert!(out.skippable());
}

#[test]
fn asymmetric_plans_are_rejected() {
    let (out, mut back) = plans("cef_app_t", "on_before_command_line_processing");
    back.params[1].plan = ParameterMarshalPlan::RawPointer {
        native: bnd_csharp::ir::TypeRef::named("cef_browser_t").pointer(),
    };
    let err = ensure_symmetric("cef_app_t::on_before_command_line_processing", &out, &back)
        .unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("`browser` is marshaled as RefCounted one way and RawPointer the other"), "{text}");
}

#[test]
fn field_plans_consult_the_bool_table() {
    with_planner(|planner, _, _| {
        let flag = planner
            .plan_field("cef_settings_t", "no_sandbox", &CType::I32)
            .expect("field plan");
        assert!(matches!(flag, ParameterMarshalPlan::BoolAsInt { .. }));

        let plain = planner
            .plan_field("cef_rect_t", "width", &CType::I32)
            .expect("field plan");
        assert_eq!(plain.variant(), PlanVariant::Primitive);

        let severity = planner
            .plan_field("cef_settings_t", "log_severity", &CType::named("cef_log_severity_t"))
            .expect("field plan");
        assert_eq!(type_ref(&severity.managed_type()), "CefLogSeverity");
    });
}

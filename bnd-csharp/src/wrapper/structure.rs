//! Wrappers of Simple and Sized types.
//!
//! Plain layouts become value types holding the native struct. Layouts that
//! own strings, and every Sized layout, become disposable classes over a
//! native block.

use anyhow::Result;
use tracing::trace;

use crate::classify::TypeClassification;
use crate::context::PipelineContext;
use crate::ir::*;
use crate::marshal::{
    ParameterMarshalPlan, Planner, WrapperForm, owned_string_fields, value_to_managed,
    value_to_native, wrapper_form,
};
use crate::model::{CType, FieldDescriptor};
use crate::naming::{escape_identifier, pascal_case};

use super::WrapperTarget;

pub fn build(
    target: &WrapperTarget<'_>,
    planner: &Planner<'_>,
    ctx: &PipelineContext,
) -> Result<Vec<TypeDecl>> {
    let form = wrapper_form(target.class, target.decl, ctx);
    let ty = match form {
        WrapperForm::Struct => value_wrapper(target, planner, ctx)?,
        WrapperForm::Class => block_wrapper(target, planner, ctx)?,
    };
    Ok(vec![ty])
}

/// A data field exposed as a property, with the access path to its storage.
struct Exposed {
    name: String,
    plan: ParameterMarshalPlan,
    slot: String,
}

/// Fields that get a property: data fields with a by-value marshaling.
fn exposed_fields(
    target: &WrapperTarget<'_>,
    planner: &Planner<'_>,
    ctx: &PipelineContext,
) -> Result<Vec<Exposed>> {
    let strings = owned_string_fields(target.decl, ctx);
    let mut out = Vec::new();
    for field in &target.decl.fields {
        if field.is_function_pointer()
            || matches!(field.ty, CType::Array { .. })
            || strings.contains(&field.name.as_str())
            || is_size_field(target, field)
        {
            continue;
        }
        let plan = planner.plan_field(target.binding, &field.name, &field.ty)?;
        let exposed = match &plan {
            ParameterMarshalPlan::Primitive { by_ref: false, .. }
            | ParameterMarshalPlan::BoolAsInt { .. }
            | ParameterMarshalPlan::RawPointer { .. }
            | ParameterMarshalPlan::RefCounted(_)
            | ParameterMarshalPlan::Scoped(_) => true,
            ParameterMarshalPlan::SimpleStruct(s) => !s.pointer,
            _ => false,
        };
        trace!(owner = target.binding, field = %field.name, exposed, "field");
        if exposed {
            out.push(Exposed {
                name: pascal_case(&field.name),
                plan,
                slot: escape_identifier(&field.name),
            });
        }
    }
    Ok(out)
}

fn is_size_field(target: &WrapperTarget<'_>, field: &FieldDescriptor) -> bool {
    target.class == TypeClassification::Sized && field.name == "size"
}

fn field_property(exposed: &Exposed, storage: &str, ctx: &PipelineContext) -> Property {
    let slot = format!("{storage}{}", exposed.slot);
    // Counted references handed out by a struct are not owned by it.
    let writable = !matches!(
        exposed.plan,
        ParameterMarshalPlan::RefCounted(_) | ParameterMarshalPlan::Scoped(_)
    );
    Property {
        name: exposed.name.clone(),
        ty: exposed.plan.managed_type(),
        modifiers: Modifiers::PUBLIC,
        attributes: Vec::new(),
        getter: Some(vec![Stmt::line(format!(
            "return {};",
            value_to_managed(&exposed.plan, &slot, ctx)
        ))]),
        setter: writable.then(|| {
            vec![Stmt::line(format!(
                "{slot} = {};",
                value_to_native(&exposed.plan, "value", ctx)
            ))]
        }),
        comment: Vec::new(),
    }
}

fn value_wrapper(
    target: &WrapperTarget<'_>,
    planner: &Planner<'_>,
    ctx: &PipelineContext,
) -> Result<TypeDecl> {
    let mut ty = TypeDecl::new(
        &target.managed,
        TypeKind::Struct,
        Modifiers::PUBLIC | Modifiers::UNSAFE | Modifiers::PARTIAL,
    );
    ty.members.push(Member::Field(Field::new(
        "_instance",
        target.native(),
        Modifiers::INTERNAL,
    )));
    ty.members.push(Member::Constructor(Constructor {
        modifiers: Modifiers::PUBLIC,
        params: vec![Param::new("instance", target.native())],
        initializer: None,
        body: vec![Stmt::line("_instance = instance;")],
    }));
    for exposed in exposed_fields(target, planner, ctx)? {
        ty.members
            .push(Member::Property(field_property(&exposed, "_instance.", ctx)));
    }
    Ok(ty)
}

fn block_wrapper(
    target: &WrapperTarget<'_>,
    planner: &Planner<'_>,
    ctx: &PipelineContext,
) -> Result<TypeDecl> {
    let binding = target.binding;
    let allocator = &ctx.runtime.allocator;
    let strings = &ctx.runtime.string_helper;

    let mut ty = TypeDecl::new(
        &target.managed,
        TypeKind::Class,
        Modifiers::PUBLIC | Modifiers::SEALED | Modifiers::UNSAFE | Modifiers::PARTIAL,
    );
    ty.interfaces.push(TypeRef::named("IDisposable"));
    ty.members.push(Member::Field(Field::new(
        "_instance",
        target.native().pointer(),
        Modifiers::PRIVATE,
    )));
    ty.members.push(Member::Field(Field::new(
        "_owner",
        TypeRef::named("bool"),
        Modifiers::PRIVATE,
    )));

    let mut allocate = vec![Stmt::line(format!(
        "_instance = ({binding}*){allocator}.Allocate(sizeof({binding}));"
    ))];
    if target.class == TypeClassification::Sized {
        allocate.push(Stmt::line(format!(
            "_instance->size = (UIntPtr)sizeof({binding});"
        )));
    }
    allocate.push(Stmt::line("_owner = true;"));
    ty.members.push(Member::Constructor(Constructor {
        modifiers: Modifiers::PUBLIC,
        params: Vec::new(),
        initializer: None,
        body: allocate,
    }));
    ty.members.push(Member::Constructor(Constructor {
        modifiers: Modifiers::INTERNAL,
        params: vec![Param::new("instance", target.native().pointer())],
        initializer: None,
        body: vec![Stmt::line("_instance = instance;")],
    }));
    let owned = owned_string_fields(target.decl, ctx);
    // A copy owns its block and its strings, never the caller's buffers.
    let mut copy = vec![Stmt::line("*_instance = value;")];
    for field in &owned {
        let field = escape_identifier(field);
        copy.push(Stmt::line(format!(
            "_instance->{field} = default({});",
            ctx.conventions.string_type
        )));
        copy.push(Stmt::line(format!(
            "{strings}.Replace(&_instance->{field}, {strings}.Read(&value.{field}));"
        )));
    }
    ty.members.push(Member::Constructor(Constructor {
        modifiers: Modifiers::INTERNAL,
        params: vec![Param::new("value", target.native())],
        initializer: Some("this()".to_string()),
        body: copy,
    }));

    let mut native = Method::new(
        "GetNativeInstance",
        target.native().pointer(),
        Modifiers::INTERNAL,
    );
    native.body = Some(vec![Stmt::line("return _instance;")]);
    ty.members.push(Member::Method(native));

    for field in &owned {
        let slot = format!("&_instance->{}", escape_identifier(field));
        ty.members.push(Member::Property(Property {
            name: pascal_case(field),
            ty: TypeRef::named("string"),
            modifiers: Modifiers::PUBLIC,
            attributes: Vec::new(),
            getter: Some(vec![Stmt::line(format!("return {strings}.Read({slot});"))]),
            setter: Some(vec![Stmt::line(format!("{strings}.Replace({slot}, value);"))]),
            comment: Vec::new(),
        }));
    }
    for exposed in exposed_fields(target, planner, ctx)? {
        ty.members
            .push(Member::Property(field_property(&exposed, "_instance->", ctx)));
    }

    let mut release: Vec<Stmt> = owned
        .iter()
        .map(|field| {
            Stmt::line(format!(
                "{strings}.Clear(&_instance->{});",
                escape_identifier(field)
            ))
        })
        .collect();
    release.push(Stmt::line(format!("{allocator}.Free(_instance);")));
    let mut dispose = Method::new("Dispose", TypeRef::Void, Modifiers::PUBLIC);
    dispose.body = Some(vec![
        Stmt::block("if (_instance == null)", vec![Stmt::line("return;")]),
        Stmt::block("if (_owner)", release),
        Stmt::line("_instance = null;"),
    ]);
    ty.members.push(Member::Method(dispose));
    Ok(ty)
}

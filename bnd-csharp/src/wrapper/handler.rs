//! Handler wrappers: a native instance whose callbacks dispatch into
//! overridable managed methods.
//!
//! Each callback gets a `protected internal virtual` method, a native-callable
//! thunk installed by the constructor, and, when an unoverridden call can be
//! answered with a default value, an `IsOverridden` query on the private
//! interface. The query bodies are supplied by the override detector.

use anyhow::Result;
use tracing::trace;

use crate::context::PipelineContext;
use crate::error::shape_bail;
use crate::ir::csharp::type_ref;
use crate::ir::*;
use crate::marshal::{
    Direction, Marshaled, MethodPlan, ParameterMarshalPlan, Planner, ensure_symmetric,
    handler_arguments, value_to_native,
};
use crate::naming::escape_identifier;
use crate::native::types::unmanaged_convention;

use super::{
    Callable, WrapperTarget, base_type, native_name_attribute, pointer_constructor, return_or_discard,
    wrap_method,
};

/// Name of the private interface of a handler.
pub fn private_interface(managed: &str) -> String {
    format!("I{managed}Private")
}

/// Name of the override query for a virtual method.
pub fn override_query(method: &str) -> String {
    format!("IsOverridden{method}")
}

struct Callback<'a> {
    callable: Callable<'a>,
    signature: MethodPlan,
    thunk: MethodPlan,
}

pub fn build(
    target: &WrapperTarget<'_>,
    planner: &Planner<'_>,
    ctx: &PipelineContext,
) -> Result<Vec<TypeDecl>> {
    let private = private_interface(&target.managed);
    let mut callbacks = Vec::new();
    for callable in target.callables(ctx)? {
        let field = &callable.field.name;
        if !callable.receiver {
            shape_bail!(target.binding, "callback `{field}` has no receiver parameter");
        }
        let signature = planner.plan_method(
            target.binding,
            field,
            callable.signature,
            true,
            Direction::ManagedToNative,
        )?;
        let thunk = planner.plan_method(
            target.binding,
            field,
            callable.signature,
            true,
            Direction::NativeToManaged,
        )?;
        ensure_symmetric(&format!("{}::{field}", target.binding), &signature, &thunk)?;
        callbacks.push(Callback {
            callable,
            signature,
            thunk,
        });
    }

    let mut ty = TypeDecl::new(
        &target.managed,
        TypeKind::Class,
        Modifiers::PUBLIC | Modifiers::UNSAFE | Modifiers::PARTIAL,
    );
    ty.base = Some(base_type(target, ctx));

    // Virtual methods first: thunks find their target through the
    // native-name tag.
    let virtuals: Vec<Method> = callbacks
        .iter()
        .map(|cb| virtual_method(target, cb, ctx))
        .collect();

    let mut legacy = Vec::new();
    let mut install_legacy = Vec::new();
    let mut install_modern = Vec::new();
    let mut thunks = Vec::new();
    let mut queries = Vec::new();
    for cb in &callbacks {
        let field = &cb.callable.field.name;
        let Some(target_method) = virtuals
            .iter()
            .find(|m| m.native_name.as_deref() == Some(field.as_str()))
        else {
            shape_bail!(target.binding, "no managed method tagged `{field}`");
        };
        let query = cb
            .thunk
            .skippable()
            .then(|| override_query(&target_method.name));
        thunks.push(Member::Method(thunk(
            target,
            cb,
            &target_method.name,
            query.as_deref(),
            &private,
            ctx,
        )));

        let caller = &cb.callable.caller;
        let delegate = format!("{caller}Delegate");
        let slot = escape_identifier(field);
        legacy.push(Member::Delegate(DelegateDecl {
            name: delegate.clone(),
            ret: cb.thunk.native_ret.clone(),
            params: cb.thunk.native_params.clone(),
            modifiers: Modifiers::PRIVATE,
            attributes: Vec::new(),
        }));
        let mut keep_alive = Field::new(
            format!("fn{caller}"),
            TypeRef::named(&delegate),
            Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::READONLY,
        );
        keep_alive.initializer = Some(format!("{caller}Impl"));
        legacy.push(Member::Field(keep_alive));
        install_legacy.push(Stmt::line(format!(
            "self->{slot} = (void*)Marshal.GetFunctionPointerForDelegate(fn{caller});"
        )));
        let pointer = TypeRef::FunctionPointer {
            convention: unmanaged_convention(cb.callable.signature.calling_convention).to_string(),
            params: cb.thunk.native_params.iter().map(|p| p.ty.clone()).collect(),
            ret: Box::new(cb.thunk.native_ret.clone()),
        };
        install_modern.push(Stmt::line(format!(
            "self->{slot} = (void*)({})&{caller}Impl;",
            type_ref(&pointer)
        )));

        if let Some(query) = query {
            let mut method = Method::new(query, TypeRef::named("bool"), Modifiers::EXTERN);
            method.explicit_interface = Some(TypeRef::named(&private));
            method
                .attributes
                .push(Attribute::new("MethodImpl").arg("MethodImplOptions.ForwardRef"));
            queries.push(method);
        }
        trace!(owner = target.binding, field, skippable = cb.thunk.skippable(), "callback");
    }

    if !legacy.is_empty() {
        ty.members.push(Member::Conditional(ConditionalGroup {
            symbol: ctx.conventions.legacy_define.clone(),
            then: legacy,
            otherwise: Vec::new(),
        }));
    }

    let allocate = format!(
        "base(({binding}*){allocator}.Allocate(sizeof({binding})))",
        binding = target.binding,
        allocator = ctx.runtime.allocator
    );
    let mut install = vec![Stmt::line(format!("{}* self = NativeInstance;", target.binding))];
    if !install_modern.is_empty() {
        install.push(Stmt::Conditional {
            symbol: ctx.conventions.legacy_define.clone(),
            then: install_legacy,
            otherwise: install_modern,
        });
    }
    ty.members.push(Member::Constructor(Constructor {
        modifiers: Modifiers::PUBLIC,
        params: Vec::new(),
        initializer: Some(allocate),
        body: install,
    }));
    ty.members.push(pointer_constructor(target));
    ty.members.push(wrap_method(target, ctx));
    ty.members.extend(virtuals.into_iter().map(Member::Method));

    let mut types = Vec::new();
    if !queries.is_empty() {
        ty.interfaces.push(TypeRef::named(&private));
        let mut iface = TypeDecl::new(&private, TypeKind::Interface, Modifiers::INTERNAL);
        for q in &queries {
            iface.members.push(Member::Method(Method::new(
                &q.name,
                TypeRef::named("bool"),
                Modifiers::empty(),
            )));
        }
        ty.members.extend(queries.into_iter().map(Member::Method));
        types.push(iface);
    }
    ty.members.extend(thunks);
    types.insert(0, ty);
    Ok(types)
}

fn virtual_method(target: &WrapperTarget<'_>, cb: &Callback<'_>, ctx: &PipelineContext) -> Method {
    let field = &cb.callable.field.name;
    let ret = cb.signature.managed_return();
    let mut method = Method::new(
        ctx.names.member_name(target.binding, field),
        ret.clone(),
        Modifiers::PROTECTED | Modifiers::INTERNAL | Modifiers::VIRTUAL,
    );
    method.params = cb.signature.managed_params();
    method.native_name = Some(field.clone());
    method.attributes.push(native_name_attribute(ctx, field));
    method.body = Some(if ret.is_void() {
        Vec::new()
    } else {
        vec![Stmt::line("return default;")]
    });
    method
}

fn thunk(
    target: &WrapperTarget<'_>,
    cb: &Callback<'_>,
    managed_method: &str,
    query: Option<&str>,
    private: &str,
    ctx: &PipelineContext,
) -> Method {
    let plan = &cb.thunk;
    let managed = &target.managed;
    let caller = &cb.callable.caller;

    let mut method = Method::new(
        format!("{caller}Impl"),
        plan.native_ret.clone(),
        Modifiers::PRIVATE | Modifiers::STATIC,
    );
    method.params = plan.native_params.clone();
    method.attributes.push(
        Attribute::new("UnmanagedCallersOnly")
            .arg(format!(
                "CallConvs = new[] {{ typeof(CallConv{}) }}",
                unmanaged_convention(cb.callable.signature.calling_convention)
            ))
            .unless(&ctx.conventions.legacy_define),
    );

    let mut skip: Vec<Stmt> = plan
        .params
        .iter()
        .filter(|p| matches!(&p.plan, ParameterMarshalPlan::RefCounted(o) if !o.by_ref))
        .map(|p| {
            Stmt::block(
                format!("if ({} != null)", p.ident),
                vec![Stmt::line(format!(
                    "(({}*){})->Release();",
                    ctx.conventions.ref_counted_base, p.ident
                ))],
            )
        })
        .collect();
    skip.push(if plan.native_ret.is_void() {
        Stmt::line("return;")
    } else {
        Stmt::line("return default;")
    });
    let condition = match query {
        Some(query) => format!("if (wrapper == null || !(({private})wrapper).{query}())"),
        None => "if (wrapper == null)".to_string(),
    };

    let Marshaled { pre, args, post } = handler_arguments(plan, ctx);
    let call = format!("wrapper.{managed_method}({})", args.join(", "));
    let mut body = vec![
        Stmt::line(format!(
            "{managed} wrapper = {}(self) as {managed};",
            ctx.runtime.instance_lookup
        )),
        Stmt::block(condition, skip),
    ];
    body.extend(pre);
    match &plan.ret {
        None => {
            body.push(Stmt::line(format!("{call};")));
            body.extend(post);
        }
        Some(ret) => {
            body.push(Stmt::line(format!(
                "{} managedResult = {call};",
                type_ref(&ret.managed_type())
            )));
            body.extend(post);
            body.push(return_or_discard(
                &plan.native_ret,
                value_to_native(ret, "managedResult", ctx),
            ));
        }
    }
    method.body = Some(body);
    method
}

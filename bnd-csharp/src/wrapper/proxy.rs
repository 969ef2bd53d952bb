//! Proxy wrappers: managed calls forwarded into an existing native instance.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::trace;

use crate::context::PipelineContext;
use crate::error::shape_bail;
use crate::ir::csharp::type_ref;
use crate::ir::*;
use crate::marshal::{Direction, Marshaled, MethodPlan, Planner, proxy_arguments, value_to_managed};

use super::property::{self, PropertyCandidate};
use super::{Callable, WrapperTarget, base_type, native_name_attribute, pointer_constructor, wrap_method};

pub fn build(
    target: &WrapperTarget<'_>,
    planner: &Planner<'_>,
    ctx: &PipelineContext,
) -> Result<Vec<TypeDecl>> {
    let mut ty = TypeDecl::new(
        &target.managed,
        TypeKind::Class,
        Modifiers::PUBLIC | Modifiers::UNSAFE | Modifiers::PARTIAL,
    );
    ty.base = Some(base_type(target, ctx));
    ty.members.push(pointer_constructor(target));
    ty.members.push(wrap_method(target, ctx));

    let callables = target.callables(ctx)?;
    let mut plans = Vec::with_capacity(callables.len());
    for c in &callables {
        plans.push(planner.plan_method(
            target.binding,
            &c.field.name,
            c.signature,
            c.receiver,
            Direction::ManagedToNative,
        )?);
    }

    let members: Vec<(&str, &MethodPlan)> = callables
        .iter()
        .zip(&plans)
        .map(|(c, p)| (c.field.name.as_str(), p))
        .collect();
    let properties = property::pair(&members);
    let accessors: BTreeSet<usize> = properties
        .iter()
        .flat_map(|p| std::iter::once(p.getter).chain(p.setter))
        .collect();

    let mut method_names = BTreeSet::new();
    let mut methods = Vec::new();
    for (i, (c, plan)) in callables.iter().zip(&plans).enumerate() {
        if accessors.contains(&i) {
            continue;
        }
        let name = ctx.names.member_name(target.binding, &c.field.name);
        trace!(owner = target.binding, method = %name, "proxy method");
        method_names.insert(name.clone());
        let mut method = Method::new(name, plan.managed_return(), Modifiers::PUBLIC);
        method.params = plan.managed_params();
        method.native_name = Some(c.field.name.clone());
        method.body = Some(invoke(c, plan, ctx));
        methods.push(Member::Method(method));
    }

    for p in &properties {
        if method_names.contains(&p.name) || p.name == target.managed {
            shape_bail!(
                target.binding,
                "property `{}` is ambiguous with a member of the same name",
                p.name
            );
        }
        ty.members
            .push(Member::Property(proxy_property(p, &callables, &plans, ctx)));
    }
    ty.members.extend(methods);
    Ok(vec![ty])
}

fn proxy_property(
    p: &PropertyCandidate,
    callables: &[Callable<'_>],
    plans: &[MethodPlan],
    ctx: &PipelineContext,
) -> Property {
    let getter = &callables[p.getter];
    let setter = p.setter.map(|s| {
        let mut plan = plans[s].clone();
        plan.params[0].managed_name = "value".to_string();
        invoke(&callables[s], &plan, ctx)
    });
    Property {
        name: p.name.clone(),
        ty: plans[p.getter].managed_return(),
        modifiers: Modifiers::PUBLIC,
        attributes: vec![native_name_attribute(ctx, &getter.field.name)],
        getter: Some(invoke(getter, &plans[p.getter], ctx)),
        setter,
        comment: Vec::new(),
    }
}

/// Marshal the arguments, call through `NativeInstance`, marshal the result.
fn invoke(c: &Callable<'_>, plan: &MethodPlan, ctx: &PipelineContext) -> Vec<Stmt> {
    let Marshaled { pre, args, post } = proxy_arguments(plan, ctx);
    let call = format!("NativeInstance->{}({})", c.caller, args.join(", "));
    let mut body = pre;
    match &plan.ret {
        None => {
            body.push(Stmt::line(format!("{call};")));
            body.extend(post);
        }
        Some(ret) if post.is_empty() => {
            body.push(Stmt::line(format!("return {};", value_to_managed(ret, &call, ctx))));
        }
        Some(ret) => {
            body.push(Stmt::line(format!(
                "{} nativeResult = {call};",
                type_ref(&plan.native_ret)
            )));
            body.extend(post);
            body.push(Stmt::line(format!(
                "return {};",
                value_to_managed(ret, "nativeResult", ctx)
            )));
        }
    }
    body
}

//! Parameter marshaling plans, shared by both wrapper directions.
//!
//! A plan is selected once per logical parameter from its native type and
//! never from the direction it is used in; proxies and handlers then read
//! the same plan forwards or backwards. [`ensure_symmetric`] checks that two
//! independently computed plans for one callable agree.

use anyhow::Result;
use tracing::trace;

use crate::classify::TypeClassification;
use crate::context::PipelineContext;
use crate::error::shape_bail;
use crate::ir::csharp::type_ref;
use crate::ir::{Param, ParamDirection, Stmt, TypeRef};
use crate::model::{CType, MethodSignature, ParamDescriptor};
use crate::naming::parameter_name;
use crate::native::{NativeSurface, native_type, param_ident};
use crate::tables::RETURN_VALUE;

/// Which side of the boundary produces the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A proxy forwarding a managed call into native code.
    ManagedToNative,
    /// A handler thunk forwarding a native call into managed code.
    NativeToManaged,
}

/// Fieldless view of [`ParameterMarshalPlan`] for comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlanVariant {
    Primitive,
    BoolAsInt,
    String,
    RefCounted,
    Scoped,
    SimpleStruct,
    Array,
    RawPointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringForm {
    /// `const cef_string_t*`: read-only input.
    Borrowed,
    /// `cef_string_t*`: in/out.
    Mutable,
    /// `cef_string_userfree_t`: ownership moves to the receiver.
    Userfree,
}

/// How a Simple or Sized type is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperForm {
    /// A value type holding the native struct.
    Struct,
    /// A class over a native block.
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub managed: String,
    pub native: String,
    /// `T**`: an object written back by the callee.
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructRef {
    pub managed: String,
    pub native: String,
    pub form: WrapperForm,
    pub pointer: bool,
    /// A non-const pointer the callee may write through.
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayPlan {
    /// Native name of the fused count parameter.
    pub count: String,
    pub count_by_ref: bool,
    pub element: Box<ParameterMarshalPlan>,
    pub element_native: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterMarshalPlan {
    /// Passed through unchanged: numbers, enums, mirrored typedef values.
    Primitive { ty: TypeRef, by_ref: bool },
    BoolAsInt { native: TypeRef },
    String(StringForm),
    RefCounted(ObjectRef),
    Scoped(ObjectRef),
    SimpleStruct(StructRef),
    Array(ArrayPlan),
    RawPointer { native: TypeRef },
}

impl ParameterMarshalPlan {
    pub fn variant(&self) -> PlanVariant {
        match self {
            ParameterMarshalPlan::Primitive { .. } => PlanVariant::Primitive,
            ParameterMarshalPlan::BoolAsInt { .. } => PlanVariant::BoolAsInt,
            ParameterMarshalPlan::String(_) => PlanVariant::String,
            ParameterMarshalPlan::RefCounted(_) => PlanVariant::RefCounted,
            ParameterMarshalPlan::Scoped(_) => PlanVariant::Scoped,
            ParameterMarshalPlan::SimpleStruct(_) => PlanVariant::SimpleStruct,
            ParameterMarshalPlan::Array(_) => PlanVariant::Array,
            ParameterMarshalPlan::RawPointer { .. } => PlanVariant::RawPointer,
        }
    }

    /// Managed type of the value, without `ref`.
    pub fn managed_type(&self) -> TypeRef {
        match self {
            ParameterMarshalPlan::Primitive { ty, .. } => ty.clone(),
            ParameterMarshalPlan::BoolAsInt { .. } => TypeRef::named("bool"),
            ParameterMarshalPlan::String(_) => TypeRef::named("string"),
            ParameterMarshalPlan::RefCounted(o) | ParameterMarshalPlan::Scoped(o) => {
                TypeRef::named(&o.managed)
            }
            ParameterMarshalPlan::SimpleStruct(s) => TypeRef::named(&s.managed),
            ParameterMarshalPlan::Array(a) => a.element.managed_type().array(),
            ParameterMarshalPlan::RawPointer { .. } => TypeRef::named("IntPtr"),
        }
    }

    /// Whether the managed parameter is passed by `ref`.
    pub fn by_ref(&self) -> bool {
        match self {
            ParameterMarshalPlan::Primitive { by_ref, .. } => *by_ref,
            ParameterMarshalPlan::String(form) => *form == StringForm::Mutable,
            ParameterMarshalPlan::RefCounted(o) | ParameterMarshalPlan::Scoped(o) => o.by_ref,
            ParameterMarshalPlan::SimpleStruct(s) => {
                s.form == WrapperForm::Struct && s.pointer && s.writable
            }
            _ => false,
        }
    }

    /// Whether a callback returning this can be answered with `default`
    /// without calling into managed code.
    pub fn has_default(&self) -> bool {
        matches!(
            self,
            ParameterMarshalPlan::Primitive { by_ref: false, .. }
                | ParameterMarshalPlan::BoolAsInt { .. }
                | ParameterMarshalPlan::RefCounted(_)
                | ParameterMarshalPlan::Scoped(_)
                | ParameterMarshalPlan::RawPointer { .. }
        )
    }
}

/// One logical parameter: a native parameter, or a fused count/array pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedParam {
    /// Native name, usable as a suffix for locals.
    pub raw: String,
    /// Native identifier as the binding spells it.
    pub ident: String,
    pub managed_name: String,
    pub native_ty: TypeRef,
    pub plan: ParameterMarshalPlan,
}

impl PlannedParam {
    /// Managed parameters this logical parameter contributes, in order.
    pub fn managed_params(&self) -> Vec<Param> {
        let mut out = Vec::new();
        if let ParameterMarshalPlan::Array(a) = &self.plan
            && a.count_by_ref
        {
            out.push(Param::new(count_managed_name(a), TypeRef::named("UIntPtr")).by_ref());
        }
        let mut param = Param::new(&self.managed_name, self.plan.managed_type());
        if self.plan.by_ref() {
            param.direction = ParamDirection::Ref;
        }
        out.push(param);
        out
    }
}

fn count_managed_name(a: &ArrayPlan) -> String {
    parameter_name(&a.count)
}

fn count_ident(a: &ArrayPlan) -> String {
    crate::naming::escape_identifier(&a.count)
}

/// Plans for every parameter and the return value of one callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPlan {
    pub direction: Direction,
    pub receiver: bool,
    /// All native parameters, receiver included.
    pub native_params: Vec<Param>,
    pub native_ret: TypeRef,
    pub params: Vec<PlannedParam>,
    /// `None` for `void`.
    pub ret: Option<ParameterMarshalPlan>,
}

impl MethodPlan {
    pub fn managed_params(&self) -> Vec<Param> {
        self.params.iter().flat_map(PlannedParam::managed_params).collect()
    }

    pub fn managed_return(&self) -> TypeRef {
        self.ret
            .as_ref()
            .map(ParameterMarshalPlan::managed_type)
            .unwrap_or(TypeRef::Void)
    }

    /// Whether an unoverridden callback can be answered without managed code.
    pub fn skippable(&self) -> bool {
        self.ret.as_ref().is_none_or(ParameterMarshalPlan::has_default)
    }
}

/// Fail when two plans for one callable selected different variants.
pub fn ensure_symmetric(subject: &str, a: &MethodPlan, b: &MethodPlan) -> Result<()> {
    if a.params.len() != b.params.len() {
        shape_bail!(
            subject,
            "marshaling plans disagree on parameter count ({} vs {})",
            a.params.len(),
            b.params.len()
        );
    }
    for (pa, pb) in a.params.iter().zip(&b.params) {
        if pa.plan.variant() != pb.plan.variant() {
            shape_bail!(
                subject,
                "parameter `{}` is marshaled as {:?} one way and {:?} the other",
                pa.raw,
                pa.plan.variant(),
                pb.plan.variant()
            );
        }
    }
    let variant = |p: &MethodPlan| p.ret.as_ref().map(ParameterMarshalPlan::variant);
    if variant(a) != variant(b) {
        shape_bail!(subject, "return value is marshaled asymmetrically");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan selection
// ---------------------------------------------------------------------------

/// Selects plans against the classification of one run.
pub struct Planner<'a> {
    ctx: &'a PipelineContext,
    surface: &'a NativeSurface<'a>,
}

impl<'a> Planner<'a> {
    pub fn new(ctx: &'a PipelineContext, surface: &'a NativeSurface<'a>) -> Self {
        Self { ctx, surface }
    }

    /// Plan a callable field `method` of the native struct `owner`.
    pub fn plan_method(
        &self,
        owner: &str,
        method: &str,
        sig: &MethodSignature,
        receiver: bool,
        direction: Direction,
    ) -> Result<MethodPlan> {
        let native_params: Vec<Param> = sig
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let ident = if receiver && i == 0 {
                    "self".to_string()
                } else {
                    param_ident(p, i)
                };
                Param::new(ident, native_type(&p.ty, self.surface))
            })
            .collect();

        let offset = usize::from(receiver);
        let rest = &sig.params[offset..];
        let mut params = Vec::new();
        let mut i = 0;
        while i < rest.len() {
            let index = i + offset;
            let p = &rest[i];
            if let Some(count_by_ref) = count_parameter(p)
                && let Some(items) = rest.get(i + 1)
                && items.ty.pointee().is_some()
            {
                params.push(self.plan_array(owner, method, p, count_by_ref, items, index + 1)?);
                i += 2;
                continue;
            }
            let plan = self.plan_param(owner, method, &p.name, &p.ty)?;
            params.push(planned(p, index, native_type(&p.ty, self.surface), plan));
            i += 1;
        }

        let ret = self.plan_return(owner, method, &sig.return_type)?;
        trace!(owner, method, params = params.len(), ?direction, "planned");
        Ok(MethodPlan {
            direction,
            receiver,
            native_params,
            native_ret: native_type(&sig.return_type, self.surface),
            params,
            ret,
        })
    }

    /// Plan a data field of `owner`. Table entries name the field in both
    /// the method and the parameter column.
    pub fn plan_field(&self, owner: &str, field: &str, ty: &CType) -> Result<ParameterMarshalPlan> {
        self.plan_param(owner, field, field, ty)
    }

    fn plan_array(
        &self,
        owner: &str,
        method: &str,
        count: &ParamDescriptor,
        count_by_ref: bool,
        items: &ParamDescriptor,
        index: usize,
    ) -> Result<PlannedParam> {
        let Some(element) = items.ty.pointee() else {
            shape_bail!(format!("{owner}::{method}"), "array `{}` is not a pointer", items.name);
        };
        let element_plan = self.plan_param(owner, method, &items.name, element)?;
        let supported = match &element_plan {
            ParameterMarshalPlan::Primitive { by_ref, .. } => !by_ref,
            ParameterMarshalPlan::RefCounted(o) | ParameterMarshalPlan::Scoped(o) => !o.by_ref,
            ParameterMarshalPlan::SimpleStruct(s) => !s.pointer,
            ParameterMarshalPlan::BoolAsInt { .. } | ParameterMarshalPlan::RawPointer { .. } => {
                true
            }
            _ => false,
        };
        if !supported {
            shape_bail!(
                format!("{owner}::{method}"),
                "unsupported array element in `{}`: {:?}",
                items.name,
                element_plan.variant()
            );
        }
        let plan = ParameterMarshalPlan::Array(ArrayPlan {
            count: count.name.clone(),
            count_by_ref,
            element: Box::new(element_plan),
            element_native: native_type(element, self.surface),
        });
        Ok(planned(items, index, native_type(&items.ty, self.surface), plan))
    }

    fn is_bool(&self, owner: &str, method: &str, param: &str, ty: &CType) -> bool {
        let native = native_type(ty, self.surface);
        is_integer(&native) && self.ctx.tables.bool_params.contains(owner, method, param)
    }

    fn managed_name(&self, binding: &str) -> String {
        self.ctx.names.type_name(binding)
    }

    fn object_ref(&self, binding: &str, by_ref: bool) -> Option<ParameterMarshalPlan> {
        let object = ObjectRef {
            managed: self.managed_name(binding),
            native: binding.to_string(),
            by_ref,
        };
        match self.ctx.classes.of(binding)? {
            TypeClassification::RefCounted => Some(ParameterMarshalPlan::RefCounted(object)),
            TypeClassification::Scoped => Some(ParameterMarshalPlan::Scoped(object)),
            _ => None,
        }
    }

    fn struct_ref(&self, binding: &str, pointer: bool, writable: bool) -> Option<ParameterMarshalPlan> {
        let decl = self.surface.struct_decl(binding)?;
        let class = self.ctx.classes.of(binding)?;
        if !matches!(class, TypeClassification::Simple | TypeClassification::Sized) {
            return None;
        }
        Some(ParameterMarshalPlan::SimpleStruct(StructRef {
            managed: self.managed_name(binding),
            native: binding.to_string(),
            form: wrapper_form(class, decl, self.ctx),
            pointer,
            writable,
        }))
    }

    fn plan_param(
        &self,
        owner: &str,
        method: &str,
        param: &str,
        ty: &CType,
    ) -> Result<ParameterMarshalPlan> {
        if self.is_bool(owner, method, param, ty) {
            return Ok(ParameterMarshalPlan::BoolAsInt {
                native: native_type(ty, self.surface),
            });
        }
        let raw_pointer = || ParameterMarshalPlan::RawPointer {
            native: native_type(ty, self.surface),
        };
        let plan = match ty {
            CType::Void => shape_bail!(format!("{owner}::{method}"), "`{param}` has type void"),
            CType::Ptr { pointee, is_const } => match pointee.as_ref() {
                CType::Ptr { pointee: inner, .. } => {
                    let object = inner
                        .name()
                        .and_then(|n| self.object_ref(self.surface.binding_name(n), true));
                    match object {
                        Some(plan) => plan,
                        None => shape_bail!(
                            format!("{owner}::{method}"),
                            "unsupported double indirection for `{param}`"
                        ),
                    }
                }
                CType::Named { name, .. } => {
                    let binding = self.surface.binding_name(name);
                    if binding == self.ctx.conventions.string_type {
                        ParameterMarshalPlan::String(if *is_const {
                            StringForm::Borrowed
                        } else {
                            StringForm::Mutable
                        })
                    } else if let Some(plan) = self.object_ref(binding, false) {
                        plan
                    } else if let Some(plan) = self.struct_ref(binding, true, !is_const) {
                        plan
                    } else {
                        match native_type(pointee, self.surface) {
                            TypeRef::Named(n) if !is_const => {
                                ParameterMarshalPlan::Primitive {
                                    ty: TypeRef::Named(n),
                                    by_ref: true,
                                }
                            }
                            _ => raw_pointer(),
                        }
                    }
                }
                inner if inner.is_primitive() && !is_const => ParameterMarshalPlan::Primitive {
                    ty: native_type(inner, self.surface),
                    by_ref: true,
                },
                _ => raw_pointer(),
            },
            CType::Named { name, .. } => {
                let binding = self.surface.binding_name(name);
                if binding == self.ctx.conventions.userfree_string_type {
                    ParameterMarshalPlan::String(StringForm::Userfree)
                } else if self.object_ref(binding, false).is_some() {
                    shape_bail!(
                        format!("{owner}::{method}"),
                        "`{param}` passes a counted object by value"
                    );
                } else if let Some(plan) = self.struct_ref(binding, false, false) {
                    plan
                } else {
                    match native_type(ty, self.surface) {
                        TypeRef::Pointer(_) => raw_pointer(),
                        other => ParameterMarshalPlan::Primitive {
                            ty: other,
                            by_ref: false,
                        },
                    }
                }
            }
            CType::Array { .. } | CType::FnPtr { .. } => raw_pointer(),
            primitive => ParameterMarshalPlan::Primitive {
                ty: native_type(primitive, self.surface),
                by_ref: false,
            },
        };
        Ok(plan)
    }

    fn plan_return(
        &self,
        owner: &str,
        method: &str,
        ty: &CType,
    ) -> Result<Option<ParameterMarshalPlan>> {
        if ty.is_void() {
            return Ok(None);
        }
        let native = native_type(ty, self.surface);
        let named_bool = ["is_", "has_", "can_"]
            .iter()
            .any(|prefix| method.starts_with(prefix));
        if is_integer(&native)
            && (named_bool || self.ctx.tables.bool_params.contains(owner, method, RETURN_VALUE))
        {
            return Ok(Some(ParameterMarshalPlan::BoolAsInt { native }));
        }
        let plan = match ty {
            CType::Ptr { pointee, .. } => pointee
                .name()
                .and_then(|n| self.object_ref(self.surface.binding_name(n), false))
                .unwrap_or(ParameterMarshalPlan::RawPointer { native }),
            _ => self.plan_param(owner, method, RETURN_VALUE, ty)?,
        };
        Ok(Some(plan))
    }
}

fn planned(p: &ParamDescriptor, index: usize, native_ty: TypeRef, plan: ParameterMarshalPlan) -> PlannedParam {
    let raw = if p.name.is_empty() {
        format!("param{index}")
    } else {
        p.name.clone()
    };
    PlannedParam {
        managed_name: parameter_name(&raw),
        ident: param_ident(p, index),
        raw,
        native_ty,
        plan,
    }
}

/// `Some(by_ref)` for an element-count parameter: named `...count` and
/// typed as a pointer-sized unsigned integer, or a pointer to one.
pub fn count_parameter(p: &ParamDescriptor) -> Option<bool> {
    if !p.name.to_ascii_lowercase().ends_with("count") {
        return None;
    }
    if p.ty.is_pointer_sized_unsigned() {
        Some(false)
    } else if p.ty.pointee().is_some_and(CType::is_pointer_sized_unsigned) {
        Some(true)
    } else {
        None
    }
}

fn is_integer(ty: &TypeRef) -> bool {
    matches!(
        ty,
        TypeRef::Named(n) if matches!(
            n.as_str(),
            "byte" | "sbyte" | "short" | "ushort" | "int" | "uint" | "long" | "ulong"
        )
    )
}

/// Simple types without owned strings are wrapped by value; Sized types and
/// Simple types with owned strings get a class over a native block.
pub fn wrapper_form(
    class: TypeClassification,
    decl: &crate::model::StructDecl,
    ctx: &PipelineContext,
) -> WrapperForm {
    if class == TypeClassification::Sized || !owned_string_fields(decl, ctx).is_empty() {
        WrapperForm::Class
    } else {
        WrapperForm::Struct
    }
}

/// Native names of fields holding an owned string.
pub fn owned_string_fields<'d>(decl: &'d crate::model::StructDecl, ctx: &PipelineContext) -> Vec<&'d str> {
    decl.fields
        .iter()
        .filter(|f| f.ty.name() == Some(ctx.conventions.string_type.as_str()))
        .map(|f| f.name.as_str())
        .collect()
}

// ---------------------------------------------------------------------------
// Code generation
// ---------------------------------------------------------------------------

/// Statements around a call and the arguments passed to it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Marshaled {
    pub pre: Vec<Stmt>,
    pub args: Vec<String>,
    pub post: Vec<Stmt>,
}

impl Marshaled {
    fn append(&mut self, other: Marshaled) {
        self.pre.extend(other.pre);
        self.args.extend(other.args);
        self.post.extend(other.post);
    }
}

/// Conversion of a single managed value to its native form.
pub fn value_to_native(plan: &ParameterMarshalPlan, e: &str, ctx: &PipelineContext) -> String {
    let strings = &ctx.runtime.string_helper;
    match plan {
        ParameterMarshalPlan::Primitive { .. } | ParameterMarshalPlan::Array(_) => e.to_string(),
        ParameterMarshalPlan::BoolAsInt { native } => {
            format!("({})({e} ? 1 : 0)", type_ref(native))
        }
        ParameterMarshalPlan::String(_) => format!("{strings}.CreateUserfree({e})"),
        ParameterMarshalPlan::RefCounted(_) | ParameterMarshalPlan::Scoped(_) => {
            format!("{e} != null ? {e}.GetNativeInstance() : null")
        }
        ParameterMarshalPlan::SimpleStruct(s) => match (s.form, s.pointer) {
            (WrapperForm::Struct, _) => format!("{e}._instance"),
            (WrapperForm::Class, false) => format!("*{e}.GetNativeInstance()"),
            (WrapperForm::Class, true) => format!("{e} != null ? {e}.GetNativeInstance() : null"),
        },
        ParameterMarshalPlan::RawPointer { native } => format!("({}){e}", type_ref(native)),
    }
}

/// Conversion of a single native value to its managed form.
pub fn value_to_managed(plan: &ParameterMarshalPlan, e: &str, ctx: &PipelineContext) -> String {
    let strings = &ctx.runtime.string_helper;
    match plan {
        ParameterMarshalPlan::Primitive { .. } | ParameterMarshalPlan::Array(_) => e.to_string(),
        ParameterMarshalPlan::BoolAsInt { .. } => format!("{e} != 0"),
        ParameterMarshalPlan::String(_) => format!("{strings}.ReadAndFree({e})"),
        ParameterMarshalPlan::RefCounted(o) | ParameterMarshalPlan::Scoped(o) => {
            format!("{}.Wrap({e})", o.managed)
        }
        ParameterMarshalPlan::SimpleStruct(s) => match (s.form, s.pointer) {
            (WrapperForm::Class, true) => format!("{e} != null ? new {}({e}) : null", s.managed),
            _ => format!("new {}({e})", s.managed),
        },
        ParameterMarshalPlan::RawPointer { .. } => format!("(IntPtr){e}"),
    }
}

/// Managed → native arguments for a proxy call.
pub fn proxy_arguments(plan: &MethodPlan, ctx: &PipelineContext) -> Marshaled {
    let mut out = Marshaled::default();
    for p in &plan.params {
        out.append(proxy_param(p, ctx));
    }
    out
}

fn proxy_param(p: &PlannedParam, ctx: &PipelineContext) -> Marshaled {
    let strings = &ctx.runtime.string_helper;
    let m = &p.managed_name;
    let local = format!("n_{}", p.raw);
    let mut out = Marshaled::default();
    match &p.plan {
        ParameterMarshalPlan::Primitive { ty, by_ref: true } => {
            out.pre.push(Stmt::line(format!("{} {local} = {m};", type_ref(ty))));
            out.args.push(format!("&{local}"));
            out.post.push(Stmt::line(format!("{m} = {local};")));
        }
        ParameterMarshalPlan::String(StringForm::Borrowed | StringForm::Mutable) => {
            let form = &p.plan;
            out.pre.push(Stmt::line(format!(
                "{} {local} = {strings}.Create({m});",
                ctx.conventions.string_type
            )));
            out.args.push(format!("&{local}"));
            if form.by_ref() {
                out.post.push(Stmt::line(format!("{m} = {strings}.Read(&{local});")));
            }
            out.post.push(Stmt::line(format!("{strings}.Free(&{local});")));
        }
        ParameterMarshalPlan::RefCounted(o) | ParameterMarshalPlan::Scoped(o) if o.by_ref => {
            out.pre.push(Stmt::line(format!(
                "{}* {local} = {m} != null ? {m}.GetNativeInstance() : null;",
                o.native
            )));
            out.args.push(format!("&{local}"));
            out.post
                .push(Stmt::line(format!("{m} = {}.Wrap({local});", o.managed)));
        }
        ParameterMarshalPlan::SimpleStruct(s) if s.form == WrapperForm::Struct && s.pointer => {
            out.pre
                .push(Stmt::line(format!("{} {local} = {m}._instance;", s.native)));
            out.args.push(format!("&{local}"));
            if s.writable {
                out.post
                    .push(Stmt::line(format!("{m} = new {}({local});", s.managed)));
            }
        }
        ParameterMarshalPlan::Array(a) => proxy_array(p, a, ctx, &mut out),
        plan => out.args.push(value_to_native(plan, m, ctx)),
    }
    out
}

fn proxy_array(p: &PlannedParam, a: &ArrayPlan, ctx: &PipelineContext, out: &mut Marshaled) {
    let allocator = &ctx.runtime.allocator;
    let m = &p.managed_name;
    let element = type_ref(&a.element_native);
    let buffer = format!("n_{}", p.raw);
    let length = format!("n_{}_length", p.raw);
    out.pre.push(Stmt::line(format!(
        "int {length} = {m} != null ? {m}.Length : 0;"
    )));
    out.pre.push(Stmt::line(format!(
        "{element}* {buffer} = ({element}*){allocator}.Allocate(sizeof({element}) * {length});"
    )));
    out.pre.push(Stmt::block(
        format!("for (int i = 0; i < {length}; i++)"),
        vec![Stmt::line(format!(
            "{buffer}[i] = {};",
            value_to_native(&a.element, &format!("{m}[i]"), ctx)
        ))],
    ));
    if a.count_by_ref {
        let count = count_managed_name(a);
        let count_local = format!("n_{}", a.count);
        out.pre
            .push(Stmt::line(format!("UIntPtr {count_local} = {count};")));
        out.args.push(format!("&{count_local}"));
        out.args.push(buffer.clone());
        out.post.push(Stmt::line(format!("{count} = {count_local};")));
        out.post.push(Stmt::block(
            format!("for (int i = 0; i < Math.Min((int){count_local}, {length}); i++)"),
            vec![Stmt::line(format!(
                "{m}[i] = {};",
                value_to_managed(&a.element, &format!("{buffer}[i]"), ctx)
            ))],
        ));
    } else {
        out.args.push(format!("(UIntPtr){length}"));
        out.args.push(buffer.clone());
    }
    out.post
        .push(Stmt::line(format!("{allocator}.Free({buffer});")));
}

/// Native → managed arguments for a handler thunk.
pub fn handler_arguments(plan: &MethodPlan, ctx: &PipelineContext) -> Marshaled {
    let mut out = Marshaled::default();
    for p in &plan.params {
        out.append(handler_param(p, ctx));
    }
    out
}

fn handler_param(p: &PlannedParam, ctx: &PipelineContext) -> Marshaled {
    let strings = &ctx.runtime.string_helper;
    let n = &p.ident;
    let local = format!("m_{}", p.raw);
    let mut out = Marshaled::default();
    match &p.plan {
        ParameterMarshalPlan::Primitive { ty, by_ref: true } => {
            out.pre
                .push(Stmt::line(format!("{} {local} = *{n};", type_ref(ty))));
            out.args.push(format!("ref {local}"));
            out.post.push(Stmt::line(format!("*{n} = {local};")));
        }
        ParameterMarshalPlan::String(StringForm::Borrowed) => {
            out.args.push(format!("{strings}.Read({n})"));
        }
        ParameterMarshalPlan::String(StringForm::Mutable) => {
            out.pre
                .push(Stmt::line(format!("string {local} = {strings}.Read({n});")));
            out.args.push(format!("ref {local}"));
            out.post
                .push(Stmt::line(format!("{strings}.Replace({n}, {local});")));
        }
        ParameterMarshalPlan::RefCounted(o) | ParameterMarshalPlan::Scoped(o) if o.by_ref => {
            out.pre.push(Stmt::line(format!(
                "{} {local} = {}.Wrap(*{n});",
                o.managed, o.managed
            )));
            out.args.push(format!("ref {local}"));
            out.post.push(Stmt::line(format!(
                "*{n} = {local} != null ? {local}.GetNativeInstance() : null;"
            )));
        }
        ParameterMarshalPlan::SimpleStruct(s) if s.form == WrapperForm::Struct && s.pointer => {
            if s.writable {
                out.pre.push(Stmt::line(format!(
                    "{} {local} = new {}(*{n});",
                    s.managed, s.managed
                )));
                out.args.push(format!("ref {local}"));
                out.post
                    .push(Stmt::line(format!("*{n} = {local}._instance;")));
            } else {
                out.args.push(format!("new {}(*{n})", s.managed));
            }
        }
        ParameterMarshalPlan::Array(a) => handler_array(p, a, ctx, &mut out),
        plan => out.args.push(value_to_managed(plan, n, ctx)),
    }
    out
}

fn handler_array(p: &PlannedParam, a: &ArrayPlan, ctx: &PipelineContext, out: &mut Marshaled) {
    let element = type_ref(&a.element.managed_type());
    let n = &p.ident;
    let count = count_ident(a);
    let local = format!("m_{}", p.raw);
    let length = if a.count_by_ref {
        let count_local = format!("m_{}", a.count);
        out.pre
            .push(Stmt::line(format!("UIntPtr {count_local} = *{count};")));
        count_local
    } else {
        count.clone()
    };
    out.pre.push(Stmt::line(format!(
        "{element}[] {local} = new {element}[(int){length}];"
    )));
    out.pre.push(Stmt::block(
        format!("for (int i = 0; i < {local}.Length; i++)"),
        vec![Stmt::line(format!(
            "{local}[i] = {};",
            value_to_managed(&a.element, &format!("{n}[i]"), ctx)
        ))],
    ));
    if a.count_by_ref {
        out.args.push(format!("ref {length}"));
        out.args.push(local.clone());
        out.post.push(Stmt::line(format!("*{count} = {length};")));
        out.post.push(Stmt::block(
            format!("for (int i = 0; i < Math.Min((int){length}, {local}.Length); i++)"),
            vec![Stmt::line(format!(
                "{n}[i] = {};",
                value_to_native(&a.element, &format!("{local}[i]"), ctx)
            ))],
        ));
    } else {
        out.args.push(local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, ty: CType) -> ParamDescriptor {
        ParamDescriptor::new(name, ty)
    }

    #[test]
    fn count_parameters_by_value_and_by_reference() {
        assert_eq!(count_parameter(&param("itemsCount", CType::USize)), Some(false));
        assert_eq!(
            count_parameter(&param("count", CType::ptr(CType::named("size_t")))),
            Some(true)
        );
        assert_eq!(count_parameter(&param("count", CType::I32)), None);
        assert_eq!(count_parameter(&param("size", CType::USize)), None);
    }

    #[test]
    fn skippable_returns() {
        let plan = |ret| MethodPlan {
            direction: Direction::NativeToManaged,
            receiver: true,
            native_params: Vec::new(),
            native_ret: TypeRef::Void,
            params: Vec::new(),
            ret,
        };
        assert!(plan(None).skippable());
        assert!(plan(Some(ParameterMarshalPlan::BoolAsInt {
            native: TypeRef::named("int")
        }))
        .skippable());
        assert!(!plan(Some(ParameterMarshalPlan::String(StringForm::Userfree))).skippable());
    }
}

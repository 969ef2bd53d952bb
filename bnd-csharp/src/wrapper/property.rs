//! Getter/setter pairing for proxy properties.

use std::collections::BTreeMap;

use tracing::debug;

use crate::marshal::{MethodPlan, ParameterMarshalPlan, StringForm};
use crate::naming::pascal_case;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Get,
    Set,
}

/// Accessor kind and property name of a native member name:
/// `get_url` → `Url`, `is_valid` → `IsValid`, `set_url` → `Url`.
pub fn accessor(native: &str) -> Option<(AccessorKind, String)> {
    let (kind, name) = if let Some(rest) = native.strip_prefix("get_") {
        (AccessorKind::Get, pascal_case(rest))
    } else if let Some(rest) = native.strip_prefix("set_") {
        (AccessorKind::Set, pascal_case(rest))
    } else if ["is_", "has_", "can_"].iter().any(|p| native.starts_with(p)) {
        (AccessorKind::Get, pascal_case(native))
    } else {
        return None;
    };
    (!name.is_empty()).then_some((kind, name))
}

/// A property over one getter and an optional setter, by member index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyCandidate {
    pub name: String,
    pub getter: usize,
    pub setter: Option<usize>,
}

fn is_getter(plan: &MethodPlan) -> bool {
    plan.ret.is_some() && plan.managed_params().is_empty()
}

fn is_setter(plan: &MethodPlan) -> bool {
    plan.ret.is_none()
        && plan.params.len() == 1
        && plan.managed_params().len() == 1
        && !plan.params[0].plan.by_ref()
}

/// Getter and setter agree on both the managed and the native type. An
/// owned string getter pairs with a borrowed string setter.
pub fn accessors_agree(getter: &MethodPlan, setter: &MethodPlan) -> bool {
    let (Some(ret), Some(param)) = (&getter.ret, setter.params.first()) else {
        return false;
    };
    if ret.managed_type() != param.plan.managed_type() {
        return false;
    }
    getter.native_ret == param.native_ty
        || matches!(
            (ret, &param.plan),
            (
                ParameterMarshalPlan::String(StringForm::Userfree),
                ParameterMarshalPlan::String(StringForm::Borrowed)
            )
        )
}

/// Pair `(native name, plan)` members into properties, in getter order.
/// Members not named in the result stay methods.
pub fn pair(members: &[(&str, &MethodPlan)]) -> Vec<PropertyCandidate> {
    let mut getters: BTreeMap<String, usize> = BTreeMap::new();
    let mut setters: BTreeMap<String, usize> = BTreeMap::new();
    for (i, (native, plan)) in members.iter().enumerate() {
        match accessor(native) {
            Some((AccessorKind::Get, name)) if is_getter(plan) => {
                getters.entry(name).or_insert(i);
            }
            Some((AccessorKind::Set, name)) if is_setter(plan) => {
                setters.entry(name).or_insert(i);
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    for (name, getter) in getters {
        let setter = match setters.get(&name) {
            Some(&setter) if accessors_agree(members[getter].1, members[setter].1) => Some(setter),
            Some(_) => {
                debug!(property = %name, "accessor types disagree, keeping methods");
                continue;
            }
            None => None,
        };
        out.push(PropertyCandidate {
            name,
            getter,
            setter,
        });
    }
    out.sort_by_key(|p| p.getter);
    out
}

//! Subtype testing.
//!
//! `is_subtype(a, b, invariant)` answers `a <: b`. In invariant mode it
//! answers "a and b denote the same type", up to free type variables on
//! the right, which is the rule for parameters of nominal families:
//! `Box{Int64} <: Box{Number}` is false even though `Int64 <: Number`.
//!
//! Nominal descriptors walk the supertype chain of `a` until they reach the
//! family of `b`, then compare parameters invariantly. Tuples are covariant
//! element-wise and may end in a `Vararg`.

use super::datatype::DataType;
use super::{Type, TypeVar};

/// Check `a <: b`.
///
/// Reflexive. Transitive in covariant mode.
pub fn is_subtype(a: &Type, b: &Type, invariant: bool) -> bool {
    if a == b {
        return true;
    }

    match (a, b) {
        (Type::Vararg(x), Type::Vararg(y)) => is_subtype(x, y, invariant),
        (Type::Vararg(_), _) | (_, Type::Vararg(_)) => false,

        (Type::Union(members), _) if !invariant => {
            members.iter().all(|m| is_subtype(m, b, false))
        }
        (_, Type::Var(var)) => within_bounds(a, var),
        (Type::Var(var), _) => !invariant && is_subtype(var.upper_bound(), b, false),

        (Type::Bottom, _) => !invariant,
        (_, Type::Union(members)) => {
            !invariant && members.iter().any(|m| is_subtype(a, m, false))
        }
        (Type::Union(_), _) => false,

        (_, Type::Any) => !invariant,
        (Type::Any, _) | (_, Type::Bottom) => false,

        (Type::Data(x), Type::Data(y)) => datatype_subtype(x, y, invariant),
    }
}

/// Check `var.lb <: a <: var.ub`.
#[inline]
pub(crate) fn within_bounds(a: &Type, var: &TypeVar) -> bool {
    is_subtype(a, var.upper_bound(), false) && is_subtype(var.lower_bound(), a, false)
}

fn datatype_subtype(x: &DataType, y: &DataType, invariant: bool) -> bool {
    if x.is_tuple() && y.is_tuple() {
        return tuple_subtype(x.params(), y, invariant);
    }
    if invariant {
        return x.same_family(y) && params_equal(x.params(), y.params());
    }

    match x.supertypes().find(|t| t.same_family(y)) {
        Some(ancestor) => params_equal(ancestor.params(), y.params()),
        None => false,
    }
}

#[inline]
fn params_equal(xs: &[Type], ys: &[Type]) -> bool {
    xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| is_subtype(x, y, true))
}

/// Check that a list of element types fits the tuple type `parent`.
///
/// Elements are compared pairwise with short-circuit. A trailing `Vararg`
/// in `parent` absorbs any remaining children, including none; a trailing
/// `Vararg` in `children` only fits a `Vararg` in `parent`.
pub fn tuple_subtype(children: &[Type], parent: &DataType, invariant: bool) -> bool {
    let parents = parent.params();
    let mut ci = 0;
    let mut pi = 0;

    loop {
        let child = children.get(ci);
        let par = parents.get(pi);

        match (child, par) {
            (None, None) => return true,
            (None, Some(p)) => {
                // Only an empty vararg tail is left to match.
                return !invariant && p.is_vararg() && pi + 1 == parents.len();
            }
            (Some(_), None) => return false,
            (Some(c), Some(p)) => {
                let c_var = c.is_vararg();
                let p_var = p.is_vararg();
                if c_var && !p_var {
                    return false;
                }

                let c_elem = vararg_element(c);
                let p_elem = vararg_element(p);
                if !is_subtype(c_elem, p_elem, invariant) {
                    return false;
                }

                if c_var && p_var {
                    return ci + 1 == children.len() && pi + 1 == parents.len();
                }
                ci += 1;
                if !p_var {
                    pi += 1;
                }
            }
        }
    }
}

#[inline]
fn vararg_element(ty: &Type) -> &Type {
    match ty {
        Type::Vararg(inner) => inner,
        other => other,
    }
}

/// Check mutual subtyping.
pub fn types_equal(a: &Type, b: &Type) -> bool {
    a == b || (is_subtype(a, b, false) && is_subtype(b, a, false))
}

/// Declared type of argument slot `i` of a signature.
///
/// Slots past a trailing `Vararg` take its element type.
pub fn nth_slot_type(sig: &DataType, i: usize) -> Option<Type> {
    let params = sig.params();
    match params.last() {
        Some(Type::Vararg(inner)) if i + 1 >= params.len() => Some((**inner).clone()),
        _ => params.get(i).cloned(),
    }
}

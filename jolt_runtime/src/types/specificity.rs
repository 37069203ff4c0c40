//! Method specificity.
//!
//! Signature `a` is more specific than `b` when every argument tuple
//! accepted by `a` is accepted by `b` but not the other way around. Both
//! directions are decided with [`type_match`], so type variables and the
//! diagonal rule take part in the ordering: `(T, T)` is more specific than
//! `(Any, Any)`.

use super::Type;
use super::matching::type_match;

/// Outcome of comparing two signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specificity {
    /// Left is strictly more specific.
    More,
    /// Right is strictly more specific.
    Less,
    /// Each fits the other.
    Equivalent,
    /// Neither fits the other.
    Incomparable,
}

/// Compare two signatures.
pub fn specificity(a: &Type, b: &Type) -> Specificity {
    let a_fits_b = type_match(a, b).is_some();
    let b_fits_a = type_match(b, a).is_some();
    match (a_fits_b, b_fits_a) {
        (true, false) => Specificity::More,
        (false, true) => Specificity::Less,
        (true, true) => Specificity::Equivalent,
        (false, false) => Specificity::Incomparable,
    }
}

/// Check whether two signatures accept exactly the same argument tuples.
///
/// Unlike [`types_equal`](super::types_equal), variables are matched against
/// each other rather than against their bounds, so `(T, T)` equals `(S, S)`
/// but not `(Any, Any)` or `(T, S)`.
#[inline]
pub fn signatures_equal(a: &Type, b: &Type) -> bool {
    specificity(a, b) == Specificity::Equivalent
}

/// Strict partial order: `a` is more specific than `b`.
#[inline]
pub fn more_specific(a: &Type, b: &Type) -> bool {
    specificity(a, b) == Specificity::More
}

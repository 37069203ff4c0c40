//! Structural matching with binding environments.
//!
//! `type_match(a, b)` unifies `a` against the pattern `b`. Type variables
//! in `b` are bound to the parts of `a` they cover; the result is the
//! binding environment, or `None` when `a` does not fit.
//!
//! # Diagonal variables
//!
//! A variable that occurs two or more times in covariant positions of the
//! pattern (tuple elements, never inside a nominal family's parameters) is
//! *diagonal*: it may only bind a concrete type. `(T, T)` therefore accepts
//! `(Int64, Int64)` but not `(Int64, String)`, even though both fit
//! `(Any, Any)`.
//!
//! When `a` is itself a signature, a diagonal variable of the pattern may
//! also bind a diagonal variable of `a`. This lets `(T, T)` match `(S, S)`
//! while `(T, S)` and `(Any, Any)` still fail against it.

use super::subtype::{is_subtype, types_equal, within_bounds};
use super::{Type, TypeVar};
use smallvec::SmallVec;
use std::sync::Arc;

/// Type variable bindings produced by a match.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    bindings: SmallVec<[(Arc<TypeVar>, Type); 4]>,
}

impl TypeEnv {
    /// Create an empty environment.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an environment from `(variable, binding)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Arc<TypeVar>, Type)>) -> Self {
        Self {
            bindings: pairs.into_iter().collect(),
        }
    }

    /// Look up the binding of `var`.
    pub fn get(&self, var: &TypeVar) -> Option<&Type> {
        self.bindings
            .iter()
            .find(|(v, _)| v.id() == var.id())
            .map(|(_, ty)| ty)
    }

    /// Look up a binding by variable name.
    pub fn get_by_name(&self, name: &str) -> Option<&Type> {
        self.bindings
            .iter()
            .find(|(v, _)| v.name() == name)
            .map(|(_, ty)| ty)
    }

    /// Add a binding.
    #[inline]
    pub fn bind(&mut self, var: Arc<TypeVar>, ty: Type) {
        self.bindings.push((var, ty));
    }

    /// Number of bindings.
    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check for no bindings.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterate over bindings in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<TypeVar>, &Type)> {
        self.bindings.iter().map(|(v, ty)| (v, ty))
    }

    fn truncate(&mut self, len: usize) {
        self.bindings.truncate(len);
    }
}

/// Match `a` against the pattern `b`.
pub fn type_match(a: &Type, b: &Type) -> Option<TypeEnv> {
    let mut matcher = Matcher {
        env: TypeEnv::new(),
        diagonal: diagonal_vars(b),
        left_diagonal: diagonal_vars(a),
    };
    matcher.matches(a, b, false).then_some(matcher.env)
}

struct Matcher {
    env: TypeEnv,
    diagonal: SmallVec<[u32; 4]>,
    left_diagonal: SmallVec<[u32; 4]>,
}

impl Matcher {
    fn matches(&mut self, a: &Type, b: &Type, invariant: bool) -> bool {
        if !b.has_free_vars() {
            return is_subtype(a, b, invariant);
        }

        match (a, b) {
            (_, Type::Var(var)) => self.bind(a, var),

            (Type::Vararg(x), Type::Vararg(y)) => self.matches(x, y, invariant),
            (Type::Vararg(_), _) | (_, Type::Vararg(_)) => false,

            (Type::Union(members), _) if !invariant => {
                members.iter().all(|m| self.matches(m, b, false))
            }
            (Type::Var(var), _) => !invariant && self.matches(var.upper_bound(), b, false),
            (Type::Bottom, _) => !invariant,

            (_, Type::Union(members)) => {
                if invariant {
                    return false;
                }
                let mark = self.env.len();
                for member in members.iter() {
                    if self.matches(a, member, false) {
                        return true;
                    }
                    self.env.truncate(mark);
                }
                false
            }

            (Type::Data(x), Type::Data(y)) => {
                if x.is_tuple() && y.is_tuple() {
                    return self.match_tuple(x.params(), y.params(), invariant);
                }
                let source = if invariant {
                    Some(&**x).filter(|x| x.same_family(y))
                } else {
                    x.supertypes().find(|t| t.same_family(y))
                };
                match source {
                    Some(source) => {
                        source.params().len() == y.params().len()
                            && source
                                .params()
                                .iter()
                                .zip(y.params())
                                .all(|(p, q)| self.matches(p, q, true))
                    }
                    None => false,
                }
            }

            _ => false,
        }
    }

    fn bind(&mut self, a: &Type, var: &Arc<TypeVar>) -> bool {
        if let Some(previous) = self.env.get(var) {
            // Bounds alone would equate `T` with `Any`.
            if previous.has_free_vars() || a.has_free_vars() {
                return previous == a;
            }
            return types_equal(previous, a);
        }
        if !within_bounds(a, var) {
            return false;
        }
        if self.diagonal.contains(&var.id()) && !a.is_concrete() && !self.is_left_diagonal(a) {
            return false;
        }
        self.env.bind(var.clone(), a.clone());
        true
    }

    fn is_left_diagonal(&self, a: &Type) -> bool {
        matches!(a, Type::Var(v) if self.left_diagonal.contains(&v.id()))
    }

    fn match_tuple(&mut self, children: &[Type], parents: &[Type], invariant: bool) -> bool {
        let mut ci = 0;
        let mut pi = 0;

        loop {
            match (children.get(ci), parents.get(pi)) {
                (None, None) => return true,
                (None, Some(p)) => return !invariant && p.is_vararg() && pi + 1 == parents.len(),
                (Some(_), None) => return false,
                (Some(c), Some(p)) => {
                    let c_var = c.is_vararg();
                    let p_var = p.is_vararg();
                    if c_var && !p_var {
                        return false;
                    }
                    let ok = match (c, p) {
                        (Type::Vararg(_), Type::Vararg(_)) => self.matches(c, p, invariant),
                        (_, Type::Vararg(inner)) => self.matches(c, inner, invariant),
                        _ => self.matches(c, p, invariant),
                    };
                    if !ok {
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
}

/// Variables that occur at least twice in covariant positions of `pattern`
/// and never in an invariant one.
fn diagonal_vars(pattern: &Type) -> SmallVec<[u32; 4]> {
    #[derive(Default)]
    struct Occurrence {
        id: u32,
        covariant: u32,
        invariant: u32,
    }

    fn visit(ty: &Type, invariant: bool, seen: &mut SmallVec<[Occurrence; 4]>) {
        if !ty.has_free_vars() {
            return;
        }
        match ty {
            Type::Var(var) => {
                let pos = match seen.iter().position(|o| o.id == var.id()) {
                    Some(pos) => pos,
                    None => {
                        seen.push(Occurrence {
                            id: var.id(),
                            ..Default::default()
                        });
                        seen.len() - 1
                    }
                };
                if invariant {
                    seen[pos].invariant += 1;
                } else {
                    seen[pos].covariant += 1;
                }
            }
            Type::Data(dt) => {
                let inner = invariant || !dt.is_tuple();
                for param in dt.params() {
                    visit(param, inner, seen);
                }
            }
            Type::Union(members) => {
                for member in members.iter() {
                    visit(member, invariant, seen);
                }
            }
            Type::Vararg(inner) => visit(inner, invariant, seen),
            Type::Any | Type::Bottom => {}
        }
    }

    let mut seen = SmallVec::new();
    visit(pattern, false, &mut seen);
    seen.into_iter()
        .filter(|o| o.covariant >= 2 && o.invariant == 0)
        .map(|o| o.id)
        .collect()
}

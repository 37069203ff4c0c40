//! Canonical type cache.
//!
//! Every descriptor is created here. Construction is keyed by
//! `(family id, parameters)`: a second request for the same shape returns
//! the descriptor built by the first, so descriptor identity is structural
//! identity and `uid` equality implies structural equality.
//!
//! ```text
//!   apply(Box, [Int64]) ──► lookup ──hit──► existing TypeRef
//!                              │
//!                             miss
//!                              ▼
//!        substitute supertype + fields, check bounds, lay out
//!                              │
//!                              ▼
//!        lock ─► lookup again ─► assign uid ─► insert ─► TypeRef
//! ```
//!
//! The uid is assigned under the lock, after the second lookup, so two
//! threads racing on the same shape never burn two uids.

use super::datatype::{DataType, Field, TypeFlags, TypeKind, TypeName, TypeRef};
use super::matching::TypeEnv;
use super::subtype::is_subtype;
use super::{Type, TypeVar};
use crate::error::TypeError;
use jolt_gc::WORD_SIZE;
use jolt_gc::heap::size_class::align_up;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Cache key: family id plus parameters.
type TypeKey = (u32, Box<[Type]>);

struct CacheState {
    types: FxHashMap<TypeKey, TypeRef>,
    /// Last uid handed out.
    uid_ctr: u32,
    next_serial: u32,
}

impl CacheState {
    fn next_uid(&mut self) -> u32 {
        self.uid_ctr = match self.uid_ctr.checked_add(1) {
            Some(uid) => uid,
            None => uid_exhausted(),
        };
        self.uid_ctr
    }
}

#[cold]
fn uid_exhausted() -> ! {
    panic!("type uid counter exhausted")
}

/// Owner of every type descriptor and type variable of a runtime.
pub struct TypeCache {
    state: Mutex<CacheState>,
    next_name_id: AtomicU32,
    next_var_id: AtomicU32,
    tuple_name: Arc<TypeName>,
    box_name: Arc<TypeName>,
}

impl TypeCache {
    /// Create a cache holding the reserved tuple and box families.
    pub fn new() -> Self {
        let tuple_name = Arc::new(TypeName::new(
            TypeName::TUPLE_ID,
            "Tuple",
            TypeKind::Tuple,
            Vec::new(),
            None,
            Vec::new(),
        ));

        let t = Arc::new(TypeVar::new(0, "T", Type::Bottom, Type::Any));
        let box_name = Arc::new(TypeName::new(
            TypeName::BOX_ID,
            "Box",
            TypeKind::Struct { mutable: true },
            vec![t.clone()],
            None,
            vec![("contents".to_string(), Type::Var(t))],
        ));

        Self {
            state: Mutex::new(CacheState {
                types: FxHashMap::default(),
                uid_ctr: 0,
                next_serial: 0,
            }),
            next_name_id: AtomicU32::new(TypeName::BOX_ID + 1),
            next_var_id: AtomicU32::new(1),
            tuple_name,
            box_name,
        }
    }

    // =========================================================================
    // Type Variables
    // =========================================================================

    /// Create a type variable with upper bound `ub`.
    pub fn typevar(&self, name: &str, ub: Type) -> Arc<TypeVar> {
        self.typevar_bounded(name, Type::Bottom, ub)
    }

    /// Create a type variable with both bounds.
    pub fn typevar_bounded(&self, name: &str, lb: Type, ub: Type) -> Arc<TypeVar> {
        let id = self.next_var_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(TypeVar::new(id, name, lb, ub))
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Declare an abstract family.
    pub fn declare_abstract(
        &self,
        name: &str,
        params: &[Arc<TypeVar>],
        super_type: Option<Type>,
    ) -> Result<Arc<TypeName>, TypeError> {
        self.declare(name, TypeKind::Abstract, params, super_type, Vec::new())
    }

    /// Declare a composite family.
    pub fn declare_struct(
        &self,
        name: &str,
        params: &[Arc<TypeVar>],
        super_type: Option<Type>,
        fields: &[(&str, Type)],
        mutable: bool,
    ) -> Result<Arc<TypeName>, TypeError> {
        if fields.iter().any(|(_, ty)| ty.is_vararg()) {
            return Err(TypeError::MisplacedVararg);
        }
        let fields = fields
            .iter()
            .map(|(n, ty)| (n.to_string(), ty.clone()))
            .collect();
        self.declare(name, TypeKind::Struct { mutable }, params, super_type, fields)
    }

    /// Declare a primitive bits type and return its only descriptor.
    pub fn declare_bits(
        &self,
        name: &str,
        super_type: Option<Type>,
        size: usize,
    ) -> Result<TypeRef, TypeError> {
        if size == 0 {
            return Err(TypeError::EmptyBits(name.to_string()));
        }
        let family = self.declare(name, TypeKind::Bits { size }, &[], super_type, Vec::new())?;
        self.apply(&family, &[])
    }

    fn declare(
        &self,
        name: &str,
        kind: TypeKind,
        params: &[Arc<TypeVar>],
        super_type: Option<Type>,
        fields: Vec<(String, Type)>,
    ) -> Result<Arc<TypeName>, TypeError> {
        if let Some(sup) = &super_type {
            let valid = matches!(sup, Type::Data(dt) if dt.is_abstract() && !dt.is_tuple());
            if !valid {
                return Err(TypeError::InvalidSupertype {
                    family: name.to_string(),
                    found: sup.to_string(),
                });
            }
        }

        let id = self.next_name_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(family = name, id, "declared type family");
        Ok(Arc::new(TypeName::new(
            id,
            name,
            kind,
            params.to_vec(),
            super_type,
            fields,
        )))
    }

    // =========================================================================
    // Instantiation
    // =========================================================================

    /// Instantiate a family with `params`.
    ///
    /// Returns the canonical descriptor for that shape, creating it on
    /// first use. The tuple family accepts any number of parameters.
    pub fn apply(&self, name: &Arc<TypeName>, params: &[Type]) -> Result<TypeRef, TypeError> {
        if name.is_tuple() {
            return self.tuple_type(params);
        }
        if params.len() != name.params().len() {
            return Err(TypeError::ParamCount {
                family: name.name().to_string(),
                expected: name.params().len(),
                found: params.len(),
            });
        }
        for (var, param) in name.params().iter().zip(params) {
            check_bound(name, var, param)?;
        }

        let key: TypeKey = (name.id(), params.into());
        if let Some(found) = self.state.lock().types.get(&key) {
            return Ok(found.clone());
        }

        let env = TypeEnv::from_pairs(name.params().iter().cloned().zip(params.iter().cloned()));

        let super_type = match name.super_template() {
            None => None,
            Some(template) => match self.substitute(template, &env)? {
                Type::Data(dt) => Some(dt),
                other => {
                    return Err(TypeError::InvalidSupertype {
                        family: name.name().to_string(),
                        found: other.to_string(),
                    });
                }
            },
        };

        let has_vars = params.iter().any(Type::has_free_vars);
        let mut flags = match name.kind() {
            TypeKind::Abstract => TypeFlags::ABSTRACT,
            TypeKind::Struct { mutable: true } => TypeFlags::MUTABLE,
            TypeKind::Struct { mutable: false } => TypeFlags::empty(),
            TypeKind::Bits { .. } => TypeFlags::BITS,
            TypeKind::Tuple => TypeFlags::TUPLE,
        };
        if has_vars {
            flags |= TypeFlags::HAS_VARS;
        } else if !flags.contains(TypeFlags::ABSTRACT) {
            flags |= TypeFlags::LEAF;
        }

        let (fields, size) = match name.kind() {
            _ if !flags.contains(TypeFlags::LEAF) => (Box::default(), 0),
            TypeKind::Bits { size } => (Box::default(), size),
            _ => {
                let templates = name
                    .field_templates()
                    .iter()
                    .map(|(n, ty)| Ok((n.clone(), self.substitute(ty, &env)?)))
                    .collect::<Result<Vec<_>, TypeError>>()?;
                compute_layout(templates)
            }
        };

        let dt = DataType::new(name.clone(), key.1.clone(), super_type, fields, size, flags);
        Ok(self.publish(key, dt))
    }

    /// Build a tuple type.
    ///
    /// A `Vararg` element is only allowed in last position.
    pub fn tuple_type(&self, elements: &[Type]) -> Result<TypeRef, TypeError> {
        for (i, element) in elements.iter().enumerate() {
            match element {
                Type::Vararg(inner) if i + 1 != elements.len() || inner.is_vararg() => {
                    return Err(TypeError::MisplacedVararg);
                }
                _ => {}
            }
        }
        Ok(self.intern_tuple(elements))
    }

    /// Build the concrete tuple type of a list of concrete element types.
    ///
    /// This is how a call site's argument types become a cache key.
    pub fn inst_concrete_tuple(&self, elements: &[TypeRef]) -> TypeRef {
        let elements: Vec<Type> = elements.iter().map(Type::from).collect();
        self.intern_tuple(&elements)
    }

    fn intern_tuple(&self, elements: &[Type]) -> TypeRef {
        let key: TypeKey = (TypeName::TUPLE_ID, elements.into());
        if let Some(found) = self.state.lock().types.get(&key) {
            return found.clone();
        }

        let mut flags = TypeFlags::TUPLE;
        if elements.iter().any(Type::has_free_vars) {
            flags |= TypeFlags::HAS_VARS;
        }
        let leaf = elements.iter().all(Type::is_concrete);
        let (fields, size) = if leaf {
            flags |= TypeFlags::LEAF;
            compute_layout(
                elements
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| ((i + 1).to_string(), ty.clone()))
                    .collect(),
            )
        } else {
            (Box::default(), 0)
        };

        let dt = DataType::new(
            self.tuple_name.clone(),
            key.1.clone(),
            None,
            fields,
            size,
            flags,
        );
        self.publish(key, dt)
    }

    /// Insert a freshly built descriptor, unless another thread won the race.
    fn publish(&self, key: TypeKey, mut dt: DataType) -> TypeRef {
        let mut state = self.state.lock();
        if let Some(found) = state.types.get(&key) {
            return found.clone();
        }

        let uid = if dt.is_leaf() { state.next_uid() } else { 0 };
        let serial = state.next_serial;
        state.next_serial += 1;
        dt.publish(uid, serial);

        let dt = Arc::new(dt);
        tracing::trace!(ty = %dt, uid, "new type descriptor");
        state.types.insert(key, dt.clone());
        dt
    }

    /// Replace type variables bound in `env`.
    pub fn substitute(&self, ty: &Type, env: &TypeEnv) -> Result<Type, TypeError> {
        if !ty.has_free_vars() {
            return Ok(ty.clone());
        }
        match ty {
            Type::Var(var) => Ok(env.get(var).cloned().unwrap_or_else(|| ty.clone())),
            Type::Union(members) => {
                let members = members
                    .iter()
                    .map(|m| self.substitute(m, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::union(members))
            }
            Type::Vararg(inner) => Ok(Type::vararg(self.substitute(inner, env)?)),
            Type::Data(dt) => {
                let params = dt
                    .params()
                    .iter()
                    .map(|p| self.substitute(p, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::Data(self.apply(dt.name(), &params)?))
            }
            Type::Any | Type::Bottom => Ok(ty.clone()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The tuple family.
    #[inline]
    pub fn tuple_name(&self) -> &Arc<TypeName> {
        &self.tuple_name
    }

    /// The reserved box family.
    #[inline]
    pub fn box_name(&self) -> &Arc<TypeName> {
        &self.box_name
    }

    /// Last uid handed out.
    pub fn uid_counter(&self) -> u32 {
        self.state.lock().uid_ctr
    }

    /// Reset the uid counter, e.g. when restoring saved runtime state.
    pub fn set_uid_counter(&self, value: u32) {
        self.state.lock().uid_ctr = value;
    }

    /// Number of canonical descriptors.
    pub fn len(&self) -> usize {
        self.state.lock().types.len()
    }

    /// Check if no descriptor has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeCache")
            .field("types", &self.len())
            .field("uid_counter", &self.uid_counter())
            .finish()
    }
}

/// Reject a parameter outside its formal variable's bounds.
///
/// Parameters that still mention type variables are checked when they are
/// matched, not here.
fn check_bound(name: &TypeName, var: &TypeVar, param: &Type) -> Result<(), TypeError> {
    if param.is_vararg() {
        return Err(TypeError::MisplacedVararg);
    }
    if param.has_free_vars() {
        return Ok(());
    }
    let within = is_subtype(param, var.upper_bound(), false)
        && is_subtype(var.lower_bound(), param, false);
    if within {
        Ok(())
    } else {
        Err(TypeError::BoundViolation {
            family: name.name().to_string(),
            param: var.name().to_string(),
            lower: var.lower_bound().to_string(),
            upper: var.upper_bound().to_string(),
            found: param.to_string(),
        })
    }
}

/// Lay out fields in declaration order.
///
/// Bits types are stored inline at their natural alignment; everything else
/// takes one reference word.
fn compute_layout(fields: Vec<(String, Type)>) -> (Box<[Field]>, usize) {
    let mut offset = 0;
    let mut max_align = 1;
    let mut laid_out = Vec::with_capacity(fields.len());

    for (name, ty) in fields {
        let (size, align, inline) = match &ty {
            Type::Data(dt) if dt.is_bits() => (dt.size(), natural_align(dt.size()), true),
            _ => (WORD_SIZE, WORD_SIZE, false),
        };
        offset = align_up(offset, align);
        laid_out.push(Field {
            name,
            ty,
            offset,
            size,
            inline,
        });
        offset += size;
        max_align = max_align.max(align);
    }

    (laid_out.into(), align_up(offset, max_align))
}

#[inline]
fn natural_align(size: usize) -> usize {
    if size.is_power_of_two() {
        size.min(WORD_SIZE)
    } else {
        1
    }
}

//! Generic function method tables.
//!
//! A table holds the declared methods of one generic function and the
//! specializations memoized for it, keyed by the uid of the concrete
//! argument tuple type. Entries are never removed.
//!
//! # Thread Safety
//!
//! Both collections sit behind `RwLock`s. Ranking works on a snapshot of
//! the method list, and the cache lock is only held for the lookup or the
//! insert itself, never while a compiler runs.

use super::specialization::Specialization;
use super::stats::DispatchStats;
use super::{Method, MethodBody};
use crate::error::{DispatchError, DispatchErrorKind, TypeError};
use crate::types::{
    Builtins, Type, TypeEnv, TypeRef, TypeVar, more_specific, signatures_equal, type_match,
};
use crate::value::newobj;
use jolt_gc::GcHeap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// The method chosen for a signature and the static parameters it bound.
#[derive(Debug, Clone)]
pub struct MethodMatch {
    /// Winning method.
    pub method: Arc<Method>,
    /// Bindings of the method's type variables.
    pub env: TypeEnv,
}

/// Methods and specialization cache of one generic function.
pub struct MethodTable {
    name: String,
    methods: RwLock<Vec<Arc<Method>>>,
    cache: RwLock<FxHashMap<u32, Arc<Specialization>>>,
    next_method_id: AtomicU32,
    next_spec_id: AtomicU32,
    stats: DispatchStats,
}

impl MethodTable {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: RwLock::new(Vec::new()),
            cache: RwLock::new(FxHashMap::default()),
            next_method_id: AtomicU32::new(0),
            next_spec_id: AtomicU32::new(0),
            stats: DispatchStats::new(),
        }
    }

    /// Generic function name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    // =========================================================================
    // Declaration
    // =========================================================================

    /// Declare a method.
    ///
    /// A method whose signature accepts exactly the same argument tuples as
    /// an existing one replaces it in place. Type variables are compared by
    /// how they bind, so `(T, T)` and `(Any, Any)` stay distinct. Specializations already cached keep the old body.
    pub fn add_method(
        &self,
        signature: TypeRef,
        tvars: Vec<Arc<TypeVar>>,
        body: MethodBody,
    ) -> Result<Arc<Method>, TypeError> {
        if !signature.is_tuple() {
            return Err(TypeError::NotATupleType(signature.to_string()));
        }

        let id = self.next_method_id.fetch_add(1, Ordering::Relaxed);
        let method = Arc::new(Method::new(id, signature, tvars, body));
        let sig = Type::from(method.signature());

        let mut methods = self.methods.write();
        match methods
            .iter()
            .position(|m| signatures_equal(&Type::from(m.signature()), &sig))
        {
            Some(pos) => {
                tracing::warn!(
                    function = %self.name,
                    signature = %sig,
                    "method definition overwritten"
                );
                methods[pos] = method.clone();
            }
            None => methods.push(method.clone()),
        }
        Ok(method)
    }

    /// Snapshot of the declared methods, in declaration order.
    pub fn methods(&self) -> Vec<Arc<Method>> {
        self.methods.read().clone()
    }

    /// Number of declared methods.
    pub fn method_count(&self) -> usize {
        self.methods.read().len()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Pick the most specific method applicable to `signature`.
    ///
    /// Works for any tuple type, concrete or not, and does not touch the
    /// specialization cache.
    pub fn resolve(&self, signature: &TypeRef) -> Result<MethodMatch, DispatchError> {
        let sig = Type::from(signature);
        let methods = self.methods();

        let mut applicable: SmallVec<[(Arc<Method>, TypeEnv); 4]> = methods
            .into_iter()
            .filter_map(|m| {
                let env = type_match(&sig, &Type::from(m.signature()))?;
                Some((m, env))
            })
            .collect();

        if applicable.is_empty() {
            return Err(DispatchError::new(DispatchErrorKind::NoMethod, &self.name, signature));
        }

        let sigs: SmallVec<[Type; 4]> = applicable
            .iter()
            .map(|(m, _)| Type::from(m.signature()))
            .collect();
        let n = sigs.len();
        let dominated = |i: usize| (0..n).any(|j| j != i && more_specific(&sigs[j], &sigs[i]));
        let maximal: SmallVec<[usize; 4]> = (0..n).filter(|&i| !dominated(i)).collect();

        let candidates = |indices: &mut dyn Iterator<Item = usize>| -> Vec<TypeRef> {
            indices
                .map(|i| applicable[i].0.signature().clone())
                .collect()
        };

        let winner = match maximal.as_slice() {
            [] => {
                return Err(
                    DispatchError::new(DispatchErrorKind::CyclicSpecificity, &self.name, signature)
                        .with_candidates(candidates(&mut (0..n))),
                );
            }
            [winner] => *winner,
            _ => {
                return Err(
                    DispatchError::new(DispatchErrorKind::Ambiguous, &self.name, signature)
                        .with_candidates(candidates(&mut maximal.iter().copied())),
                );
            }
        };

        // A lone maximal element must still beat every other candidate.
        let unbeaten: SmallVec<[usize; 4]> = (0..n)
            .filter(|&j| j != winner && !more_specific(&sigs[winner], &sigs[j]))
            .collect();
        if !unbeaten.is_empty() {
            return Err(
                DispatchError::new(DispatchErrorKind::Ambiguous, &self.name, signature)
                    .with_candidates(candidates(
                        &mut std::iter::once(winner).chain(unbeaten.iter().copied()),
                    )),
            );
        }

        let (method, env) = applicable.swap_remove(winner);
        Ok(MethodMatch { method, env })
    }

    /// Cached specialization for a concrete argument tuple type.
    pub fn cached(&self, argtypes: &TypeRef) -> Option<Arc<Specialization>> {
        self.cache.read().get(&argtypes.uid()).cloned()
    }

    /// Find or create the specialization for a concrete argument tuple type.
    pub fn lookup(
        &self,
        heap: &GcHeap,
        builtins: &Builtins,
        argtypes: &TypeRef,
    ) -> Result<Arc<Specialization>, DispatchError> {
        if !argtypes.is_tuple() || !argtypes.is_leaf() {
            return Err(DispatchError::new(DispatchErrorKind::NotConcrete, &self.name, argtypes));
        }

        if let Some(spec) = self.cached(argtypes) {
            self.stats.record_hit();
            tracing::trace!(function = %self.name, signature = %argtypes, "dispatch cache hit");
            return Ok(spec);
        }
        self.stats.record_miss();

        let found = self.resolve(argtypes)?;
        Ok(self.instantiate(heap, builtins, found, argtypes))
    }

    /// Create the specialization of `found` for `argtypes` and cache it.
    ///
    /// If the signature was specialized meanwhile, that record is returned
    /// and `found` is dropped.
    pub fn instantiate(
        &self,
        heap: &GcHeap,
        builtins: &Builtins,
        found: MethodMatch,
        argtypes: &TypeRef,
    ) -> Arc<Specialization> {
        let uid = argtypes.uid();
        let mut cache = self.cache.write();
        if let Some(existing) = cache.get(&uid) {
            return existing.clone();
        }

        let id = self.next_spec_id.fetch_add(1, Ordering::Relaxed);
        let record = newobj(heap, &builtins.method_instance, 2);
        // SAFETY: MethodInstance records have two word fields.
        unsafe {
            record.set_field_word(0, uid as usize);
            record.set_field_word(1, id as usize);
        }

        let spec = Arc::new(Specialization::new(
            id,
            argtypes.clone(),
            found.method,
            found.env,
            record,
        ));
        cache.insert(uid, spec.clone());
        drop(cache);

        self.stats.record_specialization();
        tracing::debug!(
            function = %self.name,
            signature = %argtypes,
            method = spec.method().id(),
            "new specialization"
        );
        spec
    }

    /// Snapshot of the cached specializations, by creation order.
    pub fn specializations(&self) -> Vec<Arc<Specialization>> {
        let mut specs: Vec<_> = self.cache.read().values().cloned().collect();
        specs.sort_by_key(|s| s.id());
        specs
    }

    /// Number of cached specializations.
    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Dispatch statistics.
    #[inline]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("name", &self.name)
            .field("methods", &self.method_count())
            .field("specializations", &self.cache_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeCache;
    use jolt_gc::GcConfig;

    struct Fixture {
        heap: GcHeap,
        types: TypeCache,
        b: Builtins,
    }

    impl Fixture {
        fn new() -> Self {
            let types = TypeCache::new();
            let b = Builtins::new(&types).unwrap();
            Self {
                heap: GcHeap::new(GcConfig::for_testing()).unwrap(),
                types,
                b,
            }
        }

        fn sig(&self, elements: &[Type]) -> TypeRef {
            self.types.tuple_type(elements).unwrap()
        }

        fn args(&self, elements: &[&TypeRef]) -> TypeRef {
            let elements: Vec<TypeRef> = elements.iter().map(|&t| t.clone()).collect();
            self.types.inst_concrete_tuple(&elements)
        }
    }

    fn body(tag: &'static str) -> MethodBody {
        Arc::new(tag)
    }

    fn t(dt: &TypeRef) -> Type {
        Type::from(dt)
    }

    #[test]
    fn test_picks_most_specific() {
        let fx = Fixture::new();
        let table = MethodTable::new("f");
        table.add_method(fx.sig(&[t(&fx.b.number)]), vec![], body("number")).unwrap();
        table.add_method(fx.sig(&[t(&fx.b.int64)]), vec![], body("int")).unwrap();
        table.add_method(fx.sig(&[Type::Any]), vec![], body("any")).unwrap();

        let pick = |arg: &TypeRef| {
            let m = table.resolve(&fx.args(&[arg])).unwrap();
            *m.method.body_as::<&str>().unwrap()
        };
        assert_eq!(pick(&fx.b.int64), "int");
        assert_eq!(pick(&fx.b.float64), "number");
        assert_eq!(pick(&fx.b.string), "any");
    }

    #[test]
    fn test_no_method() {
        let fx = Fixture::new();
        let table = MethodTable::new("g");
        table.add_method(fx.sig(&[t(&fx.b.string)]), vec![], body("s")).unwrap();

        let err = table.resolve(&fx.args(&[&fx.b.int64])).unwrap_err();
        assert_eq!(err.kind, DispatchErrorKind::NoMethod);
        assert_eq!(err.function, "g");
    }

    #[test]
    fn test_ambiguous() {
        let fx = Fixture::new();
        let table = MethodTable::new("h");
        table
            .add_method(fx.sig(&[t(&fx.b.number), Type::Any]), vec![], body("l"))
            .unwrap();
        table
            .add_method(fx.sig(&[Type::Any, t(&fx.b.number)]), vec![], body("r"))
            .unwrap();

        let err = table
            .resolve(&fx.args(&[&fx.b.int64, &fx.b.int64]))
            .unwrap_err();
        assert_eq!(err.kind, DispatchErrorKind::Ambiguous);
        assert_eq!(err.candidates.len(), 2);

        // Only one applies here.
        let m = table.resolve(&fx.args(&[&fx.b.int64, &fx.b.string])).unwrap();
        assert_eq!(*m.method.body_as::<&str>().unwrap(), "l");
    }

    #[test]
    fn test_tie_broken_by_more_specific_method() {
        let fx = Fixture::new();
        let table = MethodTable::new("h");
        table
            .add_method(fx.sig(&[t(&fx.b.number), Type::Any]), vec![], body("l"))
            .unwrap();
        table
            .add_method(fx.sig(&[Type::Any, t(&fx.b.number)]), vec![], body("r"))
            .unwrap();
        table
            .add_method(fx.sig(&[t(&fx.b.number), t(&fx.b.number)]), vec![], body("both"))
            .unwrap();

        let m = table.resolve(&fx.args(&[&fx.b.int64, &fx.b.int64])).unwrap();
        assert_eq!(*m.method.body_as::<&str>().unwrap(), "both");
    }

    #[test]
    fn test_static_params_recorded() {
        let fx = Fixture::new();
        let table = MethodTable::new("same");
        let var = fx.types.typevar("T", Type::Any);
        table
            .add_method(
                fx.sig(&[Type::from(&var), Type::from(&var)]),
                vec![var.clone()],
                body("diag"),
            )
            .unwrap();
        table
            .add_method(fx.sig(&[Type::Any, Type::Any]), vec![], body("any"))
            .unwrap();

        let m = table.resolve(&fx.args(&[&fx.b.int64, &fx.b.int64])).unwrap();
        assert_eq!(*m.method.body_as::<&str>().unwrap(), "diag");
        assert_eq!(m.env.get(&var), Some(&t(&fx.b.int64)));

        let m = table.resolve(&fx.args(&[&fx.b.int64, &fx.b.string])).unwrap();
        assert_eq!(*m.method.body_as::<&str>().unwrap(), "any");
    }

    #[test]
    fn test_lookup_memoizes() {
        let fx = Fixture::new();
        let table = MethodTable::new("k");
        table.add_method(fx.sig(&[t(&fx.b.number)]), vec![], body("n")).unwrap();

        let argtypes = fx.args(&[&fx.b.int64]);
        let first = table.lookup(&fx.heap, &fx.b, &argtypes).unwrap();
        let second = table.lookup(&fx.heap, &fx.b, &argtypes).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(table.cache_len(), 1);
        assert_eq!(table.stats().snapshot(), (1, 1, 1));

        let record = first.record();
        assert!(record.isa(&fx.b.method_instance));
        assert_eq!(unsafe { record.field_word(0) }, argtypes.uid() as usize);
    }

    #[test]
    fn test_lookup_rejects_abstract_signature() {
        let fx = Fixture::new();
        let table = MethodTable::new("k");
        table.add_method(fx.sig(&[t(&fx.b.number)]), vec![], body("n")).unwrap();

        let err = table
            .lookup(&fx.heap, &fx.b, &fx.sig(&[t(&fx.b.number)]))
            .unwrap_err();
        assert_eq!(err.kind, DispatchErrorKind::NotConcrete);
    }

    #[test]
    fn test_instantiate_interns() {
        let fx = Fixture::new();
        let table = MethodTable::new("k");
        table.add_method(fx.sig(&[Type::Any]), vec![], body("a")).unwrap();

        let argtypes = fx.args(&[&fx.b.string]);
        let found = table.resolve(&argtypes).unwrap();
        let a = table.instantiate(&fx.heap, &fx.b, found.clone(), &argtypes);
        let b = table.instantiate(&fx.heap, &fx.b, found, &argtypes);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.specializations().len(), 1);
    }

    #[test]
    fn test_overwrite_replaces_in_place() {
        let fx = Fixture::new();
        let table = MethodTable::new("o");
        table.add_method(fx.sig(&[t(&fx.b.int64)]), vec![], body("old")).unwrap();
        table.add_method(fx.sig(&[t(&fx.b.string)]), vec![], body("s")).unwrap();
        table.add_method(fx.sig(&[t(&fx.b.int64)]), vec![], body("new")).unwrap();

        assert_eq!(table.method_count(), 2);
        let m = table.resolve(&fx.args(&[&fx.b.int64])).unwrap();
        assert_eq!(*m.method.body_as::<&str>().unwrap(), "new");
        assert_eq!(*table.methods()[0].body_as::<&str>().unwrap(), "new");
    }

    #[test]
    fn test_diagonal_coexists_with_wider_method() {
        let fx = Fixture::new();
        let table = MethodTable::new("eq");
        let t_var = fx.types.typevar("T", Type::Any);
        let s_var = fx.types.typevar("S", Type::Any);
        table
            .add_method(
                fx.sig(&[Type::from(&t_var), Type::from(&t_var)]),
                vec![t_var.clone()],
                body("diag"),
            )
            .unwrap();
        table
            .add_method(fx.sig(&[Type::Any, Type::Any]), vec![], body("any"))
            .unwrap();
        table
            .add_method(
                fx.sig(&[Type::from(&t_var), Type::from(&s_var)]),
                vec![t_var.clone(), s_var.clone()],
                body("pair"),
            )
            .unwrap();
        assert_eq!(table.method_count(), 2);
        assert_eq!(*table.methods()[0].body_as::<&str>().unwrap(), "diag");
        assert_eq!(*table.methods()[1].body_as::<&str>().unwrap(), "pair");

        // Renamed diagonal signature replaces the first one.
        table
            .add_method(
                fx.sig(&[Type::from(&s_var), Type::from(&s_var)]),
                vec![s_var.clone()],
                body("diag2"),
            )
            .unwrap();
        assert_eq!(table.method_count(), 2);
        let m = table.resolve(&fx.args(&[&fx.b.int64, &fx.b.int64])).unwrap();
        assert_eq!(*m.method.body_as::<&str>().unwrap(), "diag2");
        assert_eq!(m.env.get(&s_var), Some(&t(&fx.b.int64)));
    }

    #[test]
    fn test_non_tuple_signature_rejected() {
        let fx = Fixture::new();
        let table = MethodTable::new("bad");
        let err = table
            .add_method(fx.b.int64.clone(), vec![], body("x"))
            .unwrap_err();
        assert!(matches!(err, TypeError::NotATupleType(_)));
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let fx = Fixture::new();
        let sigs = [
            fx.sig(&[Type::Any]),
            fx.sig(&[t(&fx.b.real)]),
            fx.sig(&[t(&fx.b.signed)]),
        ];
        let orders = [[0, 1, 2], [2, 1, 0], [1, 0, 2], [2, 0, 1]];

        for order in orders {
            let table = MethodTable::new("p");
            for i in order {
                table
                    .add_method(sigs[i].clone(), vec![], Arc::new(i))
                    .unwrap();
            }
            let pick = |arg: &TypeRef| {
                let m = table.resolve(&fx.args(&[arg])).unwrap();
                *m.method.body_as::<usize>().unwrap()
            };
            assert_eq!(pick(&fx.b.int8), 2);
            assert_eq!(pick(&fx.b.float64), 1);
            assert_eq!(pick(&fx.b.string), 0);
        }
    }
}

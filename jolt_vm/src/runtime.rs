//! The runtime context.
//!
//! A [`Runtime`] owns everything dispatch touches: the heap, the canonical
//! type cache, the builtin types, the generic function registry and the
//! compiler. Several runtimes can live in one process without sharing any
//! of it.
//!
//! # Call Path
//!
//! ```text
//! call(name, args)
//!   └─► argtypes(args) ─► MethodTable::lookup ─► trampoline::invoke
//!                              │                      │
//!                              └─ MethodError         └─ CompileError
//! ```

use crate::compiler::Compiler;
use crate::config::RuntimeConfig;
use crate::error::{MethodError, RuntimeError};
use crate::function::GenericFunction;
use crate::stats::VmStats;
use crate::trampoline;
use jolt_gc::GcHeap;
use jolt_runtime::{
    Builtins, Method, MethodBody, Specialization, Type, TypeCache, TypeRef, TypeVar, Value,
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-independent runtime state.
pub struct Runtime {
    config: RuntimeConfig,
    heap: GcHeap,
    types: TypeCache,
    builtins: Builtins,
    functions: RwLock<Vec<Arc<GenericFunction>>>,
    by_name: RwLock<FxHashMap<String, u32>>,
    compiler: Arc<dyn Compiler>,
    stats: VmStats,
    gensym_ctr: AtomicU32,
}

impl Runtime {
    /// Create a runtime.
    pub fn new(config: RuntimeConfig, compiler: Arc<dyn Compiler>) -> Result<Self, RuntimeError> {
        config.validate()?;
        let heap = GcHeap::new(config.gc.clone())?;
        let types = TypeCache::new();
        let builtins = Builtins::new(&types)?;

        tracing::debug!(
            page_size = config.gc.page_size,
            types = types.len(),
            "runtime initialized"
        );

        Ok(Self {
            config,
            heap,
            types,
            builtins,
            functions: RwLock::new(Vec::new()),
            by_name: RwLock::new(FxHashMap::default()),
            compiler,
            stats: VmStats::new(),
            gensym_ctr: AtomicU32::new(0),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Configuration this runtime was created with.
    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Object heap.
    #[inline]
    pub fn heap(&self) -> &GcHeap {
        &self.heap
    }

    /// Canonical type cache.
    #[inline]
    pub fn types(&self) -> &TypeCache {
        &self.types
    }

    /// Builtin types.
    #[inline]
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Compiler collaborator.
    #[inline]
    pub fn compiler(&self) -> &Arc<dyn Compiler> {
        &self.compiler
    }

    /// Call and compilation counters.
    #[inline]
    pub fn stats(&self) -> &VmStats {
        &self.stats
    }

    // =========================================================================
    // Generic Functions
    // =========================================================================

    /// Get the generic function `name`, creating it if needed.
    pub fn function(&self, name: &str) -> Arc<GenericFunction> {
        if let Some(f) = self.lookup_function(name) {
            return f;
        }

        let mut by_name = self.by_name.write();
        let mut functions = self.functions.write();
        if let Some(&index) = by_name.get(name) {
            return functions[index as usize].clone();
        }

        let index = functions.len() as u32;
        let f = Arc::new(GenericFunction::new(&self.heap, &self.builtins, index, name));
        functions.push(f.clone());
        by_name.insert(name.to_string(), index);
        tracing::debug!(function = name, index, "new generic function");
        f
    }

    /// Get the generic function `name` if it exists.
    pub fn lookup_function(&self, name: &str) -> Option<Arc<GenericFunction>> {
        let index = *self.by_name.read().get(name)?;
        self.functions.read().get(index as usize).cloned()
    }

    /// Generic function a value stands for, if it is one.
    pub fn function_of(&self, value: Value) -> Option<Arc<GenericFunction>> {
        if !value.isa(&self.builtins.function) {
            return None;
        }
        // SAFETY: Function objects have one word field holding the index.
        let index = unsafe { value.field_word(0) };
        self.functions.read().get(index).cloned()
    }

    /// Number of generic functions.
    pub fn function_count(&self) -> usize {
        self.functions.read().len()
    }

    /// Declare a method of `name` for the given argument types.
    ///
    /// `tvars` lists the type variables occurring in `params`.
    pub fn add_method(
        &self,
        name: &str,
        params: &[Type],
        tvars: Vec<Arc<TypeVar>>,
        body: MethodBody,
    ) -> Result<Arc<Method>, RuntimeError> {
        let signature = self.types.tuple_type(params)?;
        let f = self.function(name);
        Ok(f.table().add_method(signature, tvars, body)?)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Concrete argument tuple type of `args`.
    pub fn argtypes(&self, args: &[Value]) -> TypeRef {
        let types: SmallVec<[TypeRef; 4]> = args.iter().map(|v| v.type_of()).collect();
        self.types.inst_concrete_tuple(&types)
    }

    /// Call the generic function `name`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let f = self
            .lookup_function(name)
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))?;
        self.dispatch(&f, args)
    }

    /// Call the generic function a value stands for.
    pub fn apply(&self, callee: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let f = self
            .function_of(callee)
            .ok_or_else(|| RuntimeError::NotCallable(callee.type_of().to_string()))?;
        self.dispatch(&f, args)
    }

    /// Bind `args` to a specialization of `f` and invoke it.
    pub fn dispatch(&self, f: &GenericFunction, args: &[Value]) -> Result<Value, RuntimeError> {
        let argtypes = self.argtypes(args);
        let spec = f
            .table()
            .lookup(&self.heap, &self.builtins, &argtypes)
            .map_err(|error| MethodError {
                error,
                args: args.to_vec(),
            })?;

        if self.config.trace_dispatch {
            tracing::info!(
                function = f.name(),
                signature = %argtypes,
                method = spec.method().id(),
                "dispatch"
            );
        }

        let mut full: SmallVec<[Value; 8]> = SmallVec::with_capacity(args.len() + 1);
        full.push(f.singleton());
        full.extend_from_slice(args);
        trampoline::invoke(self, &spec, &full)
    }

    /// Specialize and compile `name` for `argtypes` without calling it.
    pub fn precompile(
        &self,
        name: &str,
        argtypes: &[TypeRef],
    ) -> Result<Arc<Specialization>, RuntimeError> {
        let f = self
            .lookup_function(name)
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))?;
        let sig = self.types.inst_concrete_tuple(argtypes);
        let spec = f.table().lookup(&self.heap, &self.builtins, &sig)?;
        trampoline::ensure_compiled(self, &spec)?;
        Ok(spec)
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Fresh symbol name.
    pub fn gensym(&self, prefix: &str) -> String {
        let n = self.gensym_ctr.fetch_add(1, Ordering::Relaxed) + 1;
        format!("##{}#{}", prefix, n)
    }

    /// Last gensym number handed out.
    pub fn gensym_counter(&self) -> u32 {
        self.gensym_ctr.load(Ordering::Relaxed)
    }

    /// Restore the gensym counter, e.g. after loading saved state.
    pub fn set_gensym_counter(&self, value: u32) {
        self.gensym_ctr.store(value, Ordering::Relaxed);
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("functions", &self.function_count())
            .field("types", &self.types.len())
            .field("stats", &self.stats.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::NativeCompiler;
    use jolt_runtime::value::box_i64;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap()
    }

    #[test]
    fn test_function_registry() {
        let rt = runtime();
        let f = rt.function("f");
        let again = rt.function("f");
        assert!(Arc::ptr_eq(&f, &again));
        assert_eq!(rt.function("g").index(), 1);
        assert_eq!(rt.function_count(), 2);
        assert!(rt.lookup_function("h").is_none());
    }

    #[test]
    fn test_function_of_singleton() {
        let rt = runtime();
        let f = rt.function("f");
        let back = rt.function_of(f.singleton()).unwrap();
        assert!(Arc::ptr_eq(&f, &back));

        let x = box_i64(rt.heap(), rt.builtins(), 3);
        assert!(rt.function_of(x).is_none());
    }

    #[test]
    fn test_argtypes() {
        let rt = runtime();
        let x = box_i64(rt.heap(), rt.builtins(), 3);
        let sig = rt.argtypes(&[x, x]);
        assert_eq!(sig.to_string(), "Tuple{Int64,Int64}");
        assert!(sig.is_leaf());
    }

    #[test]
    fn test_gensym() {
        let rt = runtime();
        assert_eq!(rt.gensym("tmp"), "##tmp#1");
        assert_eq!(rt.gensym("tmp"), "##tmp#2");
        rt.set_gensym_counter(41);
        assert_eq!(rt.gensym("x"), "##x#42");
        assert_eq!(rt.gensym_counter(), 42);
    }

    #[test]
    fn test_call_undefined() {
        let rt = runtime();
        let err = rt.call("nope", &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::UndefinedFunction(ref n) if n == "nope"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RuntimeConfig::for_testing();
        config.gc.page_size = 1000;
        let err = Runtime::new(config, Arc::new(NativeCompiler)).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}

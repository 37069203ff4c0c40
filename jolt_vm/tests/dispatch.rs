//! End-to-end dispatch tests: declaration, resolution, lazy compilation
//! and invocation through the runtime.

use jolt_runtime::value::{box_f64, box_i64, new_string, unbox_i64};
use jolt_runtime::{
    CompileState, DispatchErrorKind, EntryPoint, MethodBody, Specialization, Type, Value,
};
use jolt_vm::{CompileError, Compiler, NativeCompiler, Runtime, RuntimeConfig, RuntimeError};
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

// =============================================================================
// Helpers
// =============================================================================

unsafe extern "C" fn ret_first(callee: Value, args: *const Value, nargs: u32) -> Value {
    if nargs == 0 {
        callee
    } else {
        unsafe { *args }
    }
}

unsafe extern "C" fn ret_second(callee: Value, args: *const Value, nargs: u32) -> Value {
    if nargs < 2 {
        callee
    } else {
        unsafe { *args.add(1) }
    }
}

fn native(f: jolt_runtime::NativeFn) -> MethodBody {
    Arc::new(EntryPoint::new(f))
}

type Hook = Box<dyn Fn(&Runtime, &Arc<Specialization>) + Send + Sync>;

/// Compiler that counts compilations per signature and can fail or run a
/// callback while compiling.
#[derive(Default)]
struct TestCompiler {
    compiled: Mutex<Vec<String>>,
    entries: AtomicU32,
    fail_next: AtomicBool,
    panic_next: AtomicBool,
    hook: Option<Hook>,
}

impl TestCompiler {
    fn with_hook(hook: impl Fn(&Runtime, &Arc<Specialization>) + Send + Sync + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
            ..Default::default()
        }
    }

    fn count(&self, signature: &str) -> usize {
        self.compiled
            .lock()
            .iter()
            .filter(|s| s.as_str() == signature)
            .count()
    }

    fn total(&self) -> usize {
        self.compiled.lock().len()
    }
}

impl Compiler for TestCompiler {
    fn compile(&self, rt: &Runtime, spec: &Arc<Specialization>) -> Result<(), CompileError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CompileError::failed(spec, "injected failure"));
        }
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("code generator crashed on {}", spec.signature());
        }
        if let Some(hook) = &self.hook {
            hook(rt, spec);
        }
        self.compiled.lock().push(spec.signature().to_string());
        Ok(())
    }

    fn generate_fptr(
        &self,
        _rt: &Runtime,
        spec: &Arc<Specialization>,
    ) -> Result<EntryPoint, CompileError> {
        self.entries.fetch_add(1, Ordering::SeqCst);
        spec.method()
            .body_as::<EntryPoint>()
            .copied()
            .ok_or_else(|| CompileError::no_entry_point(spec, "not native"))
    }
}

/// Route runtime logs to the test harness. Filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn runtime_with(compiler: Arc<TestCompiler>) -> Runtime {
    init_tracing();
    Runtime::new(RuntimeConfig::for_testing(), compiler).unwrap()
}

fn int(rt: &Runtime) -> Type {
    Type::from(&rt.builtins().int64)
}

fn number(rt: &Runtime) -> Type {
    Type::from(&rt.builtins().number)
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn test_call_picks_most_specific() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    rt.add_method("pick", &[number(&rt), Type::Any], Vec::new(), native(ret_first))
        .unwrap();
    rt.add_method("pick", &[int(&rt), Type::Any], Vec::new(), native(ret_second))
        .unwrap();

    let a = box_i64(rt.heap(), rt.builtins(), 1);
    let b = box_i64(rt.heap(), rt.builtins(), 2);
    let out = rt.call("pick", &[a, b]).unwrap();
    assert_eq!(unbox_i64(out, rt.builtins()), Some(2));

    let x = box_f64(rt.heap(), rt.builtins(), 1.5);
    let out = rt.call("pick", &[x, b]).unwrap();
    assert_eq!(out, x);
}

#[test]
fn test_ambiguity_detected() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    rt.add_method("amb", &[number(&rt), Type::Any], Vec::new(), native(ret_first))
        .unwrap();
    rt.add_method("amb", &[Type::Any, number(&rt)], Vec::new(), native(ret_second))
        .unwrap();

    let a = box_i64(rt.heap(), rt.builtins(), 1);
    let b = box_i64(rt.heap(), rt.builtins(), 2);
    let err = rt.call("amb", &[a, b]).unwrap_err();
    assert_eq!(err.dispatch_kind(), Some(DispatchErrorKind::Ambiguous));

    match err {
        RuntimeError::Method(e) => {
            assert_eq!(e.function(), "amb");
            assert_eq!(e.args, vec![a, b]);
            assert_eq!(e.argtypes().to_string(), "Tuple{Int64,Int64}");
            assert_eq!(e.error.candidates.len(), 2);
            assert!(e.to_string().starts_with("ambiguous method call amb(::Int64, ::Int64)"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_no_method() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    let string = Type::from(&rt.builtins().string);
    rt.add_method("greet", &[string], Vec::new(), native(ret_first))
        .unwrap();

    let s = new_string(rt.heap(), rt.builtins(), "hi");
    assert_eq!(rt.call("greet", &[s]).unwrap(), s);

    let n = box_i64(rt.heap(), rt.builtins(), 7);
    let err = rt.call("greet", &[n]).unwrap_err();
    assert_eq!(err.dispatch_kind(), Some(DispatchErrorKind::NoMethod));
    assert_eq!(err.to_string(), "no method matching greet(::Int64)");
}

#[test]
fn test_dispatch_independent_of_declaration_order() {
    let pick = |order: &[usize]| {
        let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
        let b = rt.builtins();
        let candidates = [
            Type::from(&b.number),
            Type::from(&b.integer),
            Type::Any,
            Type::from(&b.signed),
        ];
        for &i in order {
            rt.add_method("f", &[candidates[i].clone()], Vec::new(), native(ret_first))
                .unwrap();
        }
        let spec = rt.precompile("f", &[b.int64.clone()]).unwrap();
        spec.method().signature().to_string()
    };

    assert_eq!(pick(&[0, 1, 2, 3]), "Tuple{Signed}");
    assert_eq!(pick(&[3, 2, 1, 0]), "Tuple{Signed}");
    assert_eq!(pick(&[2, 3, 0, 1]), "Tuple{Signed}");
}

#[test]
fn test_vararg_method() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    rt.add_method("first", &[Type::vararg(Type::Any)], Vec::new(), native(ret_first))
        .unwrap();

    let a = box_i64(rt.heap(), rt.builtins(), 1);
    let s = new_string(rt.heap(), rt.builtins(), "x");
    assert_eq!(rt.call("first", &[s, a, a]).unwrap(), s);

    let f = rt.lookup_function("first").unwrap();
    assert_eq!(rt.call("first", &[]).unwrap(), f.singleton());
}

#[test]
fn test_diagonal_static_parameter() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    let t = rt.types().typevar("T", number(&rt));
    let tv = Type::from(&t);
    rt.add_method("same", &[tv.clone(), tv], vec![t], native(ret_second))
        .unwrap();

    let spec = rt
        .precompile("same", &[rt.builtins().int64.clone(), rt.builtins().int64.clone()])
        .unwrap();
    assert_eq!(spec.static_params().get_by_name("T"), Some(&int(&rt)));

    let a = box_i64(rt.heap(), rt.builtins(), 1);
    let x = box_f64(rt.heap(), rt.builtins(), 2.0);
    let err = rt.call("same", &[a, x]).unwrap_err();
    assert_eq!(err.dispatch_kind(), Some(DispatchErrorKind::NoMethod));
}

#[test]
fn test_diagonal_method_coexists_with_wider_one() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    let t = rt.types().typevar("T", Type::Any);
    let tv = Type::from(&t);
    let diag = rt
        .add_method("eq", &[tv.clone(), tv], vec![t], native(ret_second))
        .unwrap();
    let wide = rt
        .add_method("eq", &[Type::Any, Type::Any], Vec::new(), native(ret_first))
        .unwrap();
    assert_eq!(rt.lookup_function("eq").unwrap().table().method_count(), 2);

    let a = box_i64(rt.heap(), rt.builtins(), 1);
    let b = box_i64(rt.heap(), rt.builtins(), 2);
    let x = box_f64(rt.heap(), rt.builtins(), 3.0);
    assert_eq!(rt.call("eq", &[a, b]).unwrap(), b);
    assert_eq!(rt.call("eq", &[a, x]).unwrap(), a);

    let int64 = rt.builtins().int64.clone();
    let float64 = rt.builtins().float64.clone();
    let same = rt.precompile("eq", &[int64.clone(), int64.clone()]).unwrap();
    let mixed = rt.precompile("eq", &[int64, float64]).unwrap();
    assert!(Arc::ptr_eq(same.method(), &diag));
    assert!(Arc::ptr_eq(mixed.method(), &wide));
}

// =============================================================================
// Compilation
// =============================================================================

#[test]
fn test_compile_once() {
    let compiler = Arc::new(TestCompiler::default());
    let rt = runtime_with(compiler.clone());
    rt.add_method("id", &[Type::Any], Vec::new(), native(ret_first))
        .unwrap();

    let f = rt.lookup_function("id").unwrap();
    for i in 0..10 {
        let v = box_i64(rt.heap(), rt.builtins(), i);
        assert_eq!(rt.call("id", &[v]).unwrap(), v);
    }

    assert_eq!(compiler.count("Tuple{Int64}"), 1);
    assert_eq!(compiler.entries.load(Ordering::SeqCst), 1);
    assert_eq!(f.table().cache_len(), 1);
    assert_eq!(f.table().stats().snapshot(), (9, 1, 1));
    assert_eq!(rt.stats().calls(), 10);

    let specs = f.table().specializations();
    assert!(matches!(specs[0].state(), CompileState::Ready(_)));
}

#[test]
fn test_same_record_per_signature() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    rt.add_method("id", &[Type::Any], Vec::new(), native(ret_first))
        .unwrap();

    let int64 = rt.builtins().int64.clone();
    let first = rt.precompile("id", &[int64.clone()]).unwrap();
    let second = rt.precompile("id", &[int64]).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.record(), second.record());
    assert!(first.record().isa(&rt.builtins().method_instance));
}

#[test]
fn test_compile_failure_is_retryable() {
    let compiler = Arc::new(TestCompiler::default());
    compiler.fail_next.store(true, Ordering::SeqCst);
    let rt = runtime_with(compiler.clone());
    rt.add_method("id", &[Type::Any], Vec::new(), native(ret_first))
        .unwrap();

    let v = box_i64(rt.heap(), rt.builtins(), 5);
    let err = rt.call("id", &[v]).unwrap_err();
    assert!(matches!(err, RuntimeError::Compile(CompileError::Failed { .. })));
    assert_eq!(rt.stats().compile_failures(), 1);

    let f = rt.lookup_function("id").unwrap();
    let spec = f.table().specializations().remove(0);
    assert!(matches!(spec.state(), CompileState::Uncompiled));

    assert_eq!(rt.call("id", &[v]).unwrap(), v);
    assert_eq!(compiler.count("Tuple{Int64}"), 1);
    assert_eq!(f.table().cache_len(), 1);
}

#[test]
fn test_compiler_panic_rolls_back() {
    let compiler = Arc::new(TestCompiler::default());
    compiler.panic_next.store(true, Ordering::SeqCst);
    let rt = runtime_with(compiler.clone());
    rt.add_method("id", &[Type::Any], Vec::new(), native(ret_first))
        .unwrap();

    let v = box_i64(rt.heap(), rt.builtins(), 5);
    let unwound = std::panic::catch_unwind(AssertUnwindSafe(|| rt.call("id", &[v])));
    assert!(unwound.is_err());
    assert_eq!(rt.stats().compile_failures(), 1);

    let f = rt.lookup_function("id").unwrap();
    let spec = f.table().specializations().remove(0);
    assert!(matches!(spec.state(), CompileState::Uncompiled));

    assert_eq!(rt.call("id", &[v]).unwrap(), v);
    assert_eq!(compiler.count("Tuple{Int64}"), 1);
    assert!(matches!(spec.state(), CompileState::Ready(_)));
}

#[test]
fn test_reentrant_call_during_compilation() {
    let inner = Arc::new(Mutex::new(None));
    let seen = inner.clone();
    let compiler = Arc::new(TestCompiler::with_hook(move |rt, spec| {
        // A body that calls itself with the same argument types.
        if spec.signature().to_string() == "Tuple{Int64}" {
            let v = box_i64(rt.heap(), rt.builtins(), 99);
            let out = rt.call("rec", &[v]).unwrap();
            *seen.lock() = unbox_i64(out, rt.builtins());
        }
    }));
    let rt = runtime_with(compiler.clone());
    rt.add_method("rec", &[Type::Any], Vec::new(), native(ret_first))
        .unwrap();

    let v = box_i64(rt.heap(), rt.builtins(), 1);
    assert_eq!(rt.call("rec", &[v]).unwrap(), v);

    assert_eq!(*inner.lock(), Some(99));
    assert_eq!(compiler.count("Tuple{Int64}"), 1);
    let f = rt.lookup_function("rec").unwrap();
    assert_eq!(f.table().cache_len(), 1);
    assert_eq!(f.table().stats().snapshot(), (1, 1, 1));
}

#[test]
fn test_nested_compilation_of_other_function() {
    let compiler = Arc::new(TestCompiler::with_hook(|rt, spec| {
        if spec.signature().to_string() == "Tuple{Float64}" {
            let v = box_i64(rt.heap(), rt.builtins(), 3);
            rt.call("inner", &[v]).unwrap();
        }
    }));
    let rt = runtime_with(compiler.clone());
    rt.add_method("outer", &[Type::Any], Vec::new(), native(ret_first))
        .unwrap();
    rt.add_method("inner", &[int(&rt)], Vec::new(), native(ret_first))
        .unwrap();

    let x = box_f64(rt.heap(), rt.builtins(), 0.5);
    assert_eq!(rt.call("outer", &[x]).unwrap(), x);

    assert_eq!(
        *compiler.compiled.lock(),
        vec!["Tuple{Int64}".to_string(), "Tuple{Float64}".to_string()]
    );

    let v = box_i64(rt.heap(), rt.builtins(), 4);
    rt.call("inner", &[v]).unwrap();
    assert_eq!(compiler.total(), 2);
}

// =============================================================================
// Runtime Surface
// =============================================================================

#[test]
fn test_apply() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    rt.add_method("id", &[Type::Any], Vec::new(), native(ret_first))
        .unwrap();

    let f = rt.lookup_function("id").unwrap();
    let v = box_i64(rt.heap(), rt.builtins(), 8);
    assert_eq!(rt.apply(f.singleton(), &[v]).unwrap(), v);

    let err = rt.apply(v, &[v]).unwrap_err();
    assert!(matches!(err, RuntimeError::NotCallable(ref ty) if ty == "Int64"));
}

#[test]
fn test_uid_coalescing() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    let b = rt.builtins();
    let t1 = rt.types().inst_concrete_tuple(&[b.int64.clone(), b.string.clone()]);
    let t2 = rt.types().inst_concrete_tuple(&[b.int64.clone(), b.string.clone()]);
    assert!(Arc::ptr_eq(&t1, &t2));
    assert_eq!(t1.uid(), t2.uid());
    assert_ne!(t1.uid(), 0);

    let boxed = rt.types().apply(rt.types().box_name(), &[int(&rt)]).unwrap();
    let again = rt.types().apply(rt.types().box_name(), &[int(&rt)]).unwrap();
    assert_eq!(boxed.uid(), again.uid());
}

#[test]
fn test_precompile_reports_dispatch_errors() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    rt.add_method("g", &[int(&rt)], Vec::new(), native(ret_first))
        .unwrap();

    let err = rt
        .precompile("g", &[rt.builtins().float64.clone()])
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Dispatch(_)));
    assert_eq!(err.dispatch_kind(), Some(DispatchErrorKind::NoMethod));

    let err = rt.precompile("missing", &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::UndefinedFunction(_)));
}

#[test]
fn test_native_compiler_rejects_opaque_body() {
    let rt = Runtime::new(RuntimeConfig::for_testing(), Arc::new(NativeCompiler)).unwrap();
    rt.add_method("opaque", &[Type::Any], Vec::new(), Arc::new("source"))
        .unwrap();

    let v = box_i64(rt.heap(), rt.builtins(), 1);
    let err = rt.call("opaque", &[v]).unwrap_err();
    assert!(matches!(err, RuntimeError::Compile(_)));
}

//! Runtime context and call dispatch for jolt.
//!
//! This crate ties the allocator and the dispatch core together:
//! - `Runtime`: owns the heap, the type cache and the generic functions
//! - `Compiler`: the code generator the runtime calls back into
//! - `trampoline`: compiles specializations on first call
//!
//! # Example
//!
//! ```ignore
//! use jolt_vm::{NativeCompiler, Runtime, RuntimeConfig};
//!
//! let rt = Runtime::new(RuntimeConfig::from_env(), Arc::new(NativeCompiler))?;
//! let int = Type::from(&rt.builtins().int64);
//! rt.add_method("double", &[int], Vec::new(), Arc::new(EntryPoint::new(double)))?;
//! let y = rt.call("double", &[x])?;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod compiler;
pub mod config;
pub mod error;
pub mod function;
pub mod runtime;
pub mod stats;
pub mod trampoline;

pub use compiler::{CompileError, Compiler, NativeCompiler};
pub use config::RuntimeConfig;
pub use error::{MethodError, RuntimeError};
pub use function::GenericFunction;
pub use runtime::Runtime;
pub use stats::VmStats;

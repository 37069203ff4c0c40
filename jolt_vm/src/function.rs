//! Generic functions.

use jolt_gc::GcHeap;
use jolt_runtime::{Builtins, MethodTable, Value, newobj};
use std::fmt;

/// A named generic function and its method table.
///
/// The singleton is the heap value standing for the function itself. It is
/// passed as the callee of every call and records the registry index in
/// its only field.
pub struct GenericFunction {
    index: u32,
    table: MethodTable,
    singleton: Value,
}

impl GenericFunction {
    pub(crate) fn new(heap: &GcHeap, builtins: &Builtins, index: u32, name: &str) -> Self {
        let singleton = newobj(heap, &builtins.function, 1);
        // SAFETY: Function objects have one word field.
        unsafe { singleton.set_field_word(0, index as usize) };
        Self {
            index,
            table: MethodTable::new(name),
            singleton,
        }
    }

    /// Registry index.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Function name.
    #[inline]
    pub fn name(&self) -> &str {
        self.table.name()
    }

    /// Method table.
    #[inline]
    pub fn table(&self) -> &MethodTable {
        &self.table
    }

    /// Heap value of the function.
    #[inline]
    pub fn singleton(&self) -> Value {
        self.singleton
    }
}

impl fmt::Debug for GenericFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericFunction")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("methods", &self.table.method_count())
            .finish()
    }
}

//! Tagged heap values.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────────┐
//! │ *const DataType (8B) │ payload (fields / bytes)        │
//! └──────────────────────┴─────────────────────────────────┘
//!  header word            ▲
//!                         └── Value points here
//! ```
//!
//! A [`Value`] is the address of the payload. The type reference lives in
//! the word right before it, so `type_of` is a single load. Tagging is the
//! only write that establishes an object's runtime type.
//!
//! Descriptors referenced from headers are canonical and owned by the
//! [`TypeCache`](crate::types::TypeCache); values must not outlive the
//! runtime that created them.

use crate::types::{Builtins, DataType, TypeRef};
use jolt_gc::{Allocation, GcHeap, HEADER_SIZE, WORD_SIZE};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// Handle to a tagged heap object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(NonNull<u8>);

// Safety: a Value is an address. Mutation through it is unsafe and
// synchronized by the owner of the object.
unsafe impl Send for Value {}
unsafe impl Sync for Value {}

impl Value {
    /// Wrap a payload pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point at the payload of a tagged object.
    #[inline]
    pub unsafe fn from_payload(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    /// Payload address.
    #[inline]
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    #[inline]
    fn header(self) -> *mut *const DataType {
        // SAFETY: every payload is preceded by its header word.
        unsafe { self.0.as_ptr().sub(HEADER_SIZE) as *mut *const DataType }
    }

    /// Raw descriptor pointer stored in the header.
    #[inline]
    pub fn type_ptr(self) -> *const DataType {
        // SAFETY: the header is written by `tag` before the value exists.
        unsafe { *self.header() }
    }

    /// The value's type.
    #[inline]
    pub fn type_of(self) -> TypeRef {
        let ptr = self.type_ptr();
        // SAFETY: `ptr` came from `Arc::as_ptr` on a canonical descriptor,
        // which the type cache keeps alive for the life of the runtime.
        unsafe {
            Arc::increment_strong_count(ptr);
            Arc::from_raw(ptr)
        }
    }

    /// Check if the value's type is exactly `ty`.
    #[inline]
    pub fn isa(self, ty: &TypeRef) -> bool {
        std::ptr::eq(self.type_ptr(), Arc::as_ptr(ty))
    }

    /// Check if the value belongs to the box family.
    ///
    /// Any instantiation counts: `Box{Int8}` and `Box{Any}` are both boxes.
    #[inline]
    pub fn is_box(self) -> bool {
        // SAFETY: see `type_of`.
        unsafe { (*self.type_ptr()).name().is_box() }
    }

    /// Read the `i`th pointer-sized word of the payload.
    ///
    /// # Safety
    ///
    /// The payload must hold at least `i + 1` initialized words.
    #[inline]
    pub unsafe fn field_word(self, i: usize) -> usize {
        // SAFETY: guaranteed by the caller.
        unsafe { *(self.as_ptr() as *const usize).add(i) }
    }

    /// Write the `i`th pointer-sized word of the payload.
    ///
    /// # Safety
    ///
    /// The payload must hold at least `i + 1` words, and no other reference
    /// to the object may be reading it concurrently.
    #[inline]
    pub unsafe fn set_field_word(self, i: usize, word: usize) {
        // SAFETY: guaranteed by the caller.
        unsafe { *(self.as_ptr() as *mut usize).add(i) = word }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:p}::{})", self.0, self.type_of())
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Stamp `ty` into a fresh allocation's header.
///
/// # Safety
///
/// `ty` must be canonical (obtained from a `TypeCache`) and concrete, and
/// the cache must outlive the returned value.
#[inline]
pub unsafe fn tag(alloc: Allocation, ty: &TypeRef) -> Value {
    debug_assert!(ty.is_leaf(), "tagging with non-concrete type {}", ty);
    let header = alloc.header().as_ptr() as *mut *const DataType;
    // SAFETY: the header word belongs to this allocation.
    unsafe { *header = Arc::as_ptr(ty) };
    Value(alloc.payload())
}

/// Allocate an object of type `ty` with `nfields` pointer-sized fields.
///
/// Zero to three fields take the fixed-arity lanes; more go through the
/// general path. The payload is left uninitialized.
pub fn newobj(heap: &GcHeap, ty: &TypeRef, nfields: usize) -> Value {
    let alloc = match nfields {
        0 => heap.alloc_0w(),
        1 => heap.alloc_1w(),
        2 => heap.alloc_2w(),
        3 => heap.alloc_3w(),
        _ => heap.alloc_words(nfields),
    };
    // SAFETY: descriptors handed to the runtime are canonical.
    unsafe { tag(alloc, ty) }
}

/// Allocate an object sized by its type's layout.
pub fn newstruct(heap: &GcHeap, ty: &TypeRef) -> Value {
    let alloc = heap.alloc_bytes(ty.size());
    // SAFETY: see `newobj`.
    unsafe { tag(alloc, ty) }
}

// =============================================================================
// Scalars
// =============================================================================

/// Box a 64-bit integer.
pub fn box_i64(heap: &GcHeap, builtins: &Builtins, x: i64) -> Value {
    let v = newstruct(heap, &builtins.int64);
    // SAFETY: Int64 payloads are 8 bytes, word aligned.
    unsafe { *(v.as_ptr() as *mut i64) = x };
    v
}

/// Read an `Int64` value.
pub fn unbox_i64(v: Value, builtins: &Builtins) -> Option<i64> {
    // SAFETY: type checked.
    v.isa(&builtins.int64)
        .then(|| unsafe { *(v.as_ptr() as *const i64) })
}

/// Box a 64-bit float.
pub fn box_f64(heap: &GcHeap, builtins: &Builtins, x: f64) -> Value {
    let v = newstruct(heap, &builtins.float64);
    // SAFETY: Float64 payloads are 8 bytes, word aligned.
    unsafe { *(v.as_ptr() as *mut f64) = x };
    v
}

/// Read a `Float64` value.
pub fn unbox_f64(v: Value, builtins: &Builtins) -> Option<f64> {
    // SAFETY: type checked.
    v.isa(&builtins.float64)
        .then(|| unsafe { *(v.as_ptr() as *const f64) })
}

/// Box a boolean.
pub fn box_bool(heap: &GcHeap, builtins: &Builtins, x: bool) -> Value {
    let v = newstruct(heap, &builtins.bool_);
    // SAFETY: Bool payloads are one byte.
    unsafe { *v.as_ptr() = x as u8 };
    v
}

/// Read a `Bool` value.
pub fn unbox_bool(v: Value, builtins: &Builtins) -> Option<bool> {
    // SAFETY: type checked.
    v.isa(&builtins.bool_).then(|| unsafe { *v.as_ptr() != 0 })
}

/// Allocate a string: a length word followed by the UTF-8 bytes.
pub fn new_string(heap: &GcHeap, builtins: &Builtins, s: &str) -> Value {
    let alloc = heap.alloc_bytes(WORD_SIZE + s.len());
    // SAFETY: String is concrete and canonical; the payload holds the
    // length word plus `s.len()` bytes.
    unsafe {
        let v = tag(alloc, &builtins.string);
        v.set_field_word(0, s.len());
        std::ptr::copy_nonoverlapping(s.as_ptr(), v.as_ptr().add(WORD_SIZE), s.len());
        v
    }
}

/// Copy a `String` value out of the heap.
pub fn string_value(v: Value, builtins: &Builtins) -> Option<String> {
    if !v.isa(&builtins.string) {
        return None;
    }
    // SAFETY: written by `new_string`.
    let bytes = unsafe {
        let len = v.field_word(0);
        std::slice::from_raw_parts(v.as_ptr().add(WORD_SIZE), len)
    };
    std::str::from_utf8(bytes).ok().map(str::to_owned)
}

/// Allocate a box holding a reference to `contents`.
///
/// `box_type` must be an instantiation of the box family whose contents
/// are stored by reference, such as `Box{Any}`.
pub fn new_box(heap: &GcHeap, box_type: &TypeRef, contents: Value) -> Value {
    debug_assert!(box_type.name().is_box());
    debug_assert!(box_type.fields().first().is_some_and(|f| !f.inline));
    let v = newobj(heap, box_type, 1);
    // SAFETY: one-word payload.
    unsafe { v.set_field_word(0, contents.as_ptr() as usize) };
    v
}

/// Read the reference held by a box.
pub fn box_contents(v: Value) -> Option<Value> {
    if !v.is_box() {
        return None;
    }
    let ty = v.type_of();
    if ty.fields().first().map_or(true, |f| f.inline) {
        return None;
    }
    // SAFETY: reference-holding boxes store a payload pointer in word 0.
    let word = unsafe { v.field_word(0) };
    NonNull::new(word as *mut u8).map(Value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Type, TypeCache};
    use jolt_gc::{GcConfig, SizeClass};

    fn setup() -> (GcHeap, TypeCache, Builtins) {
        let heap = GcHeap::new(GcConfig::for_testing()).unwrap();
        let cache = TypeCache::new();
        let b = Builtins::new(&cache).unwrap();
        (heap, cache, b)
    }

    #[test]
    fn test_tag_round_trip() {
        let (heap, _cache, b) = setup();
        for ty in [&b.int64, &b.box_any, &b.function, &b.method_instance] {
            let v = newstruct(&heap, ty);
            assert!(Arc::ptr_eq(&v.type_of(), ty));
            assert!(v.isa(ty));
        }
    }

    #[test]
    fn test_tag_is_word_before_payload() {
        let (heap, _cache, b) = setup();
        let alloc = heap.alloc_1w();
        let v = unsafe { tag(alloc, &b.int64) };
        assert_eq!(v.as_ptr() as usize - alloc.header().as_ptr() as usize, HEADER_SIZE);
    }

    #[test]
    fn test_newobj_uses_lanes() {
        let (heap, _cache, b) = setup();
        for nfields in 0..4 {
            newobj(&heap, &b.method_instance, nfields);
            assert_eq!(heap.stats().lane_count(nfields), 1);
        }
        let before = heap.stats().pool_allocations.load(std::sync::atomic::Ordering::Relaxed);
        newobj(&heap, &b.method_instance, 6);
        let after = heap.stats().pool_allocations.load(std::sync::atomic::Ordering::Relaxed);
        assert_eq!(after, before + 1);
    }

    #[test]
    #[should_panic(expected = "overflows the address space")]
    fn test_newobj_field_count_overflow_panics() {
        let (heap, _cache, b) = setup();
        newobj(&heap, &b.box_any, usize::MAX / 4);
    }

    #[test]
    fn test_newstruct_size() {
        let (heap, _cache, b) = setup();
        let alloc = heap.alloc_bytes(b.method_instance.size());
        assert_eq!(alloc.class(), SizeClass::Pool(2));
        let v = newstruct(&heap, &b.method_instance);
        assert!(v.isa(&b.method_instance));
    }

    #[test]
    fn test_scalars() {
        let (heap, _cache, b) = setup();

        let i = box_i64(&heap, &b, -42);
        assert_eq!(unbox_i64(i, &b), Some(-42));
        assert_eq!(unbox_f64(i, &b), None);

        let f = box_f64(&heap, &b, 2.5);
        assert_eq!(unbox_f64(f, &b), Some(2.5));

        let t = box_bool(&heap, &b, true);
        assert_eq!(unbox_bool(t, &b), Some(true));
        assert!(t.isa(&b.bool_));
    }

    #[test]
    fn test_strings() {
        let (heap, _cache, b) = setup();
        let s = new_string(&heap, &b, "hello");
        assert_eq!(string_value(s, &b).as_deref(), Some("hello"));

        let long = "x".repeat(4000);
        let big = new_string(&heap, &b, &long);
        assert_eq!(string_value(big, &b), Some(long));
        assert_eq!(heap.large_objects().count(), 1);
    }

    #[test]
    fn test_is_box_by_family() {
        let (heap, cache, b) = setup();
        let inner = box_i64(&heap, &b, 7);
        let boxed = new_box(&heap, &b.box_any, inner);

        assert!(boxed.is_box());
        assert!(!inner.is_box());
        assert_eq!(box_contents(boxed), Some(inner));
        assert_eq!(unbox_i64(box_contents(boxed).unwrap(), &b), Some(7));

        let box_i8 = cache.apply(cache.box_name(), &[Type::from(&b.int8)]).unwrap();
        let small = newstruct(&heap, &box_i8);
        assert!(small.is_box());
        assert_eq!(box_contents(small), None);
    }
}

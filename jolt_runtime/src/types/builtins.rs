//! The builtin type hierarchy.
//!
//! ```text
//! Any
//!  ├── Number
//!  │    └── Real
//!  │         ├── Integer
//!  │         │    ├── Signed ── Int8, Int16, Int32, Int64
//!  │         │    └── Bool
//!  │         └── AbstractFloat ── Float64
//!  ├── AbstractString ── String
//!  ├── Box{T}
//!  ├── Function
//!  ├── MethodInstance
//!  └── Tuple{...}
//! ```

use super::cache::TypeCache;
use super::datatype::TypeRef;
use super::Type;
use crate::error::TypeError;

/// Descriptors every runtime needs.
#[derive(Debug, Clone)]
pub struct Builtins {
    /// Root of the numeric tower.
    pub number: TypeRef,
    /// `Real <: Number`.
    pub real: TypeRef,
    /// `Integer <: Real`.
    pub integer: TypeRef,
    /// `Signed <: Integer`.
    pub signed: TypeRef,
    /// One-byte signed integer.
    pub int8: TypeRef,
    /// Two-byte signed integer.
    pub int16: TypeRef,
    /// Four-byte signed integer.
    pub int32: TypeRef,
    /// Eight-byte signed integer.
    pub int64: TypeRef,
    /// One-byte boolean, directly under `Integer`.
    pub bool_: TypeRef,
    /// `AbstractFloat <: Real`.
    pub abstract_float: TypeRef,
    /// IEEE double.
    pub float64: TypeRef,
    /// Abstract parent of `String`.
    pub abstract_string: TypeRef,
    /// Length word followed by the bytes.
    pub string: TypeRef,
    /// `Box{Any}`.
    pub box_any: TypeRef,
    /// Generic function singleton: one word holding the function index.
    pub function: TypeRef,
    /// Specialization record: signature uid and specialization id.
    pub method_instance: TypeRef,
    /// `Tuple{}`.
    pub empty_tuple: TypeRef,
}

impl Builtins {
    /// Declare the builtin hierarchy in `types`.
    pub fn new(types: &TypeCache) -> Result<Self, TypeError> {
        let abstract_type = |name: &str, sup: Option<&TypeRef>| -> Result<TypeRef, TypeError> {
            let family = types.declare_abstract(name, &[], sup.map(Type::from))?;
            types.apply(&family, &[])
        };
        let struct_type = |name: &str,
                           sup: Option<&TypeRef>,
                           fields: &[(&str, Type)]|
         -> Result<TypeRef, TypeError> {
            let family = types.declare_struct(name, &[], sup.map(Type::from), fields, false)?;
            types.apply(&family, &[])
        };

        let number = abstract_type("Number", None)?;
        let real = abstract_type("Real", Some(&number))?;
        let integer = abstract_type("Integer", Some(&real))?;
        let signed = abstract_type("Signed", Some(&integer))?;
        let abstract_float = abstract_type("AbstractFloat", Some(&real))?;
        let abstract_string = abstract_type("AbstractString", None)?;

        let int8 = types.declare_bits("Int8", Some(Type::from(&signed)), 1)?;
        let int16 = types.declare_bits("Int16", Some(Type::from(&signed)), 2)?;
        let int32 = types.declare_bits("Int32", Some(Type::from(&signed)), 4)?;
        let int64 = types.declare_bits("Int64", Some(Type::from(&signed)), 8)?;
        let bool_ = types.declare_bits("Bool", Some(Type::from(&integer)), 1)?;
        let float64 = types.declare_bits("Float64", Some(Type::from(&abstract_float)), 8)?;

        let string = struct_type("String", Some(&abstract_string), &[])?;
        let box_any = types.apply(types.box_name(), &[Type::Any])?;
        let function = struct_type("Function", None, &[("index", Type::from(&int64))])?;
        let method_instance = struct_type(
            "MethodInstance",
            None,
            &[
                ("sig_uid", Type::from(&int64)),
                ("index", Type::from(&int64)),
            ],
        )?;
        let empty_tuple = types.tuple_type(&[])?;

        Ok(Self {
            number,
            real,
            integer,
            signed,
            int8,
            int16,
            int32,
            int64,
            bool_,
            abstract_float,
            float64,
            abstract_string,
            string,
            box_any,
            function,
            method_instance,
            empty_tuple,
        })
    }
}

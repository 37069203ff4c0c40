//! Type descriptors.
//!
//! A [`TypeName`] describes a family (`Box`, `Int64`, `Tuple`): its formal
//! parameters, supertype template and field templates. A [`DataType`] is one
//! instantiation of a family with concrete or symbolic parameters, laid out
//! and canonicalized by the [`TypeCache`](super::TypeCache).

use super::{Type, TypeVar, write_list};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a canonical descriptor.
pub type TypeRef = Arc<DataType>;

// =============================================================================
// Type Flags
// =============================================================================

bitflags::bitflags! {
    /// Descriptor flags, computed once at construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u8 {
        /// Cannot be instantiated.
        const ABSTRACT = 1 << 0;
        /// Instances have identity and may be mutated.
        const MUTABLE = 1 << 1;
        /// Plain bits, stored inline in enclosing objects.
        const BITS = 1 << 2;
        /// Member of the tuple family.
        const TUPLE = 1 << 3;
        /// Concrete: values can have exactly this type.
        const LEAF = 1 << 4;
        /// Some parameter mentions a type variable.
        const HAS_VARS = 1 << 5;
    }
}

// =============================================================================
// Type Families
// =============================================================================

/// What kind of family a [`TypeName`] declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Abstract nominal type.
    Abstract,
    /// Composite type with named fields.
    Struct {
        /// Instances are mutable.
        mutable: bool,
    },
    /// Primitive bits type of a fixed byte size.
    Bits {
        /// Size in bytes.
        size: usize,
    },
    /// The variadic tuple family.
    Tuple,
}

/// A type family.
#[derive(Debug)]
pub struct TypeName {
    id: u32,
    name: String,
    kind: TypeKind,
    params: Box<[Arc<TypeVar>]>,
    super_template: Option<Type>,
    field_templates: Box<[(String, Type)]>,
}

impl TypeName {
    /// Id of the tuple family in every cache.
    pub const TUPLE_ID: u32 = 0;
    /// Id of the box family in every cache.
    pub const BOX_ID: u32 = 1;

    pub(crate) fn new(
        id: u32,
        name: impl Into<String>,
        kind: TypeKind,
        params: Vec<Arc<TypeVar>>,
        super_template: Option<Type>,
        field_templates: Vec<(String, Type)>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            params: params.into(),
            super_template,
            field_templates: field_templates.into(),
        }
    }

    /// Family id, unique within a cache.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Family name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Family kind.
    #[inline]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Formal parameters.
    #[inline]
    pub fn params(&self) -> &[Arc<TypeVar>] {
        &self.params
    }

    /// Declared supertype, in terms of the formal parameters.
    #[inline]
    pub fn super_template(&self) -> Option<&Type> {
        self.super_template.as_ref()
    }

    /// Declared fields, in terms of the formal parameters.
    #[inline]
    pub fn field_templates(&self) -> &[(String, Type)] {
        &self.field_templates
    }

    /// Check for the reserved box family.
    #[inline]
    pub fn is_box(&self) -> bool {
        self.id == Self::BOX_ID
    }

    /// Check for the tuple family.
    #[inline]
    pub fn is_tuple(&self) -> bool {
        self.id == Self::TUPLE_ID
    }
}

impl PartialEq for TypeName {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeName {}

// =============================================================================
// Descriptors
// =============================================================================

/// A field in a concrete layout.
#[derive(Debug, Clone)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Declared type, with family parameters substituted.
    pub ty: Type,
    /// Byte offset from the start of the payload.
    pub offset: usize,
    /// Bytes occupied in the payload.
    pub size: usize,
    /// Stored inline rather than as a reference word.
    pub inline: bool,
}

/// A canonical type descriptor.
///
/// Immutable once published. The `uid` is non-zero exactly for concrete
/// descriptors and never changes.
#[derive(Debug)]
pub struct DataType {
    name: Arc<TypeName>,
    params: Box<[Type]>,
    super_type: Option<TypeRef>,
    fields: Box<[Field]>,
    size: usize,
    flags: TypeFlags,
    uid: u32,
    serial: u32,
}

impl DataType {
    pub(crate) fn new(
        name: Arc<TypeName>,
        params: Box<[Type]>,
        super_type: Option<TypeRef>,
        fields: Box<[Field]>,
        size: usize,
        flags: TypeFlags,
    ) -> Self {
        Self {
            name,
            params,
            super_type,
            fields,
            size,
            flags,
            uid: 0,
            serial: 0,
        }
    }

    /// Stamp identity right before publication.
    pub(crate) fn publish(&mut self, uid: u32, serial: u32) {
        debug_assert_eq!(self.uid, 0, "uid assigned twice");
        self.uid = uid;
        self.serial = serial;
    }

    /// Family.
    #[inline]
    pub fn name(&self) -> &Arc<TypeName> {
        &self.name
    }

    /// Parameters (tuple elements for the tuple family).
    #[inline]
    pub fn params(&self) -> &[Type] {
        &self.params
    }

    /// Direct supertype; `None` means `Any`.
    #[inline]
    pub fn super_type(&self) -> Option<&TypeRef> {
        self.super_type.as_ref()
    }

    /// Laid-out fields. Empty for abstract and non-concrete descriptors.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Payload size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Flags.
    #[inline]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    /// Unique id of a concrete descriptor, 0 otherwise.
    #[inline]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Creation order within the cache.
    #[inline]
    pub(crate) fn serial(&self) -> u32 {
        self.serial
    }

    /// Declared abstract: no values, only subtypes.
    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(TypeFlags::ABSTRACT)
    }

    /// Fields may be written after construction.
    #[inline]
    pub fn is_mutable(&self) -> bool {
        self.flags.contains(TypeFlags::MUTABLE)
    }

    /// Plain bits with no pointer fields.
    #[inline]
    pub fn is_bits(&self) -> bool {
        self.flags.contains(TypeFlags::BITS)
    }

    /// Member of the tuple family.
    #[inline]
    pub fn is_tuple(&self) -> bool {
        self.flags.contains(TypeFlags::TUPLE)
    }

    /// Concrete: values can have exactly this type.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags.contains(TypeFlags::LEAF)
    }

    /// Parameters mention free type variables.
    #[inline]
    pub fn has_vars(&self) -> bool {
        self.flags.contains(TypeFlags::HAS_VARS)
    }

    /// Check family identity.
    #[inline]
    pub fn same_family(&self, other: &DataType) -> bool {
        self.name.id() == other.name.id()
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Walk from this descriptor up the supertype chain.
    pub fn supertypes(&self) -> impl Iterator<Item = &DataType> {
        std::iter::successors(Some(self), |dt| dt.super_type().map(|s| &**s))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.name())?;
        if self.is_tuple() || !self.params.is_empty() {
            f.write_str("{")?;
            write_list(f, &self.params)?;
            f.write_str("}")?;
        }
        Ok(())
    }
}

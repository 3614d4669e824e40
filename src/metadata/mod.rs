//! Type, field and method metadata supplied by the front end
//!
//! The analysis only ever reads metadata, through the [`ProgramMetadata`] capability trait. Types,
//! fields and methods are referred to by integer IDs handed out by the metadata itself, so an ID
//! is only meaningful for the metadata that produced it.
//!
//! [`ProgramGraph`] is the in-memory implementation. It is append-only and grows through shared
//! references, so an analysis can keep borrowing entities while the front end (or
//! [`ProgramMetadata::array_type_of`]) keeps adding new ones.

mod flags;
mod graph;

pub use flags::*;
pub use graph::*;

use crate::il::MethodBody;
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TypeId(pub usize);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FieldId(pub usize);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MethodId(pub usize);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeData {
    pub name: String,

    /// Base type (`None` only for the root of the hierarchy)
    pub base: Option<TypeId>,

    /// Element type, if this is an array type
    pub element: Option<TypeId>,
}

impl TypeData {
    pub fn new(name: impl Into<String>, base: Option<TypeId>) -> TypeData {
        TypeData {
            name: name.into(),
            base,
            element: None,
        }
    }

    pub fn is_array(&self) -> bool {
        self.element.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldData {
    pub declaring_type: TypeId,
    pub name: String,
    pub field_type: TypeId,
    pub flags: FieldFlags,
}

impl FieldData {
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodData {
    pub declaring_type: TypeId,
    pub name: String,
    pub parameters: Vec<TypeId>,

    /// `None` for void methods (and constructors)
    pub return_type: Option<TypeId>,

    pub flags: MethodFlags,
}

impl MethodData {
    pub fn new(
        declaring_type: TypeId,
        name: impl Into<String>,
        parameters: Vec<TypeId>,
        return_type: Option<TypeId>,
        flags: MethodFlags,
    ) -> MethodData {
        MethodData {
            declaring_type,
            name: name.into(),
            parameters,
            return_type,
            flags,
        }
    }

    /// Static methods and type initializers take no receiver
    pub fn is_static(&self) -> bool {
        self.flags
            .intersects(MethodFlags::STATIC | MethodFlags::TYPE_INITIALIZER)
    }

    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::CONSTRUCTOR)
    }

    pub fn returns_value(&self) -> bool {
        self.return_type.is_some()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }
}

/// Read-only view of program metadata needed by the analysis
///
/// Accessors taking an ID may panic if the ID was not produced by this metadata.
pub trait ProgramMetadata {
    fn type_data(&self, ty: TypeId) -> &TypeData;

    fn field(&self, field: FieldId) -> &FieldData;

    fn method(&self, method: MethodId) -> &MethodData;

    /// Body of the method, if it has one (abstract or external methods don't)
    fn method_body(&self, method: MethodId) -> Option<&MethodBody>;

    /// Static constructor of a type, if it declares one
    fn static_constructor_of(&self, ty: TypeId) -> Option<MethodId>;

    /// Type of `ldstr` results
    fn string_type(&self) -> TypeId;

    /// Runtime representation of types
    fn runtime_type_type(&self) -> TypeId;

    /// Single-dimensional array type with the given element type
    fn array_type_of(&self, element: TypeId) -> TypeId;

    fn is_always_inline(&self, method: MethodId) -> bool {
        self.method(method)
            .flags
            .contains(MethodFlags::ALWAYS_INLINE)
    }

    fn is_compiler_generated(&self, method: MethodId) -> bool {
        self.method(method)
            .flags
            .contains(MethodFlags::COMPILER_GENERATED)
    }
}

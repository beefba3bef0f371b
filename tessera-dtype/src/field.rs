//! Field declarations and the definitions derived from them.

use std::any::TypeId;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use crate::{FieldKind, Schema, SchemaDescriptor};

/// The name of a field within a schema.
pub type FieldName = Arc<str>;

/// The value range `[vmin, vmax]` of a normalized field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormRange {
    pub vmin: f64,
    pub vmax: f64,
}

impl Default for NormRange {
    fn default() -> Self {
        Self {
            vmin: 0.0,
            vmax: 1.0,
        }
    }
}

impl NormRange {
    pub const fn new(vmin: f64, vmax: f64) -> Self {
        Self { vmin, vmax }
    }

    fn unit(&self, value: f64) -> f64 {
        let span = self.vmax - self.vmin;
        if span == 0.0 {
            return 0.0;
        }
        ((value - self.vmin) / span).clamp(0.0, 1.0)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn quantize_u8(&self, value: f64) -> u8 {
        (self.unit(value) * f64::from(u8::MAX)).round() as u8
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn quantize_u16(&self, value: f64) -> u16 {
        (self.unit(value) * f64::from(u16::MAX)).round() as u16
    }

    pub fn dequantize_u8(&self, value: u8) -> f64 {
        self.vmin + (self.vmax - self.vmin) * f64::from(value) / f64::from(u8::MAX)
    }

    pub fn dequantize_u16(&self, value: u16) -> f64 {
        self.vmin + (self.vmax - self.vmin) * f64::from(value) / f64::from(u16::MAX)
    }
}

/// The record type a reference field points at.
///
/// Descriptors of nested types are resolved lazily, so self-referential and mutually referential
/// schemas can be declared.
#[derive(Clone, Copy)]
pub struct SchemaTarget {
    type_id: fn() -> TypeId,
    name: &'static str,
    describe: fn() -> Arc<SchemaDescriptor>,
}

impl SchemaTarget {
    pub fn of<S: Schema>() -> Self {
        Self {
            type_id: TypeId::of::<S>,
            name: S::NAME,
            describe: crate::describe::<S>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The descriptor of the target type, computed through the global registry.
    pub fn descriptor(&self) -> Arc<SchemaDescriptor> {
        (self.describe)()
    }
}

impl PartialEq for SchemaTarget {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl Eq for SchemaTarget {}

impl Debug for SchemaTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SchemaTarget").field(&self.name).finish()
    }
}

/// What a declared field is annotated with.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Kind(FieldKind),
    Record(SchemaTarget),
    /// An annotation that names no storable kind, kept for diagnostics.
    Unknown(&'static str),
}

/// Types that may annotate a field of a [`Schema`].
///
/// Implemented by the kind markers in [`crate::kinds`] and, through [`crate::schema!`], by every
/// record type.
pub trait FieldType {
    fn annotation() -> Annotation;
}

/// Zero-sized markers naming each storable field kind.
pub mod kinds {
    use super::{Annotation, FieldType};
    use crate::FieldKind;

    macro_rules! kind_marker {
        ($(#[$meta:meta])* $name:ident) => {
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $name;

            impl FieldType for $name {
                fn annotation() -> Annotation {
                    Annotation::Kind(FieldKind::$name)
                }
            }
        };
    }

    kind_marker!(U8);
    kind_marker!(U16);
    kind_marker!(U32);
    kind_marker!(I32);
    kind_marker!(
        /// Normalized over `[0, 1]` unless declared with a range.
        U8n
    );
    kind_marker!(
        /// Normalized over `[0, 1]` unless declared with a range.
        U16n
    );
    kind_marker!(F32);
    kind_marker!(F64);
    kind_marker!(Str);
    kind_marker!(WStr);
    kind_marker!(
        /// A raw byte blob.
        Bytes
    );

    impl FieldType for bool {
        fn annotation() -> Annotation {
            Annotation::Kind(FieldKind::U8)
        }
    }
}

/// One field as written in a schema declaration, before ordinals are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: &'static str,
    pub annotation: Annotation,
    pub range: NormRange,
}

impl FieldDecl {
    pub fn new<T: FieldType>(name: &'static str) -> Self {
        Self {
            name,
            annotation: T::annotation(),
            range: NormRange::default(),
        }
    }

    pub fn unknown(name: &'static str, annotation: &'static str) -> Self {
        Self {
            name,
            annotation: Annotation::Unknown(annotation),
            range: NormRange::default(),
        }
    }

    /// Set the value range of a normalized field.
    pub fn with_range(mut self, vmin: f64, vmax: f64) -> Self {
        self.range = NormRange::new(vmin, vmax);
        self
    }
}

/// A field of a [`SchemaDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    name: FieldName,
    kind: FieldKind,
    ordinal: u32,
    range: NormRange,
    target: Option<SchemaTarget>,
}

impl FieldDefinition {
    pub(crate) fn from_decl(decl: &FieldDecl, ordinal: u32) -> Self {
        let (kind, target) = match &decl.annotation {
            Annotation::Kind(kind) => (*kind, None),
            Annotation::Record(target) => (FieldKind::Ref, Some(*target)),
            Annotation::Unknown(_) => (FieldKind::Unknown, None),
        };
        Self {
            name: decl.name.into(),
            kind,
            ordinal,
            range: decl.range,
            target,
        }
    }

    pub fn name(&self) -> &FieldName {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn range(&self) -> NormRange {
        self.range
    }

    /// The declared record type of a reference field.
    pub fn target(&self) -> Option<&SchemaTarget> {
        self.target.as_ref()
    }
}

impl Display for FieldDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}: {}<{}>", self.name, self.kind, target.name()),
            None => write!(f, "{}: {}", self.name, self.kind),
        }
    }
}

use std::any::TypeId;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use tessera_error::{TesseraResult, tessera_err};

use crate::{FieldDecl, FieldDefinition, FieldKind, FieldName};

/// Field names starting with this prefix are bookkeeping and never become fields.
pub const RESERVED_PREFIX: &str = "_";

/// A record type whose rows can be stored in a layer.
///
/// Implement it with the [`schema!`](crate::schema!) macro unless a field needs a custom
/// normalization range or an explicit unknown annotation.
pub trait Schema: 'static {
    /// The layer name rows of this type are stored under.
    const NAME: &'static str;

    /// The fields of the type in declaration order.
    fn fields() -> Vec<FieldDecl>;
}

/// The reflected, ordered field list of one record type.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    type_id: TypeId,
    name: Arc<str>,
    fields: Arc<[FieldDefinition]>,
}

impl SchemaDescriptor {
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn reflect<S: Schema>() -> Self {
        let fields = S::fields()
            .iter()
            .filter(|decl| !decl.name.starts_with(RESERVED_PREFIX))
            .enumerate()
            .map(|(ordinal, decl)| FieldDefinition::from_decl(decl, ordinal as u32))
            .collect();
        Self {
            type_id: TypeId::of::<S>(),
            name: S::NAME.into(),
            fields,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The layer name of the type.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &FieldName> + '_ {
        self.fields.iter().map(FieldDefinition::name)
    }

    pub fn find(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name().as_ref() == name)
    }

    /// Look up a field by name, failing with a schema error if it is not declared or its kind is
    /// unknown.
    pub fn field(&self, name: &str) -> TesseraResult<&FieldDefinition> {
        let field = self.find(name).ok_or_else(|| {
            tessera_err!(Schema: "field \"{}\" not found in schema {}", name, self.name)
        })?;
        field.kind().check_declarable(name)?;
        Ok(field)
    }

    pub fn field_by_ordinal(&self, ordinal: u32) -> TesseraResult<&FieldDefinition> {
        self.fields.get(ordinal as usize).ok_or_else(|| {
            tessera_err!(OutOfBounds: ordinal as usize, 0, self.fields.len())
        })
    }

    /// Fails if any field has an unknown kind, i.e. if no layer can be declared from this schema.
    pub fn check_declarable(&self) -> TesseraResult<()> {
        self.fields
            .iter()
            .try_for_each(|f| f.kind().check_declarable(f.name()))
            .map_err(|e| e.with_context(format!("schema {} cannot declare a layer", self.name)))
    }

    /// Whether both descriptors describe the same Rust type.
    pub fn is_same_type(&self, other: &SchemaDescriptor) -> bool {
        self.type_id == other.type_id
    }

    /// Whether a layer with these `(name, kind)` columns can hold rows of this type.
    pub fn matches_columns<'a>(
        &self,
        columns: impl IntoIterator<Item = (&'a str, FieldKind)>,
    ) -> bool {
        let columns = columns.into_iter().collect_vec();
        columns.len() == self.fields.len()
            && self
                .fields
                .iter()
                .zip(columns)
                .all(|(field, (name, kind))| field.name().as_ref() == name && field.kind() == kind)
    }
}

impl PartialEq for SchemaDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for SchemaDescriptor {}

impl Display for SchemaDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{{}}}", self.name, self.fields.iter().format(", "))
    }
}

/// Declare record types.
///
/// Each declaration produces a unit struct implementing [`Schema`] and
/// [`FieldType`](crate::FieldType), so the type can itself annotate reference fields.
///
/// ```
/// use tessera_dtype::kinds::*;
///
/// tessera_dtype::schema! {
///     pub struct Point { x: F64, y: F64 }
///     pub struct Segment { from: Point, to: Point, label: Str }
/// }
///
/// let segment = tessera_dtype::describe::<Segment>();
/// assert_eq!(segment.fields()[1].name().as_ref(), "to");
/// ```
#[macro_export]
macro_rules! schema {
    ($(
        $(#[$meta:meta])*
        $vis:vis struct $name:ident { $($field:ident : $ty:ty),* $(,)? }
    )*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        $vis struct $name;

        impl $crate::Schema for $name {
            const NAME: &'static str = stringify!($name);

            fn fields() -> Vec<$crate::FieldDecl> {
                vec![$($crate::FieldDecl::new::<$ty>(stringify!($field))),*]
            }
        }

        impl $crate::FieldType for $name {
            fn annotation() -> $crate::Annotation {
                $crate::Annotation::Record($crate::SchemaTarget::of::<$name>())
            }
        }
    )*};
}

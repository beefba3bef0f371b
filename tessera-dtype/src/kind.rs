use std::fmt::{Debug, Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use tessera_error::{TesseraError, TesseraResult, tessera_err};

/// The storage kind of a single field of a record.
///
/// The discriminants are the kind codes written into serialized layouts and must never change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum FieldKind {
    /// An annotation that maps to no storable kind.
    Unknown = 0,
    /// An unsigned 8-bit integer
    U8 = 1,
    /// An unsigned 16-bit integer
    U16 = 2,
    /// An unsigned 32-bit integer
    U32 = 3,
    /// A signed 32-bit integer
    I32 = 4,
    /// A float in `[vmin, vmax]` quantized into a `u8`
    U8n = 5,
    /// A float in `[vmin, vmax]` quantized into a `u16`
    U16n = 6,
    /// An IEEE 754-2008 `binary32` float
    F32 = 7,
    /// An IEEE 754-2008 `binary64` float
    F64 = 8,
    /// A UTF-8 string
    Str = 9,
    /// A string stored as UTF-16 code units
    WStr = 10,
    /// A reference to a record in another (or the same) layer
    Ref = 11,
    /// An opaque, variable-length byte blob
    Bytes = 12,
}

impl FieldKind {
    /// Kinds that are stored as fixed-width numbers and may be written in place.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::U8
                | Self::U16
                | Self::U32
                | Self::I32
                | Self::U8n
                | Self::U16n
                | Self::F32
                | Self::F64
        )
    }

    /// Normalized kinds are read and written as floats but stored quantized.
    pub const fn is_normalized(self) -> bool {
        matches!(self, Self::U8n | Self::U16n)
    }

    /// Narrow and wide strings.
    pub const fn is_text(self) -> bool {
        matches!(self, Self::Str | Self::WStr)
    }

    /// Kinds whose cells have a variable length.
    pub const fn is_variable_width(self) -> bool {
        matches!(self, Self::Str | Self::WStr | Self::Bytes)
    }

    /// The width in bytes of one fixed-width cell, `None` for variable-width and unknown kinds.
    pub const fn byte_width(self) -> Option<usize> {
        match self {
            Self::U8 | Self::U8n => Some(1),
            Self::U16 | Self::U16n => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::F64 | Self::Ref => Some(8),
            Self::Str | Self::WStr | Self::Bytes | Self::Unknown => None,
        }
    }

    /// The numeric kind a normalized kind is physically stored as.
    pub const fn storage_kind(self) -> FieldKind {
        match self {
            Self::U8n => Self::U8,
            Self::U16n => Self::U16,
            other => other,
        }
    }

    /// Returns an error if this kind cannot be used to declare a field.
    pub fn check_declarable(self, field: &str) -> TesseraResult<()> {
        if self == Self::Unknown {
            return Err(tessera_err!(
                Schema: "field \"{}\" has an annotation that does not map to a field kind",
                field
            ));
        }
        Ok(())
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U8n => "u8n",
            Self::U16n => "u16n",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Str => "str",
            Self::WStr => "wstr",
            Self::Ref => "ref",
            Self::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

impl TryFrom<&str> for FieldKind {
    type Error = TesseraError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(match value {
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "i32" => Self::I32,
            "u8n" => Self::U8n,
            "u16n" => Self::U16n,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "str" => Self::Str,
            "wstr" => Self::WStr,
            "ref" => Self::Ref,
            "bytes" => Self::Bytes,
            other => return Err(tessera_err!(Schema: "unknown field kind \"{}\"", other)),
        })
    }
}

/// A primitive Rust type that a numeric field is physically stored as.
pub trait NativeValue:
    Send + Sync + Clone + Copy + Debug + Display + PartialEq + PartialOrd + Default + 'static
{
    /// The field kind this native type stores.
    const KIND: FieldKind;
}

macro_rules! native_value {
    ($T:ty, $kind:tt) => {
        impl NativeValue for $T {
            const KIND: FieldKind = FieldKind::$kind;
        }
    };
}

native_value!(u8, U8);
native_value!(u16, U16);
native_value!(u32, U32);
native_value!(i32, I32);
native_value!(f32, F32);
native_value!(f64, F64);

/// Expand the body once for the native type that stores the given numeric kind.
///
/// Normalized kinds expand with their quantized storage type.
#[macro_export]
macro_rules! match_each_native_kind {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::FieldKind;
        match $self {
            FieldKind::U8 | FieldKind::U8n => __with__! { u8 },
            FieldKind::U16 | FieldKind::U16n => __with__! { u16 },
            FieldKind::U32 => __with__! { u32 },
            FieldKind::I32 => __with__! { i32 },
            FieldKind::F32 => __with__! { f32 },
            FieldKind::F64 => __with__! { f64 },
            other => $crate::__private::non_numeric(other),
        }
    })
}

#[doc(hidden)]
pub mod __private {
    use tessera_error::tessera_panic;

    use crate::FieldKind;

    #[cold]
    pub fn non_numeric(kind: FieldKind) -> ! {
        tessera_panic!("field kind {} is not numeric", kind)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FieldKind::U8, Some(1))]
    #[case(FieldKind::U16n, Some(2))]
    #[case(FieldKind::I32, Some(4))]
    #[case(FieldKind::Ref, Some(8))]
    #[case(FieldKind::Str, None)]
    #[case(FieldKind::Unknown, None)]
    fn byte_widths(#[case] kind: FieldKind, #[case] width: Option<usize>) {
        assert_eq!(kind.byte_width(), width);
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(u8::from(FieldKind::U8), 1);
        assert_eq!(u8::from(FieldKind::Bytes), 12);
        assert_eq!(FieldKind::try_from(11u8).unwrap(), FieldKind::Ref);
        assert!(FieldKind::try_from(13u8).is_err());
    }

    #[test]
    fn names_round_trip() {
        for kind in [FieldKind::U8, FieldKind::U16n, FieldKind::WStr, FieldKind::Bytes] {
            assert_eq!(FieldKind::try_from(kind.to_string().as_str()).unwrap(), kind);
        }
        assert!(FieldKind::try_from("list").unwrap_err().is_schema());
    }

    #[test]
    fn unknown_is_not_declarable() {
        assert!(FieldKind::Unknown.check_declarable("x").unwrap_err().is_schema());
        assert!(FieldKind::F64.check_declarable("x").is_ok());
    }

    #[test]
    fn storage_width_matches_native() {
        let width = match_each_native_kind!(FieldKind::U16n, |$T| size_of::<$T>());
        assert_eq!(width, 2);
    }
}

use core::fmt::Display;

use num_traits::NumCast;
use paste::paste;
use tessera_error::{TesseraError, TesseraResult, tessera_err};

use crate::{FieldKind, NormRange};

/// A single numeric cell value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum PValue {
    U8(u8),
    U16(u16),
    U32(u32),
    I32(i32),
    F32(f32),
    F64(f64),
}

macro_rules! as_primitive {
    ($T:ty) => {
        paste! {
            #[doc = "Access PValue as `" $T "`, returning `None` if conversion is unsuccessful"]
            pub fn [<as_ $T>](self) -> Option<$T> {
                match self {
                    PValue::U8(v) => <$T as NumCast>::from(v),
                    PValue::U16(v) => <$T as NumCast>::from(v),
                    PValue::U32(v) => <$T as NumCast>::from(v),
                    PValue::I32(v) => <$T as NumCast>::from(v),
                    PValue::F32(v) => <$T as NumCast>::from(v),
                    PValue::F64(v) => <$T as NumCast>::from(v),
                }
            }
        }
    };
}

impl PValue {
    /// The zero value stored by a freshly appended row for the given numeric kind.
    pub fn zero(kind: FieldKind) -> TesseraResult<Self> {
        Ok(match kind {
            FieldKind::U8 | FieldKind::U8n => Self::U8(0),
            FieldKind::U16 | FieldKind::U16n => Self::U16(0),
            FieldKind::U32 => Self::U32(0),
            FieldKind::I32 => Self::I32(0),
            FieldKind::F32 => Self::F32(0.0),
            FieldKind::F64 => Self::F64(0.0),
            other => return Err(tessera_err!(Schema: "field kind {} has no numeric zero", other)),
        })
    }

    /// The storage kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::U8(_) => FieldKind::U8,
            Self::U16(_) => FieldKind::U16,
            Self::U32(_) => FieldKind::U32,
            Self::I32(_) => FieldKind::I32,
            Self::F32(_) => FieldKind::F32,
            Self::F64(_) => FieldKind::F64,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32(_) | Self::F64(_))
    }

    as_primitive!(u8);
    as_primitive!(u16);
    as_primitive!(u32);
    as_primitive!(i32);
    as_primitive!(f32);
    as_primitive!(f64);

    /// Convert this value into the storage representation of a numeric field.
    ///
    /// Plain numeric kinds require the value to be representable in the target type; floats
    /// written to integer fields are truncated toward zero. Normalized kinds quantize the value
    /// over `range`.
    pub fn cast_to(self, kind: FieldKind, range: NormRange) -> TesseraResult<PValue> {
        let out_of_range = || {
            tessera_err!(
                MismatchedTypes: kind,
                format!("{} (value out of range)", self)
            )
        };
        Ok(match kind {
            FieldKind::U8 => PValue::U8(self.as_u8().ok_or_else(out_of_range)?),
            FieldKind::U16 => PValue::U16(self.as_u16().ok_or_else(out_of_range)?),
            FieldKind::U32 => PValue::U32(self.as_u32().ok_or_else(out_of_range)?),
            FieldKind::I32 => PValue::I32(self.as_i32().ok_or_else(out_of_range)?),
            FieldKind::F32 => PValue::F32(self.as_f32().ok_or_else(out_of_range)?),
            FieldKind::F64 => PValue::F64(self.as_f64().ok_or_else(out_of_range)?),
            FieldKind::U8n => PValue::U8(range.quantize_u8(self.as_f64().ok_or_else(out_of_range)?)),
            FieldKind::U16n => {
                PValue::U16(range.quantize_u16(self.as_f64().ok_or_else(out_of_range)?))
            }
            other => {
                return Err(tessera_err!(MismatchedTypes: other, self.kind()));
            }
        })
    }

    /// Interpret a stored value as the logical value of a field of the given kind.
    ///
    /// This is the identity for plain numeric kinds and de-quantization for normalized ones.
    pub fn decode(self, kind: FieldKind, range: NormRange) -> PValue {
        match (kind, self) {
            (FieldKind::U8n, PValue::U8(v)) => PValue::F64(range.dequantize_u8(v)),
            (FieldKind::U16n, PValue::U16(v)) => PValue::F64(range.dequantize_u16(v)),
            _ => self,
        }
    }
}

impl Display for PValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}u8"),
            Self::U16(v) => write!(f, "{v}u16"),
            Self::U32(v) => write!(f, "{v}u32"),
            Self::I32(v) => write!(f, "{v}i32"),
            Self::F32(v) => write!(f, "{v}f32"),
            Self::F64(v) => write!(f, "{v}f64"),
        }
    }
}

macro_rules! impl_pvalue {
    ($T:ty, $PT:ident) => {
        impl From<$T> for PValue {
            fn from(value: $T) -> Self {
                PValue::$PT(value)
            }
        }

        impl TryFrom<PValue> for $T {
            type Error = TesseraError;

            fn try_from(value: PValue) -> Result<Self, Self::Error> {
                paste! {
                    value.[<as_ $T>]().ok_or_else(|| {
                        tessera_err!(MismatchedTypes: stringify!($T), value)
                    })
                }
            }
        }
    };
}

impl_pvalue!(u8, U8);
impl_pvalue!(u16, U16);
impl_pvalue!(u32, U32);
impl_pvalue!(i32, I32);
impl_pvalue!(f32, F32);
impl_pvalue!(f64, F64);

impl From<bool> for PValue {
    fn from(value: bool) -> Self {
        PValue::U8(<u8 as From<bool>>::from(value))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(PValue::F64(3.0), FieldKind::U32, PValue::U32(3))]
    #[case(PValue::I32(7), FieldKind::F64, PValue::F64(7.0))]
    #[case(PValue::U8(255), FieldKind::U16, PValue::U16(255))]
    #[case(PValue::F64(2.9), FieldKind::I32, PValue::I32(2))]
    fn casts(#[case] value: PValue, #[case] kind: FieldKind, #[case] expected: PValue) {
        assert_eq!(value.cast_to(kind, NormRange::default()).unwrap(), expected);
    }

    #[test]
    fn cast_out_of_range() {
        let err = PValue::I32(-1)
            .cast_to(FieldKind::U8, NormRange::default())
            .unwrap_err();
        assert!(err.is_mismatched_types());
    }

    #[test]
    fn cast_to_text_fails() {
        assert!(
            PValue::U8(1)
                .cast_to(FieldKind::Str, NormRange::default())
                .unwrap_err()
                .is_mismatched_types()
        );
    }

    #[test]
    fn normalized_round_trip() {
        let range = NormRange::new(-1.0, 1.0);
        let stored = PValue::F64(1.0).cast_to(FieldKind::U16n, range).unwrap();
        assert_eq!(stored, PValue::U16(u16::MAX));
        assert_eq!(stored.decode(FieldKind::U16n, range), PValue::F64(1.0));
    }

    #[test]
    fn bool_is_stored_as_u8() {
        assert_eq!(PValue::from(true), PValue::U8(1));
        assert_eq!(PValue::from(false), PValue::U8(0));
    }

    #[test]
    fn try_from_pvalue() {
        assert_eq!(u16::try_from(PValue::U8(9)).unwrap(), 9);
        assert!(u8::try_from(PValue::I32(-3)).is_err());
    }
}

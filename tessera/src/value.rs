use tessera_dtype::{FieldDefinition, FieldKind, PValue};
use tessera_error::{TesseraError, TesseraResult, tessera_bail, tessera_err};

use crate::Record;

/// The value of one field of a [`Record`].
///
/// Normalized fields are read as [`Value::F64`]. Reference fields hold the referenced record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    I32(i32),
    F32(f32),
    F64(f64),
    Str(String),
    WStr(String),
    Bytes(Vec<u8>),
    Record(Box<Record>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::I32(_) => "i32",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::WStr(_) => "wstr",
            Value::Bytes(_) => "bytes",
            Value::Record(_) => "record",
        }
    }

    pub fn as_pvalue(&self) -> Option<PValue> {
        Some(match self {
            Value::U8(v) => PValue::U8(*v),
            Value::U16(v) => PValue::U16(*v),
            Value::U32(v) => PValue::U32(*v),
            Value::I32(v) => PValue::I32(*v),
            Value::F32(v) => PValue::F32(*v),
            Value::F64(v) => PValue::F64(*v),
            _ => return None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::WStr(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Convert a numeric value into the stored representation of `field`.
    pub(crate) fn to_stored(&self, field: &FieldDefinition) -> TesseraResult<PValue> {
        let value = self
            .as_pvalue()
            .ok_or_else(|| tessera_err!(MismatchedTypes: field.kind(), self.kind_name()))?;
        value.cast_to(field.kind(), field.range())
    }

    /// Convert this value into what a field of the given kind reads back after storing it.
    ///
    /// Reference fields are checked by [`Record`] itself and rejected here.
    pub(crate) fn conform(self, field: &FieldDefinition) -> TesseraResult<Value> {
        let kind = field.kind();
        Ok(match (kind, self) {
            (kind, value) if kind.is_numeric() => {
                Value::from(value.to_stored(field)?.decode(kind, field.range()))
            }
            (FieldKind::Str, Value::Str(s) | Value::WStr(s)) => Value::Str(s),
            (FieldKind::WStr, Value::Str(s) | Value::WStr(s)) => Value::WStr(s),
            (FieldKind::Bytes, Value::Bytes(b)) => Value::Bytes(b),
            (FieldKind::Unknown, _) => {
                tessera_bail!(Schema: "field \"{}\" has no storable kind", field.name())
            }
            (kind, value) => tessera_bail!(MismatchedTypes: kind, value.kind_name()),
        })
    }

    /// The value of a field that was never written.
    pub(crate) fn default_for(field: &FieldDefinition) -> TesseraResult<Value> {
        let kind = field.kind();
        Ok(match kind {
            kind if kind.is_numeric() => Value::from(PValue::zero(kind)?.decode(kind, field.range())),
            FieldKind::Str => Value::Str(String::new()),
            FieldKind::WStr => Value::WStr(String::new()),
            FieldKind::Bytes => Value::Bytes(Vec::new()),
            FieldKind::Ref => {
                let target = field.target().ok_or_else(|| {
                    tessera_err!(Schema: "reference field \"{}\" has no target", field.name())
                })?;
                Value::Record(Box::new(Record::detached(target.descriptor())))
            }
            _ => tessera_bail!(Schema: "field \"{}\" has no storable kind", field.name()),
        })
    }
}

impl From<PValue> for Value {
    fn from(value: PValue) -> Self {
        match value {
            PValue::U8(v) => Value::U8(v),
            PValue::U16(v) => Value::U16(v),
            PValue::U32(v) => Value::U32(v),
            PValue::I32(v) => Value::I32(v),
            PValue::F32(v) => Value::F32(v),
            PValue::F64(v) => Value::F64(v),
        }
    }
}

macro_rules! numeric_value {
    ($T:ty, $V:ident) => {
        impl From<$T> for Value {
            fn from(value: $T) -> Self {
                Value::$V(value)
            }
        }

        impl TryFrom<Value> for $T {
            type Error = TesseraError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value.as_pvalue() {
                    Some(pvalue) => <$T>::try_from(pvalue),
                    None => Err(tessera_err!(MismatchedTypes: stringify!($T), value.kind_name())),
                }
            }
        }
    };
}

numeric_value!(u8, U8);
numeric_value!(u16, U16);
numeric_value!(u32, U32);
numeric_value!(i32, I32);
numeric_value!(f32, F32);
numeric_value!(f64, F64);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::U8(u8::from(value))
    }
}

impl TryFrom<Value> for bool {
    type Error = TesseraError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(u8::try_from(value)? != 0)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(Box::new(value))
    }
}

impl TryFrom<Value> for String {
    type Error = TesseraError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) | Value::WStr(s) => Ok(s),
            other => Err(tessera_err!(MismatchedTypes: "str", other.kind_name())),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = TesseraError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(tessera_err!(MismatchedTypes: "bytes", other.kind_name())),
        }
    }
}

impl TryFrom<Value> for Record {
    type Error = TesseraError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Record(r) => Ok(*r),
            other => Err(tessera_err!(MismatchedTypes: "record", other.kind_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tessera_dtype::kinds::*;
    use tessera_dtype::{FieldDecl, Schema, describe};

    use super::*;

    struct Sample;

    impl Schema for Sample {
        const NAME: &'static str = "Sample";

        fn fields() -> Vec<FieldDecl> {
            vec![
                FieldDecl::new::<U8>("small"),
                FieldDecl::new::<U8n>("level").with_range(0.0, 10.0),
                FieldDecl::new::<WStr>("label"),
                FieldDecl::new::<Bytes>("blob"),
            ]
        }
    }

    fn field(name: &str) -> FieldDefinition {
        describe::<Sample>().field(name).unwrap().clone()
    }

    #[rstest]
    #[case(Value::F64(3.7), Value::U8(3))]
    #[case(Value::I32(200), Value::U8(200))]
    #[case(Value::from(true), Value::U8(1))]
    fn numeric_conform(#[case] value: Value, #[case] expected: Value) {
        assert_eq!(value.conform(&field("small")).unwrap(), expected);
    }

    #[test]
    fn normalized_reads_back_quantized() {
        let Value::F64(level) = Value::F64(5.0).conform(&field("level")).unwrap() else {
            panic!("normalized fields read as f64");
        };
        assert!((level - 5.0).abs() <= 10.0 / 255.0);
        assert_eq!(
            Value::F64(42.0).conform(&field("level")).unwrap(),
            Value::F64(10.0)
        );
    }

    #[test]
    fn text_kinds_interchange() {
        assert_eq!(
            Value::from("tile").conform(&field("label")).unwrap(),
            Value::WStr("tile".to_string())
        );
        assert!(
            Value::from("tile")
                .conform(&field("blob"))
                .unwrap_err()
                .is_mismatched_types()
        );
        assert!(
            Value::from(vec![1, 2])
                .conform(&field("small"))
                .unwrap_err()
                .is_mismatched_types()
        );
    }

    #[test]
    fn defaults() {
        assert_eq!(Value::default_for(&field("level")).unwrap(), Value::F64(0.0));
        assert_eq!(Value::default_for(&field("blob")).unwrap(), Value::Bytes(vec![]));
    }

    #[test]
    fn typed_extraction() {
        assert_eq!(f64::try_from(Value::U16(7)).unwrap(), 7.0);
        assert!(u8::try_from(Value::I32(-1)).unwrap_err().is_mismatched_types());
        assert!(String::try_from(Value::U8(1)).unwrap_err().is_mismatched_types());
        assert!(bool::try_from(Value::U8(2)).unwrap());
    }
}

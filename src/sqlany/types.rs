//! Value encoding for bind parameters and decoding of fetched columns.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::native::{BindValue, ColumnData, DataType, NativeType};
use super::time;
use crate::error::{Error, Result};

/// A value passed to, or read from, the database.
///
/// Only `Null`, `Bool`, `Int`, `Float`, `Text`, `Bytes`, `Timestamp` and
/// `Time` can be bound; the remaining kinds come out of column decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    Time(NaiveTime),

    Date(NaiveDate),
    Float32(f32),
    /// Exact numeric, kept as the text the server sent
    Decimal(String),
    Int16(i16),
    Int32(i32),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int64",
            Value::Float(_) => "float64",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Time(_) => "time",
            Value::Date(_) => "date",
            Value::Float32(_) => "float32",
            Value::Decimal(_) => "decimal",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::UInt8(_) => "uint8",
            Value::UInt16(_) => "uint16",
            Value::UInt32(_) => "uint32",
            Value::UInt64(_) => "uint64",
        }
    }

    /// Widen any integer kind to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Int16(i) => Some(i64::from(*i)),
            Value::Int32(i) => Some(i64::from(*i)),
            Value::UInt8(i) => Some(i64::from(*i)),
            Value::UInt16(i) => Some(i64::from(*i)),
            Value::UInt32(i) => Some(i64::from(*i)),
            Value::UInt64(i) => i64::try_from(*i).ok(),
            Value::Decimal(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Float32(f) => Some(f64::from(*f)),
            _ => self.as_i64().map(|i| i as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Encode a value into the native bind representation.
///
/// `ordinal` is only used to report unsupported kinds.
pub fn encode(ordinal: usize, value: &Value) -> Result<BindValue> {
    let (data_type, buffer) = match value {
        Value::Null => return Ok(BindValue::null()),
        Value::Bool(v) => (DataType::Val8, Bytes::from_static(if *v { &[1u8] } else { &[0u8] })),
        Value::Int(v) => {
            let mut buf = BytesMut::with_capacity(8);
            buf.put_i64_le(*v);
            (DataType::Val64, buf.freeze())
        }
        Value::Float(v) => {
            let mut buf = BytesMut::with_capacity(8);
            buf.put_f64_le(*v);
            (DataType::Double, buf.freeze())
        }
        Value::Text(v) => (DataType::String, Bytes::copy_from_slice(v.as_bytes())),
        Value::Bytes(v) => (DataType::Binary, Bytes::copy_from_slice(v)),
        Value::Timestamp(v) => (DataType::String, Bytes::from(time::timestamp_to_string(v))),
        Value::Time(v) => (
            DataType::String,
            Bytes::from(time::timestamp_to_string(&time::time_of_day(*v))),
        ),
        other => {
            return Err(Error::UnsupportedType {
                ordinal,
                kind: other.kind(),
            })
        }
    };

    Ok(BindValue {
        data_type,
        buffer,
        is_null: false,
    })
}

fn fixed<const N: usize>(native_type: NativeType, buf: &[u8]) -> Result<[u8; N]> {
    buf.get(..N)
        .and_then(|b| <[u8; N]>::try_from(b).ok())
        .ok_or_else(|| {
            Error::InvalidValue(format!(
                "column of type {} holds {} bytes, expected {}",
                native_type.0,
                buf.len(),
                N
            ))
        })
}

fn text(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).into_owned()
}

/// Decode fetched column data by its declared native type.
pub fn decode(native_type: NativeType, data: &ColumnData<'_>) -> Result<Value> {
    if data.is_null {
        return Ok(Value::Null);
    }
    let buf = data.buffer;

    let value = match native_type {
        NativeType::DOUBLE => Value::Float(f64::from_le_bytes(fixed(native_type, buf)?)),
        // Single precision values arrive widened to double.
        NativeType::FLOAT => Value::Float32(f64::from_le_bytes(fixed(native_type, buf)?) as f32),
        NativeType::DECIMAL => Value::Decimal(text(buf)),
        NativeType::SMALLINT => Value::Int16(i16::from_le_bytes(fixed(native_type, buf)?)),
        NativeType::INT => Value::Int32(i32::from_le_bytes(fixed(native_type, buf)?)),
        NativeType::BIGINT => Value::Int(i64::from_le_bytes(fixed(native_type, buf)?)),
        NativeType::TINYINT => Value::UInt8(u8::from_le_bytes(fixed(native_type, buf)?)),
        NativeType::UNSSMALLINT => Value::UInt16(u16::from_le_bytes(fixed(native_type, buf)?)),
        NativeType::UNSINT => Value::UInt32(u32::from_le_bytes(fixed(native_type, buf)?)),
        NativeType::UNSBIGINT => Value::UInt64(u64::from_le_bytes(fixed(native_type, buf)?)),
        NativeType::BIT => Value::Bool(fixed::<1>(native_type, buf)?[0] != 0),
        t if t.is_character() => Value::Text(text(buf)),
        NativeType::BINARY | NativeType::LONGBINARY => Value::Bytes(buf.to_vec()),
        NativeType::DATE => Value::Date(time::parse_date(&text(buf))?),
        NativeType::TIME => Value::Time(time::parse_time(&text(buf))?),
        NativeType::TIMESTAMP => Value::Timestamp(time::parse_timestamp(&text(buf))?),
        NativeType::NOTYPE => Value::Null,
        other => {
            return Err(Error::Decode {
                type_code: other.0,
                raw: buf.to_vec(),
            })
        }
    };

    Ok(value)
}

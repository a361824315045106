use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::Dialect;
use crate::codec;
use crate::core::{DbError, Result, Value};
use crate::model::HostType;

/// Characters whose presence in the first position marks a textual
/// boolean as true.
const TRUE_CHARS: &str = "JjYy1";

fn err(value: &Value, host: HostType) -> DbError {
    DbError::conversion(value.type_name(), host.to_string())
}

fn int_of(value: &Value, host: HostType) -> Result<i64> {
    value.as_i64().ok_or_else(|| err(value, host))
}

fn narrow<T: TryFrom<i64>>(wide: i64, host: HostType) -> Result<T> {
    T::try_from(wide).map_err(|_| DbError::conversion(format!("INT64({})", wide), host.to_string()))
}

/// Marshal a host value into its driver representation. Pure.
pub fn to_db(dialect: Dialect, value: &Value, host: HostType, compress: bool) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match host {
        HostType::Guid => {
            let guid = value.as_guid().ok_or_else(|| err(value, host))?;
            if guid.is_nil() {
                return Ok(Value::Null);
            }
            if dialect.is_firebird() {
                // Stored as CHAR(16) OCTETS.
                Ok(Value::Bytes(codec::guid_bytes(guid).to_vec()))
            } else {
                Ok(Value::Guid(guid))
            }
        }
        HostType::TypeName => match value {
            Value::Text(_) => Ok(value.clone()),
            _ => Err(err(value, host)),
        },
        HostType::Image => {
            let bytes = value.as_bytes().ok_or_else(|| err(value, host))?;
            codec::ensure_png(bytes)?;
            Ok(value.clone())
        }
        HostType::Object => {
            let json = value.as_json().ok_or_else(|| err(value, host))?;
            let mut bytes = codec::json_value_to_bytes(json)?;
            if compress {
                bytes = codec::gzip(&bytes)?;
            }
            Ok(Value::Bytes(bytes))
        }
        HostType::Bytes => match value {
            Value::Bytes(_) => Ok(value.clone()),
            _ => Err(err(value, host)),
        },
        HostType::Enum => {
            let wide = int_of(value, host)?;
            Ok(Value::Int32(narrow(wide, host)?))
        }
        HostType::Int8 => Ok(Value::Int8(narrow(int_of(value, host)?, host)?)),
        HostType::Int16 => Ok(Value::Int16(narrow(int_of(value, host)?, host)?)),
        HostType::Int32 => Ok(Value::Int32(narrow(int_of(value, host)?, host)?)),
        HostType::Int64 => Ok(Value::Int64(int_of(value, host)?)),
        HostType::Float32 => match value {
            Value::Float32(_) => Ok(value.clone()),
            Value::Float64(f) => Ok(Value::Float32(*f as f32)),
            _ => Err(err(value, host)),
        },
        HostType::Float64 => value.as_f64().map(Value::Float64).ok_or_else(|| err(value, host)),
        HostType::Decimal => match value {
            Value::Decimal(_) => Ok(value.clone()),
            _ => Err(err(value, host)),
        },
        HostType::Bool => value.as_bool().map(Value::Bool).ok_or_else(|| err(value, host)),
        HostType::Text => match value {
            Value::Text(_) => Ok(value.clone()),
            _ => Err(err(value, host)),
        },
        HostType::DateTime => value
            .as_datetime()
            .map(Value::DateTime)
            .ok_or_else(|| err(value, host)),
    }
}

/// Marshal an argument with no declared field; the host type is inferred
/// from the value variant.
pub fn to_db_auto(dialect: Dialect, value: &Value) -> Result<Value> {
    let host = match value {
        Value::Null => return Ok(Value::Null),
        Value::Guid(_) => HostType::Guid,
        Value::Json(_) => HostType::Object,
        Value::Int8(_) => HostType::Int8,
        Value::Int16(_) => HostType::Int16,
        Value::Int32(_) => HostType::Int32,
        Value::Int64(_) => HostType::Int64,
        Value::Float32(_) => HostType::Float32,
        Value::Float64(_) => HostType::Float64,
        Value::Decimal(_) => HostType::Decimal,
        Value::Bool(_) => HostType::Bool,
        Value::Text(_) => HostType::Text,
        Value::Bytes(_) => HostType::Bytes,
        Value::DateTime(_) => HostType::DateTime,
    };
    to_db(dialect, value, host, false)
}

fn default_for(host: HostType) -> Value {
    match host {
        HostType::Guid => Value::Guid(Uuid::nil()),
        HostType::DateTime => Value::DateTime(DateTime::<Utc>::MIN_UTC),
        HostType::Text | HostType::TypeName => Value::Text(String::new()),
        HostType::Bytes | HostType::Image => Value::Bytes(Vec::new()),
        HostType::Object => Value::Json(serde_json::Value::Null),
        HostType::Bool => Value::Bool(false),
        HostType::Int8 => Value::Int8(0),
        HostType::Int16 => Value::Int16(0),
        HostType::Int32 | HostType::Enum => Value::Int32(0),
        HostType::Int64 => Value::Int64(0),
        HostType::Float32 => Value::Float32(0.0),
        HostType::Float64 => Value::Float64(0.0),
        HostType::Decimal => Value::Decimal(Decimal::ZERO),
    }
}

fn parse_datetime(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| DbError::conversion(text.to_string(), "DATETIME"))
}

/// Marshal a driver value back into the declared host representation.
/// Database NULL coerces to the host type's default.
pub fn from_db(value: Value, host: HostType) -> Result<Value> {
    if value.is_null() {
        return Ok(default_for(host));
    }

    match host {
        HostType::Guid => match &value {
            Value::Guid(_) => Ok(value),
            Value::Bytes(bytes) => Ok(Value::Guid(codec::guid_from_bytes(bytes)?)),
            Value::Text(text) => Uuid::parse_str(text)
                .map(Value::Guid)
                .map_err(|_| err(&value, host)),
            _ => Err(err(&value, host)),
        },
        HostType::Image => {
            let bytes = value.into_bytes().ok_or_else(|| DbError::conversion("driver value", "IMAGE"))?;
            codec::ensure_png(&bytes)?;
            Ok(Value::Bytes(bytes))
        }
        HostType::Object => match value {
            Value::Json(_) => Ok(value),
            Value::Bytes(bytes) => {
                let plain = if codec::is_gzip(&bytes) {
                    codec::gunzip(&bytes)?
                } else {
                    bytes
                };
                Ok(Value::Json(codec::json_value_from_bytes(&plain)?))
            }
            Value::Text(text) => Ok(Value::Json(codec::json_value_from_bytes(text.as_bytes())?)),
            other => Err(err(&other, host)),
        },
        HostType::Bytes => match value {
            Value::Bytes(_) => Ok(value),
            other => Err(err(&other, host)),
        },
        HostType::Bool => match &value {
            Value::Bool(_) => Ok(value),
            Value::Text(text) => Ok(Value::Bool(
                text.chars().next().map_or(false, |c| TRUE_CHARS.contains(c)),
            )),
            _ => int_of(&value, host).map(|i| Value::Bool(i != 0)),
        },
        HostType::Int8 => Ok(Value::Int8(narrow(int_of(&value, host)?, host)?)),
        HostType::Int16 => Ok(Value::Int16(narrow(int_of(&value, host)?, host)?)),
        HostType::Int32 => Ok(Value::Int32(narrow(int_of(&value, host)?, host)?)),
        HostType::Int64 => Ok(Value::Int64(int_of(&value, host)?)),
        HostType::Enum => Ok(Value::Int32(narrow(int_of(&value, host)?, host)?)),
        HostType::Float32 => match &value {
            Value::Float32(_) => Ok(value),
            Value::Float64(f) => Ok(Value::Float32(*f as f32)),
            _ => int_of(&value, host).map(|i| Value::Float32(i as f32)),
        },
        HostType::Float64 => value
            .as_f64()
            .map(Value::Float64)
            .ok_or_else(|| err(&value, host)),
        HostType::Decimal => match &value {
            Value::Decimal(_) => Ok(value),
            Value::Text(text) => text
                .parse::<Decimal>()
                .map(Value::Decimal)
                .map_err(|_| err(&value, host)),
            Value::Float64(f) => Decimal::from_f64_retain(*f)
                .map(Value::Decimal)
                .ok_or_else(|| err(&value, host)),
            _ => int_of(&value, host).map(|i| Value::Decimal(Decimal::from(i))),
        },
        HostType::Text | HostType::TypeName => match value {
            Value::Text(_) => Ok(value),
            other => Err(err(&other, host)),
        },
        HostType::DateTime => match &value {
            Value::DateTime(_) => Ok(value),
            Value::Text(text) => parse_datetime(text).map(Value::DateTime),
            _ => Err(err(&value, host)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_guid_becomes_null() {
        let out = to_db(Dialect::PostgreSql, &Value::Guid(Uuid::nil()), HostType::Guid, false).unwrap();
        assert!(out.is_null());
    }

    #[test]
    fn test_firebird_guid_travels_as_octets() {
        let guid = Uuid::new_v4();
        let out = to_db(Dialect::FirebirdServer, &Value::Guid(guid), HostType::Guid, false).unwrap();
        let bytes = out.as_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(from_db(Value::Bytes(bytes.to_vec()), HostType::Guid).unwrap(), Value::Guid(guid));
    }

    #[test]
    fn test_object_round_trip_with_compression() {
        let json = serde_json::json!({"kind": "portrait", "tags": ["a", "b"]});
        let out = to_db(Dialect::MsSql, &Value::Json(json.clone()), HostType::Object, true).unwrap();
        let bytes = out.as_bytes().unwrap();
        assert!(codec::is_gzip(bytes));
        let back = from_db(Value::Bytes(bytes.to_vec()), HostType::Object).unwrap();
        assert_eq!(back, Value::Json(json));
    }

    #[test]
    fn test_null_coerces_to_defaults() {
        assert_eq!(from_db(Value::Null, HostType::Guid).unwrap(), Value::Guid(Uuid::nil()));
        assert_eq!(from_db(Value::Null, HostType::Text).unwrap(), Value::Text(String::new()));
        assert_eq!(from_db(Value::Null, HostType::Int32).unwrap(), Value::Int32(0));
        assert_eq!(from_db(Value::Null, HostType::Bool).unwrap(), Value::Bool(false));
        assert_eq!(
            from_db(Value::Null, HostType::DateTime).unwrap(),
            Value::DateTime(DateTime::<Utc>::MIN_UTC)
        );
    }

    #[test]
    fn test_text_boolean_membership() {
        for text in ["Ja", "ja", "Yes", "y", "1"] {
            let out = from_db(Value::Text(text.into()), HostType::Bool).unwrap();
            assert_eq!(out, Value::Bool(true), "{}", text);
        }
        for text in ["Nein", "no", "0", ""] {
            let out = from_db(Value::Text(text.into()), HostType::Bool).unwrap();
            assert_eq!(out, Value::Bool(false), "{}", text);
        }
    }

    #[test]
    fn test_integer_overflow_checked() {
        let wide = Value::Int64(i64::from(i32::MAX) + 1);
        assert!(from_db(wide, HostType::Int32).is_err());
        assert_eq!(
            from_db(Value::Int64(7), HostType::Int16).unwrap(),
            Value::Int16(7)
        );
    }

    #[test]
    fn test_enum_is_int32() {
        let out = to_db(Dialect::PostgreSql, &Value::Int64(3), HostType::Enum, false).unwrap();
        assert_eq!(out, Value::Int32(3));
    }

    #[test]
    fn test_image_requires_png_frame() {
        let out = to_db(Dialect::PostgreSql, &Value::Bytes(vec![1, 2, 3]), HostType::Image, false);
        assert!(out.is_err());
    }

    #[test]
    fn test_datetime_text_parse() {
        let out = from_db(Value::Text("2026-08-02 10:30:00".into()), HostType::DateTime).unwrap();
        assert!(matches!(out, Value::DateTime(_)));
    }
}

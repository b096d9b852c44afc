use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::{
    error::{EngineError, EngineResult},
    idl::IdlType,
};

/// Scalar type tags supported in schema argument declarations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    U8,
    U16,
    U32,
    U64,
    U128,
    U256,
    I8,
    I16,
    I32,
    I64,
    I128,
    I256,
    Bool,
    F32,
    F64,
    Str,
}

impl ScalarKind {
    fn from_tag(tag: &str) -> EngineResult<Self> {
        Ok(match tag {
            "u8" => ScalarKind::U8,
            "u16" => ScalarKind::U16,
            "u32" => ScalarKind::U32,
            "u64" => ScalarKind::U64,
            "u128" => ScalarKind::U128,
            "u256" => ScalarKind::U256,
            "i8" => ScalarKind::I8,
            "i16" => ScalarKind::I16,
            "i32" => ScalarKind::I32,
            "i64" => ScalarKind::I64,
            "i128" => ScalarKind::I128,
            "i256" => ScalarKind::I256,
            "bool" => ScalarKind::Bool,
            "f32" => ScalarKind::F32,
            "f64" => ScalarKind::F64,
            "string" => ScalarKind::Str,
            other => return Err(EngineError::UnsupportedType(other.to_string())),
        })
    }

    /// Width in bits for integer kinds.
    pub fn bit_width(&self) -> Option<u16> {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => Some(8),
            ScalarKind::U16 | ScalarKind::I16 => Some(16),
            ScalarKind::U32 | ScalarKind::I32 => Some(32),
            ScalarKind::U64 | ScalarKind::I64 => Some(64),
            ScalarKind::U128 | ScalarKind::I128 => Some(128),
            ScalarKind::U256 | ScalarKind::I256 => Some(256),
            _ => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            ScalarKind::I8
                | ScalarKind::I16
                | ScalarKind::I32
                | ScalarKind::I64
                | ScalarKind::I128
                | ScalarKind::I256
        )
    }

    /// Human label used in coercion error messages.
    pub fn label(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "boolean",
            ScalarKind::F32 | ScalarKind::F64 => "floating point number",
            ScalarKind::Str => "string",
            _ => "integer",
        }
    }
}

/// Classified argument shape: scalar, fixed array, variable vector, or a
/// raw byte blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgKind {
    Scalar(ScalarKind),
    FixedArray(ScalarKind, usize),
    Vector(ScalarKind),
    Bytes,
}

/// Maps a declared schema type onto its classified kind.
pub fn classify(ty: &IdlType) -> EngineResult<ArgKind> {
    match ty {
        IdlType::Scalar(tag) if tag == "bytes" => Ok(ArgKind::Bytes),
        IdlType::Scalar(tag) => Ok(ArgKind::Scalar(ScalarKind::from_tag(tag)?)),
        IdlType::Array { array: (tag, len) } => {
            Ok(ArgKind::FixedArray(ScalarKind::from_tag(tag)?, *len))
        }
        IdlType::Vec { vec: tag } if tag == "u8" => Ok(ArgKind::Bytes),
        IdlType::Vec { vec: tag } => Ok(ArgKind::Vector(ScalarKind::from_tag(tag)?)),
    }
}

/// A coerced argument value, ready for encoding. Integers keep their exact
/// magnitude so 128- and 256-bit values round-trip without loss.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(BigInt),
    Bool(bool),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

/// Coerces one raw textual value into the declared kind.
///
/// Array and vector inputs are whitespace-separated element lists. An empty
/// vector input is rejected: a trace author writing an empty cell almost
/// certainly dropped a value by mistake.
pub fn coerce(name: &str, kind: &ArgKind, raw: &str) -> EngineResult<Value> {
    match kind {
        ArgKind::Scalar(scalar) => coerce_scalar(name, *scalar, raw.trim()),
        ArgKind::Bytes => {
            let trimmed = raw.trim();
            let stripped = trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
                .unwrap_or(trimmed);
            let bytes = hex::decode(stripped).map_err(|e| EngineError::InvalidArgument {
                name: name.to_string(),
                reason: format!("'{}' is not valid hex encoded bytes: {}", trimmed, e),
            })?;
            Ok(Value::Bytes(bytes))
        }
        ArgKind::FixedArray(scalar, len) => {
            let elements = split_elements(raw);
            if elements.len() != *len {
                return Err(EngineError::InvalidArgument {
                    name: name.to_string(),
                    reason: format!(
                        "expected {} array elements, got {}",
                        len,
                        elements.len()
                    ),
                });
            }
            let values = elements
                .iter()
                .map(|e| coerce_scalar(name, *scalar, e))
                .collect::<EngineResult<Vec<_>>>()?;
            Ok(Value::List(values))
        }
        ArgKind::Vector(scalar) => {
            let elements = split_elements(raw);
            if elements.is_empty() {
                return Err(EngineError::InvalidArgument {
                    name: name.to_string(),
                    reason: "vector value is empty".to_string(),
                });
            }
            let values = elements
                .iter()
                .map(|e| coerce_scalar(name, *scalar, e))
                .collect::<EngineResult<Vec<_>>>()?;
            Ok(Value::List(values))
        }
    }
}

/// Coerces a JSON value, as found in JSON traces, into the declared kind.
pub fn coerce_json(name: &str, kind: &ArgKind, raw: &serde_json::Value) -> EngineResult<Value> {
    match raw {
        serde_json::Value::String(s) => coerce(name, kind, s),
        serde_json::Value::Number(n) => coerce(name, kind, &n.to_string()),
        serde_json::Value::Bool(b) => coerce(name, kind, if *b { "true" } else { "false" }),
        serde_json::Value::Array(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s.clone()),
                    serde_json::Value::Number(n) => Ok(n.to_string()),
                    serde_json::Value::Bool(b) => Ok(b.to_string()),
                    other => Err(EngineError::InvalidArgument {
                        name: name.to_string(),
                        reason: format!("unsupported element in array value: {}", other),
                    }),
                })
                .collect::<EngineResult<Vec<_>>>()?
                .join(" ");
            coerce(name, kind, &joined)
        }
        other => Err(EngineError::InvalidArgument {
            name: name.to_string(),
            reason: format!("unsupported value: {}", other),
        }),
    }
}

fn split_elements(raw: &str) -> Vec<&str> {
    raw.split_whitespace().collect()
}

fn coerce_scalar(name: &str, kind: ScalarKind, raw: &str) -> EngineResult<Value> {
    match kind {
        ScalarKind::Bool => match raw.to_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid(name, raw, kind)),
        },
        ScalarKind::F32 | ScalarKind::F64 => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid(name, raw, kind)),
        ScalarKind::Str => Ok(Value::Str(raw.to_string())),
        _ => raw
            .parse::<BigInt>()
            .map(Value::Int)
            .map_err(|_| invalid(name, raw, kind)),
    }
}

fn invalid(name: &str, raw: &str, kind: ScalarKind) -> EngineError {
    EngineError::InvalidArgument {
        name: name.to_string(),
        reason: format!("'{}' is not a valid {}", raw, kind.label()),
    }
}

/// Appends the Borsh encoding of `value` under the declared `kind`:
/// little-endian fixed-width integers, one-byte booleans, u32
/// length-prefixed strings, byte blobs and vectors, contiguous fixed
/// arrays.
pub fn encode(name: &str, kind: &ArgKind, value: &Value, out: &mut Vec<u8>) -> EngineResult<()> {
    match (kind, value) {
        (ArgKind::Scalar(scalar), _) => encode_scalar(name, *scalar, value, out),
        (ArgKind::Bytes, Value::Bytes(bytes)) => {
            encode_len(name, bytes.len(), out)?;
            out.extend_from_slice(bytes);
            Ok(())
        }
        (ArgKind::FixedArray(scalar, _), Value::List(items)) => {
            for item in items {
                encode_scalar(name, *scalar, item, out)?;
            }
            Ok(())
        }
        (ArgKind::Vector(scalar), Value::List(items)) => {
            encode_len(name, items.len(), out)?;
            for item in items {
                encode_scalar(name, *scalar, item, out)?;
            }
            Ok(())
        }
        _ => Err(EngineError::InvalidArgument {
            name: name.to_string(),
            reason: "value shape does not match the declared type".to_string(),
        }),
    }
}

fn encode_len(name: &str, len: usize, out: &mut Vec<u8>) -> EngineResult<()> {
    let len = u32::try_from(len).map_err(|_| EngineError::InvalidArgument {
        name: name.to_string(),
        reason: "value length exceeds u32::MAX".to_string(),
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn encode_scalar(
    name: &str,
    kind: ScalarKind,
    value: &Value,
    out: &mut Vec<u8>,
) -> EngineResult<()> {
    match (kind, value) {
        (ScalarKind::Bool, Value::Bool(b)) => {
            out.push(u8::from(*b));
            Ok(())
        }
        (ScalarKind::F32, Value::Float(f)) => {
            out.extend_from_slice(&(*f as f32).to_le_bytes());
            Ok(())
        }
        (ScalarKind::F64, Value::Float(f)) => {
            out.extend_from_slice(&f.to_le_bytes());
            Ok(())
        }
        (ScalarKind::Str, Value::Str(s)) => {
            encode_len(name, s.len(), out)?;
            out.extend_from_slice(s.as_bytes());
            Ok(())
        }
        (_, Value::Int(n)) => {
            let width = kind.bit_width().ok_or_else(|| EngineError::InvalidArgument {
                name: name.to_string(),
                reason: "value shape does not match the declared type".to_string(),
            })?;
            encode_int(name, n, width, kind.is_signed(), out)
        }
        _ => Err(EngineError::InvalidArgument {
            name: name.to_string(),
            reason: "value shape does not match the declared type".to_string(),
        }),
    }
}

/// Encodes an arbitrary-magnitude integer as a little-endian two's
/// complement value of exactly `width` bits, range-checked first.
fn encode_int(
    name: &str,
    value: &BigInt,
    width: u16,
    signed: bool,
    out: &mut Vec<u8>,
) -> EngineResult<()> {
    let bytes = width as usize / 8;
    let fits = if signed {
        let bound = BigInt::from(1) << (width - 1);
        value >= &-bound.clone() && value < &bound
    } else {
        !value.is_negative() && (value >> width).is_zero()
    };
    if !fits {
        return Err(EngineError::EncodingOverflow {
            name: name.to_string(),
            value: value.to_string(),
            width,
        });
    }

    let mut le = if signed {
        value.to_signed_bytes_le()
    } else {
        value.to_bytes_le().1
    };
    // Sign-extend (or zero-pad) out to the declared width.
    let fill = if signed && value.is_negative() { 0xff } else { 0x00 };
    le.resize(bytes, fill);
    out.extend_from_slice(&le);
    Ok(())
}

//! Typed operations for `s7ctl exec` and `s7ctl poll`
//!
//! Operation syntax:
//! - `read:<ADDR>:<TYPE>`
//! - `write:<ADDR>=<VALUE>:<TYPE>`

use s7_comlink::{status, S7Client, StatusCode};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OpParseError {
    #[error("Unknown operation {0:?}, expected read:... or write:...")]
    UnknownOperation(String),

    #[error("Missing value type in {0:?}")]
    MissingType(String),

    #[error("Unknown value type {0:?} (bool, u8, i8, u16, i16, u32, i32, f32)")]
    UnknownType(String),

    #[error("Missing '=<VALUE>' in write {0:?}")]
    MissingValue(String),

    #[error("Invalid {ty} value {value:?}")]
    InvalidValue { ty: ValueType, value: String },
}

/// Value types accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::U8 => "u8",
            ValueType::I8 => "i8",
            ValueType::U16 => "u16",
            ValueType::I16 => "i16",
            ValueType::U32 => "u32",
            ValueType::I32 => "i32",
            ValueType::F32 => "f32",
        }
    }

    pub fn parse_value(self, text: &str) -> Result<TypedValue, OpParseError> {
        let invalid = || OpParseError::InvalidValue {
            ty: self,
            value: text.to_string(),
        };
        let text = text.trim();
        Ok(match self {
            ValueType::Bool => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => TypedValue::Bool(true),
                "0" | "false" | "off" => TypedValue::Bool(false),
                _ => return Err(invalid()),
            },
            ValueType::U8 => TypedValue::U8(parse_int(text).ok_or_else(invalid)?),
            ValueType::I8 => TypedValue::I8(text.parse().map_err(|_| invalid())?),
            ValueType::U16 => TypedValue::U16(parse_int(text).ok_or_else(invalid)?),
            ValueType::I16 => TypedValue::I16(text.parse().map_err(|_| invalid())?),
            ValueType::U32 => TypedValue::U32(parse_int(text).ok_or_else(invalid)?),
            ValueType::I32 => TypedValue::I32(text.parse().map_err(|_| invalid())?),
            ValueType::F32 => TypedValue::F32(text.parse().map_err(|_| invalid())?),
        })
    }
}

/// Decimal or `0x` hexadecimal unsigned integer
fn parse_int<T>(text: &str) -> Option<T>
where
    T: FromStr + TryFrom<u64>,
{
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)
            .ok()
            .and_then(|v| T::try_from(v).ok()),
        None => text.parse().ok(),
    }
}

impl FromStr for ValueType {
    type Err = OpParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "bool" => ValueType::Bool,
            "u8" | "byte" => ValueType::U8,
            "i8" => ValueType::I8,
            "u16" | "word" => ValueType::U16,
            "i16" | "int" => ValueType::I16,
            "u32" | "dword" => ValueType::U32,
            "i32" | "dint" => ValueType::I32,
            "f32" | "real" => ValueType::F32,
            _ => return Err(OpParseError::UnknownType(s.to_string())),
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
}

impl TypedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            TypedValue::Bool(_) => ValueType::Bool,
            TypedValue::U8(_) => ValueType::U8,
            TypedValue::I8(_) => ValueType::I8,
            TypedValue::U16(_) => ValueType::U16,
            TypedValue::I16(_) => ValueType::I16,
            TypedValue::U32(_) => ValueType::U32,
            TypedValue::I32(_) => ValueType::I32,
            TypedValue::F32(_) => ValueType::F32,
        }
    }

    pub fn to_json(self) -> serde_json::Value {
        match self {
            TypedValue::Bool(v) => v.into(),
            TypedValue::U8(v) => v.into(),
            TypedValue::I8(v) => v.into(),
            TypedValue::U16(v) => v.into(),
            TypedValue::I16(v) => v.into(),
            TypedValue::U32(v) => v.into(),
            TypedValue::I32(v) => v.into(),
            TypedValue::F32(v) => v.into(),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Bool(v) => write!(f, "{}", v),
            TypedValue::U8(v) => write!(f, "{} (0x{:02X})", v, v),
            TypedValue::I8(v) => write!(f, "{}", v),
            TypedValue::U16(v) => write!(f, "{} (0x{:04X})", v, v),
            TypedValue::I16(v) => write!(f, "{}", v),
            TypedValue::U32(v) => write!(f, "{} (0x{:08X})", v, v),
            TypedValue::I32(v) => write!(f, "{}", v),
            TypedValue::F32(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Read { address: String, ty: ValueType },
    Write { address: String, value: TypedValue },
}

impl Operation {
    pub fn address(&self) -> &str {
        match self {
            Operation::Read { address, .. } | Operation::Write { address, .. } => address,
        }
    }
}

impl FromStr for Operation {
    type Err = OpParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| OpParseError::UnknownOperation(s.to_string()))?;
        let (target, ty) = rest
            .rsplit_once(':')
            .ok_or_else(|| OpParseError::MissingType(s.to_string()))?;
        let ty: ValueType = ty.parse()?;

        match kind.to_ascii_lowercase().as_str() {
            "read" | "r" => Ok(Operation::Read {
                address: target.to_string(),
                ty,
            }),
            "write" | "w" => {
                let (address, value) = target
                    .split_once('=')
                    .ok_or_else(|| OpParseError::MissingValue(s.to_string()))?;
                Ok(Operation::Write {
                    address: address.to_string(),
                    value: ty.parse_value(value)?,
                })
            },
            _ => Err(OpParseError::UnknownOperation(s.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read { address, ty } => write!(f, "read {} as {}", address, ty),
            Operation::Write { address, value } => {
                write!(f, "write {} = {} as {}", address, value, value.value_type())
            },
        }
    }
}

/// Outcome of an executed operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Read { value: TypedValue, code: StatusCode },
    Written { code: StatusCode },
}

impl Outcome {
    pub fn code(&self) -> StatusCode {
        match self {
            Outcome::Read { code, .. } | Outcome::Written { code } => *code,
        }
    }
}

/// Read `address` as `ty` through the client queue
pub async fn read_typed(
    client: &S7Client,
    address: &str,
    ty: ValueType,
) -> s7_comlink::Result<(TypedValue, StatusCode)> {
    macro_rules! read_as {
        ($variant:ident, $t:ty) => {{
            let (value, code) = client.read_async::<$t>(address).await?;
            (TypedValue::$variant(value), code)
        }};
    }

    Ok(match ty {
        ValueType::Bool => read_as!(Bool, bool),
        ValueType::U8 => read_as!(U8, u8),
        ValueType::I8 => read_as!(I8, i8),
        ValueType::U16 => read_as!(U16, u16),
        ValueType::I16 => read_as!(I16, i16),
        ValueType::U32 => read_as!(U32, u32),
        ValueType::I32 => read_as!(I32, i32),
        ValueType::F32 => read_as!(F32, f32),
    })
}

/// Write `value` to `address` through the client queue
pub async fn write_typed(
    client: &S7Client,
    address: &str,
    value: TypedValue,
) -> s7_comlink::Result<StatusCode> {
    match value {
        TypedValue::Bool(v) => client.write_async(address, v).await,
        TypedValue::U8(v) => client.write_async(address, v).await,
        TypedValue::I8(v) => client.write_async(address, v).await,
        TypedValue::U16(v) => client.write_async(address, v).await,
        TypedValue::I16(v) => client.write_async(address, v).await,
        TypedValue::U32(v) => client.write_async(address, v).await,
        TypedValue::I32(v) => client.write_async(address, v).await,
        TypedValue::F32(v) => client.write_async(address, v).await,
    }
}

/// JSON record of one executed operation, as printed by `exec --json`
pub fn outcome_json(op: &Operation, result: &s7_comlink::Result<Outcome>) -> serde_json::Value {
    let (kind, ty) = match op {
        Operation::Read { ty, .. } => ("read", *ty),
        Operation::Write { value, .. } => ("write", value.value_type()),
    };
    let mut entry = serde_json::json!({
        "op": kind,
        "address": op.address(),
        "type": ty.name(),
    });
    if let Operation::Write { value, .. } = op {
        entry["written"] = value.to_json();
    }

    match result {
        Ok(outcome) => {
            if let Outcome::Read { value, .. } = outcome {
                entry["value"] = value.to_json();
            }
            entry["status"] = outcome.code().into();
            entry["status_text"] = status::describe(outcome.code()).into();
        },
        Err(e) => entry["error"] = e.to_string().into(),
    }
    entry
}

pub async fn execute(client: &S7Client, op: &Operation) -> s7_comlink::Result<Outcome> {
    match op {
        Operation::Read { address, ty } => {
            let (value, code) = read_typed(client, address, *ty).await?;
            Ok(Outcome::Read { value, code })
        },
        Operation::Write { address, value } => {
            let code = write_typed(client, address, *value).await?;
            Ok(Outcome::Written { code })
        },
    }
}

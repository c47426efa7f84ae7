use std::fmt;
use std::str::FromStr;

use super::error::{RecordError, RecordResult};

/// Maximum number of payload bytes in a string field
pub const STRING_LEN: usize = 128;

/// Represents a field data type. Every type has a fixed on-disk width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int, // 4 bytes
    Str, // 4-byte length prefix + STRING_LEN bytes
}

impl Type {
    /// Get the size in bytes for this data type
    pub fn size(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Str => 4 + STRING_LEN,
        }
    }

    /// Parse one field of this type from exactly `self.size()` bytes
    pub fn parse(&self, bytes: &[u8]) -> RecordResult<Field> {
        if bytes.len() != self.size() {
            return Err(RecordError::Deserialization(format!(
                "Expected {} bytes for {}, got {}",
                self.size(),
                self,
                bytes.len()
            )));
        }

        match self {
            Type::Int => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Field::Int(i32::from_be_bytes(buf)))
            }
            Type::Str => {
                let mut len_buf = [0u8; 4];
                len_buf.copy_from_slice(&bytes[..4]);
                let len = u32::from_be_bytes(len_buf) as usize;
                if len > STRING_LEN {
                    return Err(RecordError::Deserialization(format!(
                        "String length {} exceeds max length {}",
                        len, STRING_LEN
                    )));
                }
                let s = String::from_utf8(bytes[4..4 + len].to_vec())
                    .map_err(|e| RecordError::Deserialization(format!("Invalid UTF-8: {}", e)))?;
                Ok(Field::Str(s))
            }
        }
    }

    /// Parse a field of this type from its textual form
    pub fn parse_text(&self, text: &str) -> RecordResult<Field> {
        let text = text.trim();
        match self {
            Type::Int => text.parse::<i32>().map(Field::Int).map_err(|_| {
                RecordError::TypeMismatch {
                    expected: Type::Int.to_string(),
                    actual: format!("{:?}", text),
                }
            }),
            Type::Str => Field::string(text),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::Str => write!(f, "STRING"),
        }
    }
}

impl FromStr for Type {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" => Ok(Type::Int),
            "string" => Ok(Type::Str),
            other => Err(RecordError::UnknownType(other.to_string())),
        }
    }
}

/// Represents a single field value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    /// Build a string field, rejecting values longer than [`STRING_LEN`] bytes
    pub fn string(s: impl Into<String>) -> RecordResult<Self> {
        let s = s.into();
        if s.len() > STRING_LEN {
            return Err(RecordError::StringTooLong {
                len: s.len(),
                max: STRING_LEN,
            });
        }
        Ok(Field::Str(s))
    }

    /// Get the data type of this value
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::Str(_) => Type::Str,
        }
    }

    /// Append the fixed-width encoding of this field to `out`.
    ///
    /// String length is checked when records are built, so an over-long
    /// string here is clipped rather than reported.
    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            Field::Int(i) => out.extend_from_slice(&i.to_be_bytes()),
            Field::Str(s) => {
                let bytes = &s.as_bytes()[..s.len().min(STRING_LEN)];
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
                out.resize(out.len() + STRING_LEN - bytes.len(), 0);
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(i) => write!(f, "{}", i),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}

use std::fmt;

use super::error::{RecordError, RecordResult};
use super::value::{Field, STRING_LEN, Type};

/// Field definition: a type and an optional name
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub field_type: Type,
    pub name: Option<String>,
}

impl FieldDef {
    pub fn new(field_type: Type, name: Option<String>) -> Self {
        Self { field_type, name }
    }

    /// Get the size of this field in bytes
    pub fn size(&self) -> usize {
        self.field_type.size()
    }
}

/// Ordered list of fixed-width fields describing every record of a table.
///
/// Two schemas are equal when they have the same field types in the same
/// order; names do not take part in equality.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldDef>,
    record_size: usize,
}

impl Schema {
    /// Create a schema from field definitions
    pub fn new(fields: Vec<FieldDef>) -> RecordResult<Self> {
        if fields.is_empty() {
            return Err(RecordError::SchemaMismatch(
                "A schema needs at least one field".to_string(),
            ));
        }
        let record_size = fields.iter().map(FieldDef::size).sum();
        Ok(Self {
            fields,
            record_size,
        })
    }

    /// Create a schema of unnamed fields
    pub fn from_types(types: &[Type]) -> RecordResult<Self> {
        Self::new(types.iter().map(|t| FieldDef::new(*t, None)).collect())
    }

    /// Create a schema from parallel type and name lists
    pub fn with_names(types: &[Type], names: &[&str]) -> RecordResult<Self> {
        if names.len() > types.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "{} names given for {} fields",
                names.len(),
                types.len()
            )));
        }
        let fields = types
            .iter()
            .enumerate()
            .map(|(i, t)| FieldDef::new(*t, names.get(i).map(|n| n.to_string())))
            .collect();
        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field_type(&self, idx: usize) -> Option<Type> {
        self.fields.get(idx).map(|f| f.field_type)
    }

    pub fn field_name(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).and_then(|f| f.name.as_deref())
    }

    /// Find field index by name
    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.as_deref() == Some(name))
    }

    /// Total record width in bytes
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Validate field values against this schema
    pub fn validate(&self, values: &[Field]) -> RecordResult<()> {
        if values.len() != self.fields.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} fields, got {}",
                self.fields.len(),
                values.len()
            )));
        }

        for (value, def) in values.iter().zip(&self.fields) {
            if value.field_type() != def.field_type {
                return Err(RecordError::TypeMismatch {
                    expected: def.field_type.to_string(),
                    actual: format!("{:?}", value),
                });
            }
            if let Field::Str(s) = value
                && s.len() > STRING_LEN
            {
                return Err(RecordError::StringTooLong {
                    len: s.len(),
                    max: STRING_LEN,
                });
            }
        }

        Ok(())
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, def) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", def.field_type, def.name.as_deref().unwrap_or("null"))?;
        }
        Ok(())
    }
}

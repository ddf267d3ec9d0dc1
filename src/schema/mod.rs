//! Schema and tuple view: a statically typed record layout over a buffer,
//! decoupled from storage (spec §3 "Schema").

use serde::{Deserialize, Serialize};

/// Separator used to qualify a field name by its source name, e.g.
/// `orders$id`. Grounded in the original implementation's qualified-name
/// convention (`nes-data-types/include/API/Schema.hpp`).
pub const QUALIFIER_SEPARATOR: char = '$';

/// Closed set of physical field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Boolean,
    /// Fixed-length character array of the given length in bytes.
    Char(u32),
    /// Variable-sized bytes: the fixed region holds a `u32` offset/length
    /// pair into the buffer's child region.
    VarSized,
}

impl PhysicalType {
    /// Width in bytes this type occupies in the fixed-size tuple layout.
    /// Variable-sized fields occupy a 32-bit offset slot (spec §3).
    pub fn fixed_width(&self) -> usize {
        match self {
            PhysicalType::Int8 | PhysicalType::UInt8 | PhysicalType::Boolean => 1,
            PhysicalType::Int16 | PhysicalType::UInt16 => 2,
            PhysicalType::Int32 | PhysicalType::UInt32 | PhysicalType::Float32 => 4,
            PhysicalType::Int64 | PhysicalType::UInt64 | PhysicalType::Float64 => 8,
            PhysicalType::Char(len) => *len as usize,
            PhysicalType::VarSized => 4,
        }
    }

    pub fn is_variable_sized(&self) -> bool {
        matches!(self, PhysicalType::VarSized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub physical_type: PhysicalType,
}

impl Field {
    pub fn new(name: impl Into<String>, physical_type: PhysicalType) -> Self {
        Self { name: name.into(), physical_type }
    }

    /// The unqualified suffix after the last `QUALIFIER_SEPARATOR`, if any.
    pub fn short_name(&self) -> &str {
        self.name
            .rsplit_once(QUALIFIER_SEPARATOR)
            .map(|(_, suffix)| suffix)
            .unwrap_or(&self.name)
    }
}

/// An ordered sequence of fields with fixed byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Sum of fixed field widths; variable-sized fields contribute their
    /// 32-bit offset slot width, not their payload size (spec §3).
    pub fn size_in_bytes(&self) -> usize {
        self.fields.iter().map(|f| f.physical_type.fixed_width()).sum()
    }

    /// Byte offset of `field_index` within one tuple's fixed region.
    pub fn offset_of(&self, field_index: usize) -> usize {
        self.fields[..field_index]
            .iter()
            .map(|f| f.physical_type.fixed_width())
            .sum()
    }

    pub fn has_variable_sized_fields(&self) -> bool {
        self.fields.iter().any(|f| f.physical_type.is_variable_sized())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name || f.short_name() == name)
    }

    /// Prefix every field name with `source_name` + [`QUALIFIER_SEPARATOR`].
    /// Used when unioning or joining two logical sources so identically
    /// named fields stay distinguishable.
    pub fn qualify(&self, source_name: &str) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .map(|f| Field {
                    name: format!("{source_name}{QUALIFIER_SEPARATOR}{}", f.short_name()),
                    physical_type: f.physical_type,
                })
                .collect(),
        }
    }

    /// Concatenate two schemas' field lists, used to build a join's output
    /// schema from its two input schemas.
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.clone());
        Schema { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_in_bytes_sums_fixed_widths() {
        let schema = Schema::new(vec![
            Field::new("id", PhysicalType::UInt64),
            Field::new("value", PhysicalType::UInt32),
            Field::new("flag", PhysicalType::Boolean),
        ]);
        assert_eq!(schema.size_in_bytes(), 8 + 4 + 1);
    }

    #[test]
    fn qualify_prefixes_names_and_is_idempotent_on_shortname() {
        let schema = Schema::new(vec![Field::new("id", PhysicalType::UInt64)]);
        let qualified = schema.qualify("orders");
        assert_eq!(qualified.fields[0].name, "orders$id");
        assert_eq!(qualified.fields[0].short_name(), "id");
        let requalified = qualified.qualify("r2");
        assert_eq!(requalified.fields[0].name, "r2$id");
    }

    #[test]
    fn variable_sized_field_contributes_offset_slot_only() {
        let schema = Schema::new(vec![Field::new("payload", PhysicalType::VarSized)]);
        assert_eq!(schema.size_in_bytes(), 4);
        assert!(schema.has_variable_sized_fields());
    }
}

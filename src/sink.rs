//! Sink output formats (spec §6 "File formats"). Neither format depends on
//! a network destination; `NetworkSink` (spec §4.5) is the network-facing
//! sink and lives in [`crate::network::sink`].

use crate::schema::Schema;
use crate::source::FieldValue;

fn ruler(width: usize) -> String {
    format!("+{}+", "-".repeat(width))
}

/// Table header framed by a ruler, one `|field:TYPE|` line, another ruler,
/// then one `|value|...|` line per row.
pub fn render_text_table(schema: &Schema, rows: &[Vec<String>]) -> String {
    let header = format!("|{}|", schema.fields.iter().map(|f| format!("{}:{:?}", f.name, f.physical_type)).collect::<Vec<_>>().join("|"));
    let bar = ruler(header.len().saturating_sub(2));
    let mut out = String::new();
    out.push_str(&bar);
    out.push('\n');
    out.push_str(&header);
    out.push('\n');
    out.push_str(&bar);
    out.push('\n');
    for row in rows {
        out.push('|');
        out.push_str(&row.join("|"));
        out.push_str("|\n");
    }
    out
}

/// Tightly packed, little-endian binary record: fixed-width fields in
/// schema order; a variable-sized field is preceded by its `u32` byte
/// length.
pub fn encode_binary_record(values: &[FieldValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        match value {
            FieldValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
            FieldValue::Bool(v) => out.push(*v as u8),
            FieldValue::Str(s) => {
                let bytes = s.as_bytes();
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, PhysicalType};

    #[test]
    fn scenario_1_text_sink_renders_single_sum_row() {
        let schema = Schema::new(vec![Field::new("sum", PhysicalType::UInt32)]);
        let rendered = render_text_table(&schema, &[vec!["10".to_string()]]);
        assert!(rendered.lines().any(|line| line == "|10|"));
        assert!(rendered.starts_with("+"));
    }

    #[test]
    fn binary_record_prefixes_variable_sized_fields_with_length() {
        let encoded = encode_binary_record(&[FieldValue::U64(7), FieldValue::Str("hi".to_string())]);
        assert_eq!(&encoded[0..8], &7u64.to_le_bytes());
        assert_eq!(&encoded[8..12], &2u32.to_le_bytes());
        assert_eq!(&encoded[12..14], b"hi");
    }
}

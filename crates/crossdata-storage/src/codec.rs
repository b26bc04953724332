//! CSV decoding into [`Table`]s.

use std::collections::HashMap;

use crossdata_domain::{Table, Value};

/// Decode a CSV document with a header row.
///
/// Cells are trimmed, then typed per cell with [`Value::infer`]. Repeated header
/// names are disambiguated as `name.1`, `name.2`, ... so that no column
/// shadows another.
///
/// # Errors
///
/// Returns the underlying `csv` error for malformed input.
pub fn decode_csv(bytes: &[u8]) -> Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = dedupe_headers(reader.headers()?.iter());
    let mut table = Table::new(headers);

    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter().map(|cell| Value::infer(cell.trim())).collect());
    }

    Ok(table)
}

fn dedupe_headers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .map(|name| {
            let name = name.trim().to_string();
            let count = seen.entry(name.clone()).or_insert(0);
            let unique = if *count == 0 {
                name
            } else {
                format!("{name}.{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_infers_types() {
        let csv = "id,monto,estado,fecha_reclamo\n1,500.5,abierto,2024-01-10\n2,,cerrado,2024-02-11\n";
        let table = decode_csv(csv.as_bytes()).unwrap();

        assert_eq!(table.columns(), ["id", "monto", "estado", "fecha_reclamo"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "id"), Some(&Value::Int(1)));
        assert_eq!(table.value(0, "monto"), Some(&Value::Float(500.5)));
        assert_eq!(table.value(1, "monto"), Some(&Value::Null));
        assert!(matches!(table.value(1, "fecha_reclamo"), Some(Value::DateTime(_))));
    }

    #[test]
    fn test_ragged_rows_and_duplicate_headers() {
        let csv = "code,name,code\nA1,first\nA2,second,X,extra\n";
        let table = decode_csv(csv.as_bytes()).unwrap();

        assert_eq!(table.columns(), ["code", "name", "code.1"]);
        assert_eq!(table.value(0, "code.1"), Some(&Value::Null));
        assert_eq!(table.value(1, "code.1"), Some(&Value::from("X")));
    }

    #[test]
    fn test_padded_text_cells_are_trimmed() {
        let csv = "id,estado\n1, abierto\n2,abierto \n3,abierto\n";
        let table = decode_csv(csv.as_bytes()).unwrap();

        for row in 0..3 {
            assert_eq!(table.value(row, "estado"), Some(&Value::from("abierto")));
        }
    }

    #[test]
    fn test_header_only() {
        let table = decode_csv(b"a,b\n").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_count(), 2);
    }
}

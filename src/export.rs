use std::path::Path;

use serde_json::{Map, Value};

// ── Table ────────────────────────────────────────────────────────────────────

/// Flat row/column view of the registry records. Cells are already rendered
/// as text; a record missing a column holds an empty string there.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Flatten records into a table: one row per record, columns = union of
    /// keys across all records, nested objects joined into dotted column
    /// paths (`domicilio.calle`). No records means no rows and no columns.
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        Self::with_schema(records, &[])
    }

    /// Same flattening, but seed the column set with a known schema so a
    /// sparse or empty result still lines up with earlier exports. Unknown
    /// keys are appended after the seeded columns.
    pub fn with_schema(records: &[Map<String, Value>], known_columns: &[String]) -> Self {
        let flattened: Vec<Map<String, Value>> = records.iter().map(flatten_record).collect();

        let mut columns: Vec<String> = known_columns.to_vec();
        for record in &flattened {
            for key in record.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = flattened
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Table { columns, rows }
    }
}

fn flatten_record(record: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, record);
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: Option<&str>, object: &Map<String, Value>) {
    for (key, value) in object {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_into(flat, Some(&path), nested),
            other => {
                flat.insert(path, other.clone());
            }
        }
    }
}

/// Strings verbatim, null as empty, everything else (numbers, bools, arrays)
/// as its JSON text.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ── CSV output ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Write the table as UTF-8 comma-delimited text: one header row, one line
/// per row, no index column. Truncates any existing file at `path`. A table
/// with no columns writes an empty file.
pub fn write_csv(table: &Table, path: &Path) -> Result<(), ExportError> {
    let wrap = |source: csv::Error| ExportError::Write {
        path: path.display().to_string(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(wrap)?;

    if !table.columns.is_empty() {
        writer.write_record(&table.columns).map_err(wrap)?;
        for row in &table.rows {
            writer.write_record(row).map_err(wrap)?;
        }
    }

    writer.flush().map_err(|e| wrap(e.into()))?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

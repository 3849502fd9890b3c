use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const COLUMNS: [&str; 2] = ["property", "value"];

/// `[key, value]`, serialized as a two-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow(pub String, pub Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataTable {
    pub columns: [String; 2],
    pub rows: Vec<MetadataRow>,
}

impl MetadataTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Aligned two-column text for terminal output.
    pub fn render_text(&self) -> String {
        let cells: Vec<(String, String)> = self
            .rows
            .iter()
            .map(|MetadataRow(k, v)| (k.clone(), render_value(v)))
            .collect();
        let width = cells
            .iter()
            .map(|(k, _)| k.chars().count())
            .chain(std::iter::once(self.columns[0].chars().count()))
            .max()
            .unwrap_or(0);

        let mut out = format!("{:<width$}  {}\n", self.columns[0], self.columns[1]);
        for (k, v) in cells {
            out.push_str(&format!("{k:<width$}  {v}\n"));
        }
        out
    }
}

fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One row per metadata entry, in the map's iteration order, values untouched.
pub fn tabulate(metadata: &Map<String, Value>) -> MetadataTable {
    MetadataTable {
        columns: COLUMNS.map(String::from),
        rows: metadata
            .iter()
            .map(|(k, v)| MetadataRow(k.clone(), v.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_aligned_columns() {
        let Value::Object(map) = json!({"pages": 3, "language": "en", "rotated": false}) else {
            unreachable!()
        };
        let text = tabulate(&map).render_text();
        assert_eq!(
            text,
            "property  value\npages     3\nlanguage  en\nrotated   false\n"
        );
    }
}

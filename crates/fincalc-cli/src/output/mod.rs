pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Flatten nested objects into dotted keys so each row fits one line
/// (`outcome.tax_this_month`). Arrays are left as values.
pub fn flatten(value: &Value) -> Value {
    fn walk(prefix: &str, value: &Value, out: &mut Map<String, Value>) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    let name = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(&name, inner, out);
                }
            }
            other => {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }

    match value {
        Value::Object(_) => {
            let mut out = Map::new();
            walk("", value, &mut out);
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// First field of `map` holding a non-empty array of objects.
pub fn first_record_array(map: &Map<String, Value>) -> Option<(&str, &Vec<Value>)> {
    map.iter().find_map(|(key, val)| match val {
        Value::Array(items) if items.first().is_some_and(Value::is_object) => {
            Some((key.as_str(), items))
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_outcome() {
        let row = json!({
            "year_month": "2024-01",
            "outcome": {"status": "computed", "tax_this_month": "402.00"},
            "events": []
        });
        let flat = flatten(&row);
        assert_eq!(flat["outcome.status"], json!("computed"));
        assert_eq!(flat["outcome.tax_this_month"], json!("402.00"));
        assert_eq!(flat["events"], json!([]));
    }

    #[test]
    fn test_first_record_array_skips_scalars() {
        let value = json!({"count": 2, "rows": [{"a": 1}], "years": [{"b": 2}]});
        let (key, items) = first_record_array(value.as_object().unwrap()).unwrap();
        assert_eq!(key, "rows");
        assert_eq!(items.len(), 1);
    }
}

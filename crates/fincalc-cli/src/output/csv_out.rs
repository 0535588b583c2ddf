use serde_json::Value;
use std::io;

use super::{first_record_array, flatten};

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => {
            if let Some(Value::Object(result)) = map.get("result") {
                if let Some((_, records)) = first_record_array(result) {
                    // Forecast rows or performance series
                    write_array_csv(&mut wtr, records);
                } else {
                    write_field_value(&mut wtr, &flatten(&Value::Object(result.clone())));
                }
            } else {
                write_field_value(&mut wtr, value);
            }
        }
        Value::Array(arr) => {
            write_array_csv(&mut wtr, arr);
        }
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

/// Two-column CSV: field, value
fn write_field_value(wtr: &mut csv::Writer<io::StdoutLock<'_>>, value: &Value) {
    let _ = wtr.write_record(["field", "value"]);
    if let Value::Object(map) = value {
        for (key, val) in map {
            let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
        }
    }
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    let rows: Vec<Value> = arr.iter().map(flatten).collect();

    // Union of keys across rows: failed forecast months lack result columns
    if rows.iter().any(Value::is_object) {
        let mut headers: Vec<String> = Vec::new();
        for row in &rows {
            if let Value::Object(map) = row {
                for key in map.keys() {
                    if !headers.contains(key) {
                        headers.push(key.clone());
                    }
                }
            }
        }
        let _ = wtr.write_record(&headers);

        for item in &rows {
            if let Value::Object(map) = item {
                let record: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&record);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

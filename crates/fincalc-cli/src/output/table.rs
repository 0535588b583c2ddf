use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::flatten;

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            // Check if "result" key holds the primary data
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_flat_object(value);
            }
        }
        Value::Array(arr) => {
            print_array_table(arr);
        }
        _ => {
            println!("{}", value);
        }
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    if let Value::Object(res_map) = result {
        // Scalars and small objects first, record lists as their own tables
        let (records, fields): (Vec<_>, Vec<_>) = res_map
            .iter()
            .partition(|(_, val)| is_record_list(val));

        if !fields.is_empty() {
            let mut builder = Builder::default();
            builder.push_record(["Field", "Value"]);
            for (key, val) in fields {
                if let Value::Object(inner) = val {
                    for (sub, v) in inner {
                        builder.push_record([format!("{key}.{sub}"), format_value(v)]);
                    }
                } else {
                    builder.push_record([key.clone(), format_value(val)]);
                }
            }
            println!("{}", Table::from(builder));
        }

        for (key, val) in records {
            if let Value::Array(arr) = val {
                println!("\n{key}:");
                print_array_table(arr);
            }
        }
    } else {
        print_flat_object(&Value::Object(envelope.clone()));
    }

    // Print warnings if any
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    // Print methodology
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn is_record_list(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.first().is_some_and(Value::is_object))
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = flatten(value) {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in &map {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    let rows: Vec<Value> = arr.iter().map(flatten).collect();

    // Collect all keys from first object for headers
    if let Some(Value::Object(first)) = rows.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in &rows {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        // Simple array of values
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

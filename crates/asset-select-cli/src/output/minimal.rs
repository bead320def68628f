use serde_json::Value;

use super::selection_of;

/// Print just the chosen symbols, comma separated.
///
/// Falls back to the first priority field found in the result object.
pub fn print_minimal(value: &Value) {
    if let Some(Value::Array(symbols)) = selection_of(value).and_then(|s| s.get("selected_symbols")) {
        let names: Vec<String> = symbols.iter().map(format_minimal).collect();
        println!("{}", names.join(","));
        return;
    }

    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = ["selected_symbols", "objective_value", "expected_return"];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

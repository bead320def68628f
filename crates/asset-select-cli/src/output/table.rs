use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::selection_of;

/// Format output as tables using the tabled crate.
///
/// A selection envelope prints the selection fields, then one row per asset
/// with its mean return, variance and whether it was picked.
pub fn print_table(value: &Value) {
    match (value, selection_of(value)) {
        (Value::Object(envelope), Some(selection)) => {
            print_field_table(selection);
            if let Some(stats) = value.get("result").and_then(|r| r.get("statistics")) {
                print_asset_table(stats, selection);
            }
            print_footer(envelope);
        }
        (Value::Object(map), None) => print_field_table(map),
        _ => println!("{}", value),
    }
}

fn print_field_table(map: &serde_json::Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_asset_table(stats: &Value, selection: &serde_json::Map<String, Value>) {
    let (Some(Value::Array(symbols)), Some(Value::Array(mu)), Some(Value::Array(sigma))) =
        (stats.get("symbols"), stats.get("mu"), stats.get("sigma"))
    else {
        return;
    };
    let picked = selection.get("assignment").and_then(Value::as_array);

    let mut builder = Builder::default();
    builder.push_record(["Symbol", "Mean return", "Variance", "Selected"]);
    for (i, symbol) in symbols.iter().enumerate() {
        let variance = sigma
            .get(i)
            .and_then(|row| row.get(i))
            .map(format_value)
            .unwrap_or_default();
        let selected = picked
            .and_then(|a| a.get(i))
            .and_then(Value::as_u64)
            .map(|b| if b == 1 { "yes" } else { "" })
            .unwrap_or_default();
        builder.push_record([
            format_value(symbol),
            mu.get(i).map(format_value).unwrap_or_default(),
            variance,
            selected.to_string(),
        ]);
    }
    println!("\n{}", Table::from(builder));
}

fn print_footer(envelope: &serde_json::Map<String, Value>) {
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

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
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

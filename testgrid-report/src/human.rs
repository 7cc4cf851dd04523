//! Human-Readable Output
//!
//! Terminal rendering of a single result: header, verdict, aligned tables,
//! figure list and, when the result carries one, the rendered output template.

use serde_json::Value;
use testgrid_core::{OUTPUT_TEMPLATE_KEY, Record, ResultKind, ResultTable, TestResult};

/// Format a result for terminal display
pub fn format_human(result: &TestResult) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str(&format!("{}  ({})\n", result.name(), result.result_id()));
    output.push_str(&"=".repeat(60));
    output.push('\n');

    if !result.description().is_empty() {
        output.push_str(result.description());
        output.push_str("\n\n");
    }

    if result.kind() == ResultKind::Threshold {
        let status = match result.passed() {
            Some(true) => "✓ passed",
            Some(false) => "✗ failed",
            None => "? no verdict",
        };
        output.push_str(&format!("Status: {}\n\n", status));
    }

    if !result.inputs().is_empty() {
        let inputs: Vec<String> = result
            .inputs()
            .iter()
            .map(|i| format!("{}={}", i.role, i.input_ids.join(", ")))
            .collect();
        output.push_str(&format!("Inputs: {}\n", inputs.join("; ")));
    }
    if !result.params().is_empty() {
        let params: Vec<String> = result
            .params()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        output.push_str(&format!("Params: {}\n", params.join(", ")));
    }
    output.push('\n');

    for table in result.tables() {
        output.push_str(&format_table(table));
        output.push('\n');
    }

    if !result.figures().is_empty() {
        output.push_str("Figures:\n");
        for figure in result.figures() {
            match &figure.caption {
                Some(caption) => output.push_str(&format!("  - {} ({})\n", figure.key, caption)),
                None => output.push_str(&format!("  - {}\n", figure.key)),
            }
        }
        output.push('\n');
    }

    if let Some(template) = result.metadata_str(OUTPUT_TEMPLATE_KEY) {
        let record = result
            .tables()
            .first()
            .and_then(|t| t.records.first())
            .cloned()
            .unwrap_or_default();
        output.push_str(&render_template(template, &record));
        output.push('\n');
    }

    output
}

/// Aligned plain-text table
pub fn format_table(table: &ResultTable) -> String {
    let mut output = String::new();
    if let Some(title) = &table.title {
        output.push_str(title);
        output.push('\n');
        output.push_str(&"-".repeat(title.chars().count().max(8)));
        output.push('\n');
    }

    let columns = table.columns();
    if columns.is_empty() {
        output.push_str("(no rows)\n");
        return output;
    }

    let rows: Vec<Vec<String>> = table
        .records
        .iter()
        .map(|r| columns.iter().map(|c| cell_text(r.get(c))).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    output.push_str(&line(&columns));
    output.push('\n');
    output.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    output.push('\n');
    for row in &rows {
        output.push_str(&line(row));
        output.push('\n');
    }
    output
}

/// Display text of one cell; missing and `null` cells are blank
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.is_f64() => {
            let f = n.as_f64().unwrap_or_default();
            let text = format!("{:.4}", f);
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        }
        Some(other) => other.to_string(),
    }
}

/// Substitute `{{ name }}` placeholders with values from `record`.
/// Unknown placeholders are left untouched.
pub fn render_template(template: &str, record: &Record) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match record.get(name) {
                    Some(value) => out.push_str(&cell_text(Some(value))),
                    None => out.push_str(&rest[start..start + end + 4]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_table_alignment() {
        let table = ResultTable::titled(
            "Summary",
            vec![
                record(json!({"Column": "age", "Mean": 30.5})),
                record(json!({"Column": "income", "Mean": 1200})),
            ],
        );
        let text = format_table(&table);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Summary");
        assert_eq!(lines[2], "Column  Mean");
        assert_eq!(lines[4], "age     30.5");
        assert_eq!(lines[5], "income  1200");
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(Some(&json!(0.123456))), "0.1235");
        assert_eq!(cell_text(Some(&json!(2.0))), "2");
        assert_eq!(cell_text(Some(&json!(7))), "7");
        assert_eq!(cell_text(Some(&Value::Null)), "");
        assert_eq!(cell_text(None), "");
        assert_eq!(cell_text(Some(&json!(true))), "true");
    }

    #[test]
    fn test_render_template() {
        let rec = record(json!({"Accuracy": 0.9, "label": "clf"}));
        assert_eq!(
            render_template("<b>{{ label }}</b>: {{Accuracy}} {{ missing }}", &rec),
            "<b>clf</b>: 0.9 {{ missing }}"
        );
        assert_eq!(render_template("open {{ end", &rec), "open {{ end");
    }
}

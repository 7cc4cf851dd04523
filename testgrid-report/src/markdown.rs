//! Markdown Output

use crate::human::cell_text;
use testgrid_core::{ResultTable, TestResult};

/// Generate a Markdown section for a result
pub fn generate_markdown(result: &TestResult) -> String {
    let mut output = format!("### {}\n\n`{}`\n\n", result.name(), result.result_id());

    if let Some(passed) = result.passed() {
        output.push_str(if passed {
            "**Status:** ✅ passed\n\n"
        } else {
            "**Status:** ❌ failed\n\n"
        });
    }

    for table in result.tables() {
        output.push_str(&markdown_table(table));
        output.push('\n');
    }

    for figure in result.figures() {
        output.push_str(&format!(
            "- figure `{}`{}\n",
            figure.key,
            figure
                .caption
                .as_ref()
                .map(|c| format!(": {}", c))
                .unwrap_or_default()
        ));
    }
    output
}

fn markdown_table(table: &ResultTable) -> String {
    let mut output = String::new();
    if let Some(title) = &table.title {
        output.push_str(&format!("#### {}\n\n", title));
    }
    let columns = table.columns();
    if columns.is_empty() {
        output.push_str("_no rows_\n");
        return output;
    }
    output.push_str(&format!(
        "| {} |\n",
        columns.iter().map(|c| escape(c)).collect::<Vec<_>>().join(" | ")
    ));
    output.push_str(&format!("|{}\n", "---|".repeat(columns.len())));
    for record in &table.records {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| escape(&cell_text(record.get(c))))
            .collect();
        output.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    output
}

fn escape(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_markdown_table() {
        let table = ResultTable::new(vec![
            json!({"metric": "a|b", "value": 1}).as_object().unwrap().clone(),
        ]);
        assert_eq!(
            markdown_table(&table),
            "| metric | value |\n|---|---|\n| a\\|b | 1 |\n"
        );
    }
}

//! CSV Output
//!
//! One block per table, separated by a blank line. Titled tables are
//! preceded by a `# <title>` comment line.

use crate::human::cell_text;
use testgrid_core::{ResultTable, TestResult};

/// Generate CSV for every table of a result
pub fn generate_csv(result: &TestResult) -> String {
    result
        .tables()
        .iter()
        .map(table_csv)
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_csv(table: &ResultTable) -> String {
    let mut output = String::new();
    if let Some(title) = &table.title {
        output.push_str(&format!("# {}\n", title));
    }
    let columns = table.columns();
    output.push_str(
        &columns
            .iter()
            .map(|c| escape_csv(c))
            .collect::<Vec<_>>()
            .join(","),
    );
    output.push('\n');
    for record in &table.records {
        let row: Vec<String> = columns
            .iter()
            .map(|c| escape_csv(&cell_text(record.get(c))))
            .collect();
        output.push_str(&row.join(","));
        output.push('\n');
    }
    output
}

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_block() {
        let table = ResultTable::titled(
            "Classes",
            vec![
                json!({"class": "a,b", "count": 3}).as_object().unwrap().clone(),
                json!({"class": "say \"hi\"", "count": 1}).as_object().unwrap().clone(),
            ],
        );
        assert_eq!(
            table_csv(&table),
            "# Classes\nclass,count\n\"a,b\",3\n\"say \"\"hi\"\"\",1\n"
        );
    }
}

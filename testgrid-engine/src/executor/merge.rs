//! Comparison Merge
//!
//! Folds the per-configuration results of a comparison into one result under
//! the base identifier. Table shapes (count, titles, columns) must agree with
//! the reference run; records get the configuration's grid values as leading
//! columns; figures get run-scoped keys and captions. A record column that
//! shares a name with a grid key is a shape mismatch, as is a run whose grid
//! keys differ from the first run's.

use super::comparison::RunConfiguration;
use serde_json::Value;
use testgrid_core::{
    InputRef, Params, Record, Result, ResultKind, ResultParts, ResultTable, TestError, TestId,
    TestResult,
};

/// Metadata key listing the grid record of every merged run
pub const COMPARISON_RUNS_KEY: &str = "comparison_runs";

/// Merge per-configuration results, in run order
pub fn merge_results(
    base_id: &TestId,
    runs: &[(RunConfiguration, TestResult)],
) -> Result<TestResult> {
    let Some((_, first)) = runs.first() else {
        return Err(TestError::EmptyResult {
            test_id: base_id.to_string(),
        });
    };

    let reference = reference_columns(runs);
    let table_count = first.tables().len();

    let mut tables: Vec<ResultTable> = first
        .tables()
        .iter()
        .map(|t| ResultTable {
            title: t.title.clone(),
            records: Vec::new(),
        })
        .collect();
    let mut figures = Vec::new();
    let mut inputs: Vec<InputRef> = Vec::new();
    let mut verdicts: Vec<bool> = Vec::new();
    let mut grid_records: Vec<Value> = Vec::with_capacity(runs.len());
    let grid_keys: Vec<String> = runs[0].0.grid_record().keys().cloned().collect();

    for (run_index, (configuration, result)) in runs.iter().enumerate() {
        if result.tables().len() != table_count {
            return Err(mismatch(
                base_id,
                run_index,
                format!(
                    "expected {} tables, found {}",
                    table_count,
                    result.tables().len()
                ),
            ));
        }

        let grid = configuration.grid_record();
        let keys: Vec<String> = grid.keys().cloned().collect();
        if keys.len() != grid_keys.len() || keys.iter().any(|k| !grid_keys.contains(k)) {
            return Err(mismatch(
                base_id,
                run_index,
                format!("grid keys {:?}, expected {:?}", keys, grid_keys),
            ));
        }
        for (index, table) in result.tables().iter().enumerate() {
            if table.title != tables[index].title {
                return Err(mismatch(
                    base_id,
                    run_index,
                    format!(
                        "table {} is titled {:?}, expected {:?}",
                        index, table.title, tables[index].title
                    ),
                ));
            }
            if !table.is_empty() && table.columns() != reference[index] {
                return Err(mismatch(
                    base_id,
                    run_index,
                    format!(
                        "table {} has columns {:?}, expected {:?}",
                        index,
                        table.columns(),
                        reference[index]
                    ),
                ));
            }
            if let Some(column) = table.columns().into_iter().find(|c| grid.contains_key(c)) {
                return Err(mismatch(
                    base_id,
                    run_index,
                    format!(
                        "table {} has column {:?}, which is also a grid key",
                        index, column
                    ),
                ));
            }
            for record in &table.records {
                let mut merged: Record = grid.clone();
                for (key, value) in record {
                    merged.insert(key.clone(), value.clone());
                }
                tables[index].records.push(merged);
            }
        }

        let label = configuration.label();
        for figure in result.figures() {
            let mut figure = figure.clone();
            let caption = figure.caption.take().unwrap_or_else(|| figure.key.clone());
            figure.caption = Some(if label.is_empty() {
                caption
            } else {
                format!("{} ({})", caption, label)
            });
            figure.key = format!("{}:{}", figure.key, run_index);
            figures.push(figure);
        }

        for input in result.inputs() {
            match inputs.iter_mut().find(|i| i.role == input.role) {
                Some(existing) => {
                    for id in &input.input_ids {
                        if !existing.input_ids.contains(id) {
                            existing.input_ids.push(id.clone());
                        }
                    }
                }
                None => inputs.push(input.clone()),
            }
        }

        if let Some(passed) = result.passed() {
            verdicts.push(passed);
        }
        grid_records.push(Value::Object(grid));
    }

    let passed = if verdicts.is_empty() {
        None
    } else {
        Some(verdicts.iter().all(|p| *p))
    };

    // Grid-varied params differ per run; keep only the shared ones
    let varied: Vec<String> = runs
        .iter()
        .flat_map(|(c, _)| c.params.keys().cloned())
        .collect();
    let params: Params = first
        .params()
        .iter()
        .filter(|(name, _)| !varied.iter().any(|v| v == name))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();

    let mut metadata = first.metadata().clone();
    metadata.insert(COMPARISON_RUNS_KEY.to_string(), Value::Array(grid_records));

    Ok(TestResult::from_parts(ResultParts {
        result_id: base_id.clone(),
        name: first.name().to_string(),
        description: first.description().to_string(),
        kind: if passed.is_some() {
            ResultKind::Threshold
        } else {
            first.kind()
        },
        tables,
        figures,
        passed,
        inputs,
        params,
        metadata,
    }))
}

/// Columns of each table index, from the first run where that table has rows
fn reference_columns(runs: &[(RunConfiguration, TestResult)]) -> Vec<Vec<String>> {
    let count = runs.first().map(|(_, r)| r.tables().len()).unwrap_or(0);
    (0..count)
        .map(|index| {
            runs.iter()
                .filter_map(|(_, r)| r.tables().get(index))
                .find(|t| !t.is_empty())
                .map(ResultTable::columns)
                .unwrap_or_default()
        })
        .collect()
}

fn mismatch(base_id: &TestId, run_index: usize, detail: String) -> TestError {
    TestError::MergeShapeMismatch {
        test_id: base_id.to_string(),
        run_index,
        detail,
    }
}

//! Data validation tests (`validmind.data_validation.*`)

use super::{label, mean, record, std_dev};
use crate::{Dataset, Figure, RawOutput, Record, TestError, register_test};
use indexmap::IndexMap;
use serde_json::json;

/// Summary statistics of every numeric column: count, mean, standard
/// deviation, minimum and maximum.
#[register_test(
    id = "validmind.data_validation.DescriptiveStatistics",
    name = "Descriptive Statistics",
    tasks = "classification, regression",
    tags = "tabular_data, time_series_data"
)]
fn descriptive_statistics(dataset: &Dataset) -> Vec<Record> {
    dataset
        .numeric_columns()
        .into_iter()
        .map(|column| {
            let values = dataset.numeric_column(column);
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            record(json!({
                "Name": column,
                "Count": values.len(),
                "Mean": mean(&values),
                "Std": std_dev(&values),
                "Min": min,
                "Max": max,
            }))
        })
        .collect()
}

/// Share of rows per target class. A class fails when it holds less than
/// `min_percent_threshold` percent of the rows.
#[register_test(
    id = "validmind.data_validation.ClassImbalance",
    name = "Class Imbalance",
    tasks = "classification",
    tags = "tabular_data, binary_classification, multiclass_classification, data_quality",
    params(min_percent_threshold = 10.0)
)]
fn class_imbalance(dataset: &Dataset, min_percent_threshold: f64) -> anyhow::Result<RawOutput> {
    let target = dataset.target_column().ok_or_else(|| TestError::InvalidInput {
        role: dataset.input_id().to_string(),
        message: "class imbalance needs a target column".to_string(),
    })?;
    if dataset.is_empty() {
        anyhow::bail!("dataset '{}' has no rows", dataset.input_id());
    }

    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for value in dataset.column(target) {
        *counts.entry(label(value)).or_default() += 1;
    }
    counts.sort_keys();

    let total = dataset.len() as f64;
    let rows: Vec<Record> = counts
        .iter()
        .map(|(class, count)| {
            let percent = *count as f64 / total * 100.0;
            record(json!({
                target: class,
                "Percentage of Rows (%)": percent,
                "Pass/Fail": if percent >= min_percent_threshold { "Pass" } else { "Fail" },
            }))
        })
        .collect();
    let passed = rows.iter().all(|r| r["Pass/Fail"] == "Pass");

    let figure = Figure::new(
        "class_distribution",
        json!({
            "type": "bar",
            "x": counts.keys().collect::<Vec<_>>(),
            "y": counts.values().map(|c| *c as f64 / total * 100.0).collect::<Vec<_>>(),
        }),
    )
    .with_caption(format!("Class distribution of '{}'", target))
    .with_metadata("threshold", min_percent_threshold);

    Ok(RawOutput::new()
        .table(format!("{} Class Imbalance", target), rows)
        .figure(figure)
        .with_passed(passed))
}

/// Missing values per column. A column fails when it has at least
/// `min_threshold` missing cells.
#[register_test(
    id = "validmind.data_validation.MissingValues",
    name = "Missing Values",
    tasks = "classification, regression",
    tags = "tabular_data, data_quality",
    params(min_threshold = 1)
)]
fn missing_values(dataset: &Dataset, min_threshold: usize) -> RawOutput {
    let total = dataset.len().max(1) as f64;
    let rows: Vec<Record> = dataset
        .columns()
        .iter()
        .map(|column| {
            let missing = dataset.missing_count(column);
            record(json!({
                "Column": column,
                "Number of Missing Values": missing,
                "Percentage of Missing Values (%)": missing as f64 / total * 100.0,
                "Pass/Fail": if missing < min_threshold { "Pass" } else { "Fail" },
            }))
        })
        .collect();
    let passed = rows.iter().all(|r| r["Pass/Fail"] == "Pass");
    RawOutput::records(rows).with_passed(passed)
}

/// Histogram of every numeric column, one figure each.
#[register_test(
    id = "validmind.data_validation.FeatureHistograms",
    name = "Feature Histograms",
    tasks = "classification, regression",
    tags = "tabular_data, visualization",
    params(bins = 10)
)]
fn feature_histograms(dataset: &Dataset, bins: usize) -> anyhow::Result<RawOutput> {
    if bins == 0 {
        anyhow::bail!("bins must be at least 1");
    }
    let mut output = RawOutput::new();
    for column in dataset.feature_columns() {
        let values = dataset.numeric_column(column);
        if values.is_empty() {
            continue;
        }
        let (edges, counts) = histogram(&values, bins);
        output = output.figure(
            Figure::new(
                format!("histogram_{}", column),
                json!({"type": "histogram", "edges": edges, "counts": counts}),
            )
            .with_caption(format!("Distribution of '{}'", column))
            .with_metadata("column", column),
        );
    }
    if output.is_empty() {
        anyhow::bail!("dataset '{}' has no numeric feature columns", dataset.input_id());
    }
    Ok(output)
}

/// Equal-width histogram: `bins + 1` edges and `bins` counts
fn histogram(values: &[f64], bins: usize) -> (Vec<f64>, Vec<usize>) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if max > min { (max - min) / bins as f64 } else { 1.0 };

    let edges = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0; bins];
    for v in values {
        let index = (((v - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    (edges, counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_edges_and_counts() {
        let (edges, counts) = histogram(&[0.0, 1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(edges, vec![0.0, 2.0, 4.0]);
        assert_eq!(counts, vec![2, 3]);

        let (edges, counts) = histogram(&[5.0, 5.0], 3);
        assert_eq!(edges.len(), 4);
        assert_eq!(counts, vec![2, 0, 0]);
    }
}

//! Built-in Test Catalog
//!
//! Tests of the `validmind` namespace, registered at link time with
//! `#[register_test]`:
//!
//! - [`data_validation`] - Dataset profiling and data-quality checks
//! - [`model_validation`] - Classifier performance reports
//! - [`unit_metrics`] - Scalar classification metrics, usable as composite units

pub mod data_validation;
pub mod model_validation;
pub mod unit_metrics;

use serde_json::Value;
use testgrid_core::Record;

/// Object value as a record; anything else under a `value` column
pub(crate) fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => {
            let mut record = Record::new();
            record.insert("value".to_string(), other);
            record
        }
    }
}

/// Display label of a cell (class values, categories)
pub(crate) fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1)
pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_labels() {
        assert_eq!(label(&json!(1)), "1");
        assert_eq!(label(&json!(1.0)), "1");
        assert_eq!(label(&json!(0.5)), "0.5");
        assert_eq!(label(&json!("cat")), "cat");
        assert_eq!(label(&json!(true)), "true");
    }

    #[test]
    fn test_moments() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(std_dev(&[1.0]), None);
        assert_eq!(std_dev(&[2.0, 4.0]), Some(2f64.sqrt()));
    }
}

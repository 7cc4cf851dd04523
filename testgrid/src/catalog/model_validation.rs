//! Model validation tests (`validmind.model_validation.*`)

use super::record;
use super::unit_metrics::Labels;
use crate::{Dataset, Model, RawOutput, Record, register_test};
use serde_json::json;

/// Per-class precision, recall, F1 and support, followed by overall accuracy
/// and the macro and weighted averages.
#[register_test(
    id = "validmind.model_validation.sklearn.ClassifierPerformance",
    name = "Classifier Performance",
    tasks = "classification",
    tags = "sklearn, binary_classification, multiclass_classification, model_performance"
)]
fn classifier_performance(dataset: &Dataset, model: &Model) -> anyhow::Result<RawOutput> {
    let labels = Labels::from_inputs(dataset, model)?;
    let classes = labels.classes();
    let total = labels.y_true.len() as f64;

    let mut class_rows: Vec<Record> = Vec::with_capacity(classes.len());
    let (mut macro_p, mut macro_r, mut macro_f) = (0.0, 0.0, 0.0);
    let (mut weighted_p, mut weighted_r, mut weighted_f) = (0.0, 0.0, 0.0);

    for class in &classes {
        let c = labels.confusion(*class);
        let weight = c.support() as f64 / total;
        macro_p += c.precision();
        macro_r += c.recall();
        macro_f += c.f1();
        weighted_p += c.precision() * weight;
        weighted_r += c.recall() * weight;
        weighted_f += c.f1() * weight;
        class_rows.push(record(json!({
            "Class": super::label(&json!(class)),
            "Precision": c.precision(),
            "Recall": c.recall(),
            "F1": c.f1(),
            "Support": c.support(),
        })));
    }

    let n = classes.len().max(1) as f64;
    let overall = vec![
        record(json!({"Metric": "Accuracy", "Value": labels.accuracy()})),
        record(json!({"Metric": "Macro Precision", "Value": macro_p / n})),
        record(json!({"Metric": "Macro Recall", "Value": macro_r / n})),
        record(json!({"Metric": "Macro F1", "Value": macro_f / n})),
        record(json!({"Metric": "Weighted Precision", "Value": weighted_p})),
        record(json!({"Metric": "Weighted Recall", "Value": weighted_r})),
        record(json!({"Metric": "Weighted F1", "Value": weighted_f})),
    ];

    Ok(RawOutput::new()
        .table("Class Metrics", class_rows)
        .table("Overall", overall))
}

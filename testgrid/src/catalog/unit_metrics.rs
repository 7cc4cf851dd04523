//! Scalar classification metrics (`validmind.unit_metrics.classification.*`)
//!
//! Each metric returns one number, so they can be combined into composite
//! metrics. Multiclass inputs are macro-averaged over the observed labels;
//! binary inputs score the `pos_label` class.

use crate::{Dataset, Model, register_test};

/// Paired true and predicted labels of one dataset/model binding
pub(crate) struct Labels {
    pub(crate) y_true: Vec<f64>,
    pub(crate) y_pred: Vec<f64>,
}

impl Labels {
    pub(crate) fn from_inputs(dataset: &Dataset, model: &Model) -> anyhow::Result<Self> {
        let y_true = dataset.y()?;
        let y_pred = dataset.y_pred(model)?;
        if y_true.is_empty() {
            anyhow::bail!("dataset '{}' has no rows", dataset.input_id());
        }
        Ok(Self { y_true, y_pred })
    }

    /// Observed labels, ascending
    pub(crate) fn classes(&self) -> Vec<f64> {
        let mut classes: Vec<f64> = self.y_true.iter().chain(&self.y_pred).copied().collect();
        classes.sort_by(f64::total_cmp);
        classes.dedup();
        classes
    }

    pub(crate) fn accuracy(&self) -> f64 {
        let hits = self
            .y_true
            .iter()
            .zip(&self.y_pred)
            .filter(|(t, p)| t == p)
            .count();
        hits as f64 / self.y_true.len() as f64
    }

    /// One-vs-rest counts for `class`
    pub(crate) fn confusion(&self, class: f64) -> Confusion {
        let mut c = Confusion::default();
        for (t, p) in self.y_true.iter().zip(&self.y_pred) {
            match (*t == class, *p == class) {
                (true, true) => c.tp += 1,
                (false, true) => c.fp += 1,
                (true, false) => c.fn_ += 1,
                (false, false) => c.tn += 1,
            }
        }
        c
    }

    /// Score of `class` when binary, otherwise the macro average
    fn averaged(&self, pos_label: f64, score: impl Fn(&Confusion) -> f64) -> f64 {
        let classes = self.classes();
        if classes.len() <= 2 {
            return score(&self.confusion(pos_label));
        }
        classes.iter().map(|c| score(&self.confusion(*c))).sum::<f64>() / classes.len() as f64
    }
}

/// One-vs-rest confusion counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Confusion {
    pub(crate) tp: usize,
    pub(crate) fp: usize,
    pub(crate) fn_: usize,
    pub(crate) tn: usize,
}

impl Confusion {
    pub(crate) fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub(crate) fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub(crate) fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }

    pub(crate) fn support(&self) -> usize {
        self.tp + self.fn_
    }
}

/// Zero when the denominator is zero
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Fraction of predictions equal to the target.
#[register_test(
    id = "validmind.unit_metrics.classification.sklearn.Accuracy",
    name = "Accuracy",
    tasks = "classification",
    tags = "classification, sklearn, unit_metric"
)]
fn accuracy(dataset: &Dataset, model: &Model) -> anyhow::Result<f64> {
    Ok(Labels::from_inputs(dataset, model)?.accuracy())
}

/// Precision of the positive class (macro average for multiclass).
#[register_test(
    id = "validmind.unit_metrics.classification.sklearn.Precision",
    name = "Precision",
    tasks = "classification",
    tags = "classification, sklearn, unit_metric",
    params(pos_label = 1.0)
)]
fn precision(dataset: &Dataset, model: &Model, pos_label: f64) -> anyhow::Result<f64> {
    Ok(Labels::from_inputs(dataset, model)?.averaged(pos_label, Confusion::precision))
}

/// Recall of the positive class (macro average for multiclass).
#[register_test(
    id = "validmind.unit_metrics.classification.sklearn.Recall",
    name = "Recall",
    tasks = "classification",
    tags = "classification, sklearn, unit_metric",
    params(pos_label = 1.0)
)]
fn recall(dataset: &Dataset, model: &Model, pos_label: f64) -> anyhow::Result<f64> {
    Ok(Labels::from_inputs(dataset, model)?.averaged(pos_label, Confusion::recall))
}

/// Harmonic mean of precision and recall (macro average for multiclass).
#[register_test(
    id = "validmind.unit_metrics.classification.sklearn.F1",
    name = "F1",
    tasks = "classification",
    tags = "classification, sklearn, unit_metric",
    params(pos_label = 1.0)
)]
fn f1(dataset: &Dataset, model: &Model, pos_label: f64) -> anyhow::Result<f64> {
    Ok(Labels::from_inputs(dataset, model)?.averaged(pos_label, Confusion::f1))
}

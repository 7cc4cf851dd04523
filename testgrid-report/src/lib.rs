#![warn(missing_docs)]
//! TestGrid Report - Result Formatting and Logging
//!
//! Generates various output formats for a single result:
//! - Human (terminal text, output templates rendered)
//! - JSON (the `{id, tables, figures, passed?}` boundary payload)
//! - CSV (one block per table)
//! - Markdown (notebooks, CI summaries)
//!
//! and ships payloads to [`ResultSink`]s, synchronously or on tokio.

mod csv;
mod human;
mod json;
mod markdown;
mod sink;

pub use csv::generate_csv;
pub use human::{cell_text, format_human, format_table, render_template};
pub use json::{generate_json_payload, generate_json_result};
pub use markdown::generate_markdown;
pub use sink::{JsonDirSink, MemorySink, ResultSink, SinkError, log_all, log_async, log_instance};

use serde::{Deserialize, Serialize};
use testgrid_core::{TestInstance, TestResult};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// JSON boundary payload
    Json,
    /// CSV for spreadsheets
    Csv,
    /// Markdown tables
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// Format a result in the requested format
pub fn format_result(result: &TestResult, format: OutputFormat) -> Result<String, SinkError> {
    Ok(match format {
        OutputFormat::Human => format_human(result),
        OutputFormat::Json => generate_json_payload(result)?,
        OutputFormat::Csv => generate_csv(result),
        OutputFormat::Markdown => generate_markdown(result),
    })
}

/// Render an instance's result as human text, advancing it to `Rendered`
pub fn render(instance: &mut TestInstance) -> testgrid_core::Result<String> {
    instance.render_with(format_human)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use testgrid_core::{
        BoundInputs, Figure, FunctionTest, LifecycleState, Params, RawOutput, TestId,
    };

    fn instance(template: Option<&str>) -> TestInstance {
        let test = FunctionTest::new("Perf", &[], |_, _| {
            Ok(RawOutput::records(vec![
                json!({"Accuracy": 0.91, "F1": 0.5}).as_object().unwrap().clone(),
            ])
            .figure(Figure::new("roc", json!([])).with_caption("ROC curve")))
        })
        .shared();
        TestInstance::new(
            TestId::parse("validmind.composite_metric.Perf").unwrap(),
            test,
            BoundInputs::new(),
            Params::new(),
        )
        .with_output_template(template.map(str::to_string))
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert!("html".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_render_advances_state_and_applies_template() {
        let mut inst = instance(Some("<b>acc={{ Accuracy }}</b>"));
        inst.run().unwrap();
        let text = render(&mut inst).unwrap();

        assert_eq!(inst.state(), LifecycleState::Rendered);
        assert!(text.contains("Perf  (validmind.composite_metric.Perf)"));
        assert!(text.contains("roc (ROC curve)"));
        assert!(text.contains("<b>acc=0.91</b>"));
    }

    #[test]
    fn test_every_format_renders() {
        let mut inst = instance(None);
        let result = inst.run().unwrap().clone();
        for format in [
            OutputFormat::Human,
            OutputFormat::Json,
            OutputFormat::Csv,
            OutputFormat::Markdown,
        ] {
            let text = format_result(&result, format).unwrap();
            assert!(text.contains("Accuracy"), "{format:?} output: {text}");
        }
    }
}

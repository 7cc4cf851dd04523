//! Comparison Runs
//!
//! Expands an input grid and a param grid into an ordered run plan, runs the
//! lifecycle once per configuration and merges everything into one result.
//!
//! ```text
//! input grid ──expand──► [{dataset: A}, {dataset: B}]      (first key slowest)
//! param grid ──expand──► [{k: 1}, {k: 2}]
//!                              │
//!                              ▼  inputs outer × params inner
//! plan: (A,1) (A,2) (B,1) (B,2) ──run──► merge_results ──► TestResult
//! ```

use super::execution::{Engine, run_instance};
use super::merge::merge_results;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use testgrid_core::{
    BoundInputs, InputValue, Params, Record, Result, TestError, TestId, TestResult,
};
use tracing::{error, info};

/// A grid of per-key values
#[derive(Debug, Clone)]
pub enum Grid<T> {
    /// Key -> ordered values, expanded by cartesian product
    Product(IndexMap<String, Vec<T>>),
    /// Explicit list of configurations
    List(Vec<IndexMap<String, T>>),
}

/// Grid over input roles
pub type InputGrid = Grid<InputValue>;

/// Grid over parameter names
pub type ParamGrid = Grid<Value>;

impl<T> Default for Grid<T> {
    fn default() -> Self {
        Grid::Product(IndexMap::new())
    }
}

impl<T: Clone> Grid<T> {
    /// Empty product grid
    pub fn product() -> Self {
        Grid::Product(IndexMap::new())
    }

    /// Add an axis to a product grid (turns a list grid into a product grid)
    pub fn axis<I, V>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<T>,
    {
        let mut axes = match self {
            Grid::Product(axes) => axes,
            Grid::List(_) => IndexMap::new(),
        };
        axes.insert(key.into(), values.into_iter().map(Into::into).collect());
        Grid::Product(axes)
    }

    /// Keys in first-appearance order
    pub fn keys(&self) -> Vec<String> {
        match self {
            Grid::Product(axes) => axes.keys().cloned().collect(),
            Grid::List(configs) => {
                let mut keys: Vec<String> = Vec::new();
                for config in configs {
                    for key in config.keys() {
                        if !keys.contains(key) {
                            keys.push(key.clone());
                        }
                    }
                }
                keys
            }
        }
    }

    /// Product axes that have no values
    pub fn empty_axes(&self) -> Vec<String> {
        match self {
            Grid::Product(axes) => axes
                .iter()
                .filter(|(_, values)| values.is_empty())
                .map(|(key, _)| key.clone())
                .collect(),
            Grid::List(_) => Vec::new(),
        }
    }

    /// First list configuration whose keys differ from the first one's
    pub fn uneven_entry(&self) -> Option<usize> {
        match self {
            Grid::Product(_) => None,
            Grid::List(configs) => {
                let first = configs.first()?;
                configs.iter().position(|config| {
                    config.len() != first.len() || config.keys().any(|k| !first.contains_key(k))
                })
            }
        }
    }

    /// Ordered configurations; an empty grid is one empty configuration
    pub fn expand(&self) -> Vec<IndexMap<String, T>> {
        match self {
            Grid::Product(axes) => {
                let mut configs: Vec<IndexMap<String, T>> = vec![IndexMap::new()];
                for (key, values) in axes {
                    configs = configs
                        .iter()
                        .flat_map(|partial| {
                            values.iter().map(move |value| {
                                let mut next = partial.clone();
                                next.insert(key.clone(), value.clone());
                                next
                            })
                        })
                        .collect();
                }
                configs
            }
            Grid::List(configs) if configs.is_empty() => vec![IndexMap::new()],
            Grid::List(configs) => configs.clone(),
        }
    }
}

/// One entry of the run plan
#[derive(Debug, Clone, Default)]
pub struct RunConfiguration {
    /// Grid-supplied inputs
    pub inputs: IndexMap<String, InputValue>,
    /// Grid-supplied params
    pub params: IndexMap<String, Value>,
}

impl RunConfiguration {
    /// Identifying columns: input labels, then param values
    pub fn grid_record(&self) -> Record {
        let mut record = Record::new();
        for (role, value) in &self.inputs {
            record.insert(role.clone(), Value::String(value.label()));
        }
        for (name, value) in &self.params {
            record.insert(name.clone(), value.clone());
        }
        record
    }

    /// `key: value, ...` label; empty for a configuration without overrides
    pub fn label(&self) -> String {
        self.grid_record()
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{}: {}", key, s),
                other => format!("{}: {}", key, other),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether the configuration overrides nothing
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.params.is_empty()
    }
}

/// Build the run plan: every input configuration against every param configuration
pub fn plan(input_grid: Option<&InputGrid>, param_grid: Option<&ParamGrid>) -> Vec<RunConfiguration> {
    let inputs = input_grid.map(Grid::expand).unwrap_or_else(|| vec![IndexMap::new()]);
    let params = param_grid.map(Grid::expand).unwrap_or_else(|| vec![IndexMap::new()]);

    let mut configurations = Vec::with_capacity(inputs.len() * params.len());
    for input_config in &inputs {
        for param_config in &params {
            configurations.push(RunConfiguration {
                inputs: input_config.clone(),
                params: param_config.clone(),
            });
        }
    }
    configurations
}

/// Options of a comparison run
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    /// Base identifier, optionally with a `:suffix`
    pub test_id: String,
    /// Varying inputs
    pub input_grid: Option<InputGrid>,
    /// Varying params
    pub param_grid: Option<ParamGrid>,
    /// Inputs shared by every run
    pub inputs: BoundInputs,
    /// Params shared by every run
    pub params: Params,
    /// Template stored in the combined result's metadata
    pub output_template: Option<String>,
    /// Print the combined result
    pub show: bool,
}

impl ComparisonRequest {
    /// Comparison of `test_id` with no grids yet
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            input_grid: None,
            param_grid: None,
            inputs: BoundInputs::new(),
            params: Params::new(),
            output_template: None,
            show: false,
        }
    }

    /// Set the input grid
    pub fn input_grid(mut self, grid: InputGrid) -> Self {
        self.input_grid = Some(grid);
        self
    }

    /// Set the param grid
    pub fn param_grid(mut self, grid: ParamGrid) -> Self {
        self.param_grid = Some(grid);
        self
    }

    /// Bind an input shared by every run
    pub fn input(mut self, role: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.inputs.bind(role, value);
        self
    }

    /// Set a param shared by every run
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Attach an output template
    pub fn output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = Some(template.into());
        self
    }

    /// Print the combined result
    pub fn show(mut self, show: bool) -> Self {
        self.show = show;
        self
    }

    /// Reject grid keys that are also plain arguments, empty axes and list
    /// entries with differing keys
    pub fn check_conflicts(&self) -> Result<()> {
        if let Some(grid) = &self.input_grid {
            if let Some(role) = grid.keys().into_iter().find(|r| self.inputs.contains(r)) {
                return Err(TestError::ConflictingArguments(format!(
                    "input '{}' is given both in the input grid and as a plain input",
                    role
                )));
            }
            if let Some(role) = grid.empty_axes().first() {
                return Err(TestError::ConflictingArguments(format!(
                    "input grid entry '{}' has no values",
                    role
                )));
            }
            if let Some(index) = grid.uneven_entry() {
                return Err(TestError::ConflictingArguments(format!(
                    "input grid entry {} binds different roles than entry 0",
                    index
                )));
            }
        }
        if let Some(grid) = &self.param_grid {
            if let Some(name) = grid.keys().into_iter().find(|n| self.params.contains(n)) {
                return Err(TestError::ConflictingArguments(format!(
                    "param '{}' is given both in the param grid and as a plain param",
                    name
                )));
            }
            if let Some(name) = grid.empty_axes().first() {
                return Err(TestError::ConflictingArguments(format!(
                    "param grid entry '{}' has no values",
                    name
                )));
            }
            if let Some(index) = grid.uneven_entry() {
                return Err(TestError::ConflictingArguments(format!(
                    "param grid entry {} sets different params than entry 0",
                    index
                )));
            }
        }
        Ok(())
    }
}

impl Engine {
    /// Run a test once per grid configuration and merge the results
    pub fn run_comparison(&mut self, request: ComparisonRequest) -> Result<TestResult> {
        let id = TestId::parse(&request.test_id)?;
        request.check_conflicts()?;

        let test = self.loader_mut().load(&request.test_id)?;
        let template = match request.output_template.clone() {
            Some(template) => Some(template),
            None if id.is_composite() => self
                .loader()
                .composite_definition(&id)?
                .and_then(|d| d.output_template),
            None => None,
        };

        let configurations = plan(request.input_grid.as_ref(), request.param_grid.as_ref());
        info!(test_id = %id, runs = configurations.len(), "Starting comparison");

        let pb = if self.show_progress() {
            ProgressBar::new(configurations.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut runs: Vec<(RunConfiguration, TestResult)> = Vec::with_capacity(configurations.len());
        for (index, configuration) in configurations.into_iter().enumerate() {
            pb.set_message(configuration.label());

            let mut inputs = request.inputs.clone();
            for (role, value) in &configuration.inputs {
                inputs.bind(role.clone(), value.clone());
            }
            let mut params = request.params.clone();
            for (name, value) in &configuration.params {
                params.insert(name.clone(), value.clone());
            }

            match run_instance(id.clone(), test.clone(), inputs, params, template.clone(), false) {
                Ok(result) => runs.push((configuration, result)),
                Err(e) => {
                    error!(test_id = %id, run = index, config = %configuration.label(), "Comparison run failed: {}", e);
                    pb.abandon_with_message("Failed");
                    return Err(e);
                }
            }
            pb.inc(1);
        }
        pb.finish_with_message("Complete");

        let merged = merge_results(&id, &runs)?;
        if request.show {
            println!("{}", testgrid_report::format_human(&merged));
        }
        info!(test_id = %id, runs = runs.len(), "Comparison complete");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::TestLoader;
    use crate::provider::ProviderRegistry;
    use crate::store::TestStore;
    use serde_json::json;
    use testgrid_core::{Dataset, FunctionTest, RawOutput};
    use testgrid_logic::InMemoryMetadataStore;

    fn dataset(id: &str, rows: usize) -> Dataset {
        let records = (0..rows)
            .map(|i| json!({"x": i}).as_object().cloned().unwrap_or_default())
            .collect();
        Dataset::new(id, records)
    }

    fn engine() -> Engine {
        let mut engine = Engine::new(TestLoader::new(
            TestStore::new(),
            ProviderRegistry::new(),
            Box::new(InMemoryMetadataStore::new()),
        ));
        engine
            .register_custom(
                "acme.data.Rows",
                FunctionTest::new("Rows", &["dataset"], |inputs, params| {
                    let ds = inputs.dataset("dataset")?;
                    let scale: f64 = params.get_or("scale", 1.0)?;
                    let rows = ds
                        .numeric_column("x")
                        .into_iter()
                        .map(|x| json!({"scaled": x * scale}).as_object().cloned().unwrap_or_default())
                        .collect();
                    Ok(RawOutput::records(rows))
                })
                .with_params(Params::new().with("scale", 1.0))
                .shared(),
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_product_expansion_first_key_slowest() {
        let grid: ParamGrid = Grid::product().axis("a", [1, 2]).axis("b", ["x", "y"]);
        let expanded: Vec<Value> = grid
            .expand()
            .into_iter()
            .map(|c| json!([c["a"], c["b"]]))
            .collect();
        assert_eq!(
            expanded,
            vec![json!([1, "x"]), json!([1, "y"]), json!([2, "x"]), json!([2, "y"])]
        );
    }

    #[test]
    fn test_empty_grids_are_one_configuration() {
        assert_eq!(ParamGrid::product().expand().len(), 1);
        assert_eq!(ParamGrid::List(vec![]).expand().len(), 1);
        let configs = plan(None, None);
        assert_eq!(configs.len(), 1);
        assert!(configs[0].is_empty());
        assert_eq!(configs[0].label(), "");
    }

    #[test]
    fn test_uneven_list_entries() {
        let even: ParamGrid = Grid::List(vec![
            IndexMap::from([("a".to_string(), json!(1)), ("b".to_string(), json!(2))]),
            IndexMap::from([("b".to_string(), json!(3)), ("a".to_string(), json!(4))]),
        ]);
        assert_eq!(even.uneven_entry(), None);

        let uneven: ParamGrid = Grid::List(vec![
            IndexMap::from([("a".to_string(), json!(1))]),
            IndexMap::from([("a".to_string(), json!(2))]),
            IndexMap::from([("b".to_string(), json!(3))]),
        ]);
        assert_eq!(uneven.uneven_entry(), Some(2));
        assert_eq!(ParamGrid::product().axis("a", [1]).uneven_entry(), None);
    }

    #[test]
    fn test_grid_key_shadowed_by_record_column() {
        let mut engine = engine();
        engine
            .register_custom(
                "acme.data.Echo",
                FunctionTest::new("Echo", &["dataset"], |inputs, _| {
                    let ds = inputs.dataset("dataset")?;
                    Ok(RawOutput::records(vec![
                        json!({"dataset": "whatever", "n": ds.len()})
                            .as_object()
                            .cloned()
                            .unwrap_or_default(),
                    ]))
                })
                .shared(),
            )
            .unwrap();
        let result = engine.run_comparison(
            ComparisonRequest::new("acme.data.Echo")
                .input_grid(Grid::product().axis("dataset", [dataset("A", 1), dataset("B", 2)])),
        );
        assert!(matches!(result, Err(TestError::MergeShapeMismatch { .. })));
    }

    #[test]
    fn test_plan_inputs_outer_params_inner() {
        let inputs: InputGrid = Grid::product().axis("dataset", [dataset("A", 1), dataset("B", 1)]);
        let params: ParamGrid = Grid::List(vec![
            IndexMap::from([("k".to_string(), json!(1))]),
            IndexMap::from([("k".to_string(), json!(2))]),
        ]);
        let labels: Vec<String> = plan(Some(&inputs), Some(&params))
            .iter()
            .map(RunConfiguration::label)
            .collect();
        assert_eq!(
            labels,
            vec!["dataset: A, k: 1", "dataset: A, k: 2", "dataset: B, k: 1", "dataset: B, k: 2"]
        );
    }

    #[test]
    fn test_input_grid_runs_in_order_and_merges() {
        let mut engine = engine();
        let result = engine
            .run_comparison(
                ComparisonRequest::new("acme.data.Rows")
                    .input_grid(Grid::product().axis("dataset", [dataset("A", 2), dataset("B", 3)])),
            )
            .unwrap();

        assert_eq!(result.result_id().to_string(), "acme.data.Rows");
        let table = &result.tables()[0];
        assert_eq!(table.len(), 5);
        assert_eq!(table.columns(), vec!["dataset", "scaled"]);
        let firsts: Vec<&Value> = table.records.iter().map(|r| &r["dataset"]).collect();
        assert_eq!(firsts, vec!["A", "A", "B", "B", "B"]);
    }

    #[test]
    fn test_param_grid_values_lead_records() {
        let mut engine = engine();
        let result = engine
            .run_comparison(
                ComparisonRequest::new("acme.data.Rows")
                    .input("dataset", dataset("A", 1))
                    .param_grid(Grid::product().axis("scale", [json!(2.0), json!(3.0)])),
            )
            .unwrap();
        let records = &result.tables()[0].records;
        assert_eq!(records[0]["scale"], 2.0);
        assert_eq!(records[1]["scale"], 3.0);
        assert_eq!(records[1].keys().next().map(String::as_str), Some("scale"));
    }

    #[test]
    fn test_conflicts_are_rejected_before_running() {
        let mut engine = engine();
        engine
            .register_custom(
                "acme.data.Never",
                FunctionTest::new("Never", &[], |_, _| panic!("must not run")).shared(),
            )
            .unwrap();

        let both = ComparisonRequest::new("acme.data.Never")
            .input("dataset", dataset("A", 1))
            .input_grid(Grid::product().axis("dataset", [dataset("B", 1)]));
        assert!(matches!(
            engine.run_comparison(both),
            Err(TestError::ConflictingArguments(_))
        ));

        let param_both = ComparisonRequest::new("acme.data.Never")
            .param("scale", 1.0)
            .param_grid(Grid::product().axis("scale", [json!(2.0)]));
        assert!(matches!(
            engine.run_comparison(param_both),
            Err(TestError::ConflictingArguments(_))
        ));

        let uneven = ComparisonRequest::new("acme.data.Never").param_grid(Grid::List(vec![
            IndexMap::from([("scale".to_string(), json!(2.0))]),
            IndexMap::new(),
        ]));
        assert!(matches!(
            engine.run_comparison(uneven),
            Err(TestError::ConflictingArguments(_))
        ));

        let empty_axis = ComparisonRequest::new("acme.data.Never")
            .param_grid(Grid::product().axis("scale", Vec::<Value>::new()));
        assert!(matches!(
            engine.run_comparison(empty_axis),
            Err(TestError::ConflictingArguments(_))
        ));
    }

    #[test]
    fn test_failing_run_aborts_comparison() {
        let mut engine = engine();
        let result = engine.run_comparison(
            ComparisonRequest::new("acme.data.Rows")
                .param_grid(Grid::product().axis("scale", [json!(1.0)])),
        );
        assert!(matches!(result, Err(TestError::MissingRequiredInput { .. })));
    }
}

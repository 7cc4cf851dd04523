//! JSON Output

use testgrid_core::TestResult;

/// Generate the prettified boundary payload of a result.
///
/// Shape: `{id, tables: [{title, records}], figures: [{key, metadata}], passed?}`.
pub fn generate_json_payload(result: &TestResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&result.to_payload())
}

/// Generate the full result (params, inputs and metadata included)
pub fn generate_json_result(result: &TestResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

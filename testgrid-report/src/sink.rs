//! Result Sinks
//!
//! Logging is the only concurrent path in TestGrid. Each payload can be
//! shipped synchronously ([`ResultSink::log`]) or on tokio's blocking pool
//! ([`log_async`]); [`log_all`] fires every logging task before gathering.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use testgrid_core::{ResultPayload, TestError, TestInstance};
use thiserror::Error;
use tracing::debug;

/// Errors shipping results
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Logging task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Test(#[from] TestError),
}

/// Destination for result payloads
pub trait ResultSink: Send + Sync {
    /// Ship one payload
    fn log(&self, payload: &ResultPayload) -> Result<(), SinkError>;
}

/// Writes `<dir>/<result id>.json`
///
/// A sink writes each id to its own file once; later payloads with the same
/// id, including concurrent ones under [`log_all`], go to `<result id>.<n>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
    claimed: Arc<Mutex<HashMap<String, usize>>>,
}

impl JsonDirSink {
    /// Sink writing under `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            claimed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// File the first payload with this id is written to
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id)))
    }

    /// Reserve the next free file for `id`
    fn claim(&self, id: &str) -> PathBuf {
        let mut claimed = match self.claimed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let seen = claimed.entry(id.to_string()).or_insert(0);
        let path = match *seen {
            0 => self.path_for(id),
            n => self.dir.join(format!("{}.{}.json", file_stem(id), n)),
        };
        *seen += 1;
        path
    }
}

fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c == ':' || c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

impl ResultSink for JsonDirSink {
    fn log(&self, payload: &ResultPayload) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SinkError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.claim(&payload.id);
        let json = to_pretty(payload)?;
        std::fs::write(&path, json).map_err(|e| SinkError::Io {
            path: path.clone(),
            source: e,
        })?;
        debug!(id = %payload.id, path = %path.display(), "Result written");
        Ok(())
    }
}

fn to_pretty<T: Serialize>(value: &T) -> Result<String, SinkError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Keeps payloads in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    payloads: Mutex<Vec<ResultPayload>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads logged so far, in arrival order
    pub fn payloads(&self) -> Vec<ResultPayload> {
        match self.payloads.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ResultSink for MemorySink {
    fn log(&self, payload: &ResultPayload) -> Result<(), SinkError> {
        let mut guard = self
            .payloads
            .lock()
            .map_err(|e| SinkError::Task(e.to_string()))?;
        guard.push(payload.clone());
        Ok(())
    }
}

/// Ship an instance's result and mark it logged
pub fn log_instance(instance: &mut TestInstance, sink: &dyn ResultSink) -> Result<(), SinkError> {
    instance.log_with(|result| sink.log(&result.to_payload()))
}

/// Ship one payload on the blocking pool
pub async fn log_async(sink: Arc<dyn ResultSink>, payload: ResultPayload) -> Result<(), SinkError> {
    tokio::task::spawn_blocking(move || sink.log(&payload))
        .await
        .map_err(|e| SinkError::Task(e.to_string()))?
}

/// Fire all logging tasks, then gather their outcomes in input order
pub async fn log_all(
    sink: Arc<dyn ResultSink>,
    payloads: Vec<ResultPayload>,
) -> Vec<Result<(), SinkError>> {
    let handles: Vec<_> = payloads
        .into_iter()
        .map(|payload| {
            let sink = Arc::clone(&sink);
            tokio::task::spawn_blocking(move || sink.log(&payload))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SinkError::Task(e.to_string())),
        });
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use testgrid_core::{BoundInputs, FunctionTest, LifecycleState, Params, RawOutput, TestId};

    fn payload(id: &str) -> ResultPayload {
        ResultPayload {
            id: id.to_string(),
            tables: vec![],
            figures: vec![],
            passed: Some(true),
        }
    }

    #[test]
    fn test_json_dir_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirSink::new(dir.path().join("out"));
        sink.log(&payload("ns.a.Leaf:train")).unwrap();

        let path = dir.path().join("out").join("ns.a.Leaf_train.json");
        let written: ResultPayload =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, payload("ns.a.Leaf:train"));
    }

    #[test]
    fn test_log_instance_marks_logged() {
        let test = FunctionTest::new("One", &[], |_, _| Ok(RawOutput::scalar(1.0))).shared();
        let mut instance = TestInstance::new(
            TestId::parse("ns.a.One").unwrap(),
            test,
            BoundInputs::new(),
            Params::new(),
        );
        let sink = MemorySink::new();

        assert!(matches!(
            log_instance(&mut instance, &sink),
            Err(SinkError::Test(TestError::NotRun { .. }))
        ));
        instance.run().unwrap();
        log_instance(&mut instance, &sink).unwrap();
        assert_eq!(instance.state(), LifecycleState::Logged);
        assert_eq!(sink.payloads()[0].id, "ns.a.One");
    }

    #[tokio::test]
    async fn test_log_all_gathers_in_order() {
        let sink = Arc::new(MemorySink::new());
        let outcomes = log_all(
            sink.clone(),
            vec![payload("ns.a.One"), payload("ns.a.Two"), payload("ns.a.Three")],
        )
        .await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(Result::is_ok));

        let mut ids: Vec<String> = sink.payloads().into_iter().map(|p| p.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["ns.a.One", "ns.a.Three", "ns.a.Two"]);
    }

    #[tokio::test]
    async fn test_repeated_ids_get_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn ResultSink> = Arc::new(JsonDirSink::new(dir.path()));
        let payloads: Vec<ResultPayload> = (0..4)
            .map(|i| ResultPayload {
                passed: Some(i % 2 == 0),
                ..payload("ns.a.Leaf:x")
            })
            .collect();
        let outcomes = log_all(sink, payloads).await;
        assert!(outcomes.iter().all(Result::is_ok));

        let mut files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec!["ns.a.Leaf_x.1.json", "ns.a.Leaf_x.2.json", "ns.a.Leaf_x.3.json", "ns.a.Leaf_x.json"]
        );
    }

    #[tokio::test]
    async fn test_log_async_surfaces_errors() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // A regular file where the directory should be
        let sink: Arc<dyn ResultSink> = Arc::new(JsonDirSink::new(&blocker));
        assert!(log_async(sink, payload("ns.a.One")).await.is_err());
    }
}

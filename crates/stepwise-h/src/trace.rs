//! Structured interaction trace written to `trace.json` at the end of a run.

use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use stepwise_engine::driver::DriverError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TraceEvent {
    /// Milliseconds since tracing started.
    pub at_ms: u64,
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct TraceFile<'a> {
    url: &'a str,
    events: &'a [TraceEvent],
}

#[derive(Debug, Default)]
pub struct Tracer {
    started: Option<Instant>,
    events: Vec<TraceEvent>,
}

impl Tracer {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.events.clear();
    }

    pub fn is_active(&self) -> bool {
        self.started.is_some()
    }

    pub fn record<T>(&mut self, op: &str, detail: Option<String>, outcome: &Result<T, DriverError>) {
        let Some(started) = self.started else {
            return;
        };
        self.events.push(TraceEvent {
            at_ms: started.elapsed().as_millis() as u64,
            op: op.to_string(),
            detail,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Write the collected events and stop tracing.
    pub async fn finish(&mut self, path: &Path, url: &str) -> Result<(), DriverError> {
        if self.started.take().is_none() {
            return Err(DriverError::Other("trace was not started".into()));
        }
        let body = serde_json::to_string_pretty(&TraceFile {
            url,
            events: &self.events,
        })?;
        tokio::fs::write(path, body).await?;
        self.events.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_only_while_active() {
        let mut tracer = Tracer::default();
        tracer.record("click", None, &Ok::<(), DriverError>(()));
        assert!(tracer.events().is_empty());

        tracer.start();
        tracer.record("click", Some("frame:pay#3".into()), &Ok::<(), DriverError>(()));
        tracer.record::<()>("fill", None, &Err(DriverError::StaleElement(4)));
        assert_eq!(tracer.events().len(), 2);
        assert_eq!(
            tracer.events()[1].error.as_deref(),
            Some("Element 4 is stale (removed from DOM)")
        );
    }

    #[tokio::test]
    async fn test_finish_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        let mut tracer = Tracer::default();
        tracer.start();
        tracer.record("navigate", Some("https://shop.test/".into()), &Ok::<(), DriverError>(()));
        tracer.finish(&path, "https://shop.test/").await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["url"], "https://shop.test/");
        assert_eq!(raw["events"][0]["op"], "navigate");
        assert!(raw["events"][0].get("error").is_none());
        assert!(!tracer.is_active());
    }

    #[tokio::test]
    async fn test_finish_without_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracer = Tracer::default();
        assert!(tracer.finish(&dir.path().join("t.json"), "").await.is_err());
    }
}

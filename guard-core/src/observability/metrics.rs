use crate::error::Result;
use crate::security::pipeline::Verdict;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus counters for pipeline verdicts, labelled by mode and outcome.
///
/// Kept outside the pipeline: callers record the verdicts they receive.
#[derive(Clone)]
pub struct VerdictMetrics {
    registry: Arc<Registry>,
    verdicts: IntCounterVec,
}

impl VerdictMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let verdicts = IntCounterVec::new(
            Opts::new("guard_verdicts_total", "Validation verdicts by mode and outcome")
                .const_label("component", "validation_pipeline"),
            &["mode", "outcome"],
        )?;
        registry.register(Box::new(verdicts.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verdicts,
        })
    }

    pub fn record_text<T>(&self, verdict: &Verdict<T>) {
        self.record("text", verdict);
    }

    pub fn record_path<T>(&self, verdict: &Verdict<T>) {
        self.record("path", verdict);
    }

    fn record<T>(&self, mode: &str, verdict: &Verdict<T>) {
        let outcome = match verdict.rejection() {
            None => "accepted",
            Some(reason) => reason.kind(),
        };
        self.verdicts.with_label_values(&[mode, outcome]).inc();
    }

    pub fn count(&self, mode: &str, outcome: &str) -> u64 {
        self.verdicts.with_label_values(&[mode, outcome]).get()
    }

    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics output is not UTF-8: {}", e)).into())
    }
}

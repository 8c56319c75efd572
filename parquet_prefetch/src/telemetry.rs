//! Instrumentation of prefetch operations
//!
//! Every operation is described by an [`Operation`] and run through [`Telemetry::measure`], which
//! wraps it in a `tracing` span and logs how long it took. The output of the wrapped future is
//! passed through untouched.
use std::{fmt::Display, future::Future, time::Instant};

use object_store::path::Path;
use tracing::{Instrument, debug, debug_span, field};

use crate::range::ByteRange;

/// How much detail to record, operations above the configured level run uninstrumented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TelemetryLevel {
    Critical,
    #[default]
    Standard,
    Verbose,
}

/// A named operation and the attributes identifying what it operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: &'static str,
    uri: Option<String>,
    range: Option<ByteRange>,
}

impl Operation {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            uri: None,
            range: None,
        }
    }

    pub fn with_uri(mut self, path: &Path) -> Self {
        self.uri = Some(path.to_string());
        self
    }

    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(uri) = &self.uri {
            write!(f, " uri={uri}")?;
        }
        if let Some(range) = &self.range {
            write!(f, " range={range}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Telemetry {
    level: TelemetryLevel,
}

impl Telemetry {
    pub fn new(level: TelemetryLevel) -> Self {
        Self { level }
    }

    pub fn enabled(&self, level: TelemetryLevel) -> bool {
        level <= self.level
    }

    /// Run `future` as `operation`, instrumented if `level` is enabled
    pub async fn measure<F>(
        &self,
        level: TelemetryLevel,
        operation: Operation,
        future: F,
    ) -> F::Output
    where
        F: Future + Send,
    {
        if !self.enabled(level) {
            return future.await;
        }

        let span = debug_span!(
            "prefetch_operation",
            operation = operation.name(),
            uri = operation.uri(),
            range = operation.range().map(field::display),
        );
        let start = Instant::now();
        let output = future.instrument(span.clone()).await;
        span.in_scope(|| {
            debug!(elapsed_ms = start.elapsed().as_millis() as u64, "operation completed")
        });
        output
    }

    pub async fn measure_critical<F>(&self, operation: Operation, future: F) -> F::Output
    where
        F: Future + Send,
    {
        self.measure(TelemetryLevel::Critical, operation, future).await
    }

    pub async fn measure_standard<F>(&self, operation: Operation, future: F) -> F::Output
    where
        F: Future + Send,
    {
        self.measure(TelemetryLevel::Standard, operation, future).await
    }

    pub async fn measure_verbose<F>(&self, operation: Operation, future: F) -> F::Output
    where
        F: Future + Send,
    {
        self.measure(TelemetryLevel::Verbose, operation, future).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn levels_are_ordered() {
        let telemetry = Telemetry::default();
        assert!(telemetry.enabled(TelemetryLevel::Critical));
        assert!(telemetry.enabled(TelemetryLevel::Standard));
        assert!(!telemetry.enabled(TelemetryLevel::Verbose));

        let telemetry = Telemetry::new(TelemetryLevel::Critical);
        assert!(!telemetry.enabled(TelemetryLevel::Standard));
    }

    #[test]
    fn operation_display() {
        let operation = Operation::new("parquet.task.prefetch.tail")
            .with_uri(&Path::from("bucket/a.parquet"))
            .with_range(ByteRange::try_new(10, 20).unwrap());
        assert_eq!(
            "parquet.task.prefetch.tail uri=bucket/a.parquet range=[10-20]",
            operation.to_string()
        );
    }

    #[test_log::test(tokio::test)]
    async fn measure_passes_output_through() {
        for level in [
            TelemetryLevel::Critical,
            TelemetryLevel::Standard,
            TelemetryLevel::Verbose,
        ] {
            let telemetry = Telemetry::new(level);
            let ok: Result<u32, String> = telemetry
                .measure_verbose(Operation::new("ok"), async { Ok(42) })
                .await;
            assert_eq!(Ok(42), ok);

            let err: Result<u32, String> = telemetry
                .measure_critical(Operation::new("err"), async { Err("boom".to_string()) })
                .await;
            assert_eq!(Err("boom".to_string()), err);
        }
    }
}

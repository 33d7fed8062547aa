//! Pipeline entry point tying parsing, fetching and packaging together

use crate::client::IcrtClient;
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::FetchOrchestrator;
use crate::packager::ResultPackager;
use crate::spreadsheet::SpreadsheetReader;
use crate::types::{PipelineEvent, ResultBundle, RowStatus};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Input accepted by one pipeline run
#[derive(Debug, Clone, Copy)]
pub enum PipelineInput<'a> {
    /// An uploaded spreadsheet (Excel or CSV), identified by filename for
    /// format detection
    File {
        /// Original filename, used to pick the parser
        filename: &'a str,
        /// Raw file contents
        bytes: &'a [u8],
    },
    /// Pasted identifier text, separated by whitespace or commas
    Text(&'a str),
}

/// One-shot image fetch pipeline
///
/// A `Pipeline` value represents a single invocation: parse the input,
/// resolve every record against the catalog and hand back the archive plus
/// report. Nothing is persisted between invocations; duplicate calls with
/// the same input produce equivalent bundles.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    cancel: CancellationToken,
    events: broadcast::Sender<PipelineEvent>,
}

impl Pipeline {
    /// Create a pipeline after validating the configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
            events,
        })
    }

    /// Subscribe to progress events for this pipeline's runs
    ///
    /// Slow or dropped subscribers never stall the pipeline; they simply
    /// miss events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Token that cancels an in-flight run
    ///
    /// Cancellation lets records already dispatched finish and marks every
    /// undispatched record as cancelled in the report.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pipeline to completion
    pub async fn run(
        &self,
        input: PipelineInput<'_>,
        client: Arc<dyn IcrtClient>,
    ) -> Result<ResultBundle> {
        let reader = SpreadsheetReader::new(&self.config);
        let records = match input {
            PipelineInput::File { filename, bytes } => reader.parse(filename, bytes)?,
            PipelineInput::Text(text) => reader.parse_text(text)?,
        };

        let _ = self.events.send(PipelineEvent::Started {
            total_records: records.len(),
        });

        let orchestrator = FetchOrchestrator::new(
            self.config.clone(),
            self.cancel.clone(),
            self.events.clone(),
        );
        let session = orchestrator.run(records, client).await?;

        let ok = session.count(RowStatus::Ok);
        let failed = session.outcomes.len() - ok;
        let bundle = ResultPackager::new(&self.config).package(&session)?;

        let _ = self.events.send(PipelineEvent::Finished { ok, failed });
        Ok(bundle)
    }
}

/// Convenience wrapper: parse a file, run with defaults from `config`
pub async fn run_pipeline(
    config: Config,
    filename: &str,
    bytes: &[u8],
    client: Arc<dyn IcrtClient>,
) -> Result<ResultBundle> {
    Pipeline::new(config)?
        .run(PipelineInput::File { filename, bytes }, client)
        .await
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::error::Error;
    use crate::types::ImageReference;
    use async_trait::async_trait;

    struct AlwaysFound;

    #[async_trait]
    impl IcrtClient for AlwaysFound {
        async fn lookup(
            &self,
            identifier: &str,
        ) -> std::result::Result<ImageReference, ClientError> {
            Ok(ImageReference {
                identifier: identifier.to_string(),
                filename: format!("{identifier}_01.jpg"),
                url: format!("https://cdn.example/{identifier}.jpg"),
            })
        }

        async fn fetch(
            &self,
            reference: &ImageReference,
        ) -> std::result::Result<(Vec<u8>, String), ClientError> {
            Ok((
                reference.identifier.clone().into_bytes(),
                "image/jpeg".to_string(),
            ))
        }
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = Config {
            concurrency_limit: 0,
            ..Default::default()
        };
        let err = Pipeline::new(config).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn text_input_runs_end_to_end() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let bundle = pipeline
            .run(
                PipelineInput::Text("IC23022-0072-00 IC23022-0050-00"),
                Arc::new(AlwaysFound),
            )
            .await
            .unwrap();

        assert_eq!(bundle.report_rows.len(), 2);
        assert!(bundle.report_rows.iter().all(|r| r.status == RowStatus::Ok));
    }

    #[tokio::test]
    async fn events_bracket_the_run() {
        let pipeline = Pipeline::new(Config::default()).unwrap();
        let mut events = pipeline.subscribe();

        pipeline
            .run(PipelineInput::Text("IC23022-0072-00"), Arc::new(AlwaysFound))
            .await
            .unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            PipelineEvent::Started { total_records: 1 }
        ));
        let mut finished = false;
        while let Ok(event) = events.try_recv() {
            if let PipelineEvent::Finished { ok, failed } = event {
                assert_eq!(ok, 1);
                assert_eq!(failed, 0);
                finished = true;
            }
        }
        assert!(finished, "a Finished event must be emitted");
    }
}

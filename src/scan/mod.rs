//! Mailbox scan: search pages -> per-message detail -> invoice PDFs + raw `.eml`.
//!
//! Each message moves through the stages of [`Stage`] in order. Only a failed
//! search page aborts the scan; any other failure skips the smallest unit of
//! work (one message, one attachment, the raw copy, or one file write) and the
//! scan carries on.

pub mod classifier;
pub mod extractor;

use anyhow::Result;

use crate::config::ContractAliases;
use crate::domain::{MessageDetail, MessageSummary};
use crate::mail::decoders::DateZone;
use crate::mail::paginator::SearchPaginator;
use crate::mail::provider::Mailbox;
use crate::mail::query::SearchQuery;
use crate::shutdown::ShutdownSignal;
use crate::store::{Artifact, ArtifactKind, ArtifactSink};

pub use classifier::{ClassificationResult, MessageClassifier};
pub use extractor::AttachmentExtractor;

/// A message on its way through the pipeline.
struct Work {
    detail: MessageDetail,
    classification: ClassificationResult,
    artifacts: Vec<Artifact>,
}

enum Stage {
    Listing,
    Detailing(MessageSummary),
    ExtractingAttachments(Box<Work>),
    ExtractingRaw(Box<Work>),
    Emitting(Box<Work>),
}

/// Counters for one scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub listed: usize,
    pub classified: usize,
    pub skipped: usize,
    pub attachments_saved: usize,
    pub attachments_failed: usize,
    pub raw_saved: usize,
    pub raw_failed: usize,
    pub cancelled: bool,
}

/// `#00000000 <id> <date> <from>: <subject>`
pub fn progress_line(index: usize, c: &ClassificationResult) -> String {
    format!(
        "#{index:08} {} {} {}: {}",
        c.message_id, c.date, c.from, c.subject
    )
}

pub struct Scanner<'a, M: Mailbox + ?Sized> {
    mailbox: &'a M,
    classifier: MessageClassifier<'a>,
    extractor: AttachmentExtractor<'a, M>,
    sink: &'a mut dyn ArtifactSink,
    shutdown: Option<ShutdownSignal>,
    report: ScanReport,
}

impl<'a, M: Mailbox + ?Sized> Scanner<'a, M> {
    pub fn new(
        mailbox: &'a M,
        aliases: &'a ContractAliases,
        zone: DateZone,
        sink: &'a mut dyn ArtifactSink,
    ) -> Result<Self> {
        Ok(Self {
            mailbox,
            classifier: MessageClassifier::new(aliases, zone)?,
            extractor: AttachmentExtractor::new(mailbox)?,
            sink,
            shutdown: None,
            report: ScanReport::default(),
        })
    }

    /// Stop between messages once `shutdown` is triggered.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Process every message matching `query`. Fails only if a search page fails.
    pub fn run(mut self, query: &SearchQuery) -> Result<ScanReport> {
        log::info!("Searching messages matching: {query}");
        let mut pages = SearchPaginator::new(self.mailbox, query);
        let mut stage = Stage::Listing;

        loop {
            stage = match stage {
                Stage::Listing => {
                    if self.shutdown.as_ref().is_some_and(|s| s.is_triggered()) {
                        log::warn!("Scan interrupted; stopping before the next message");
                        self.report.cancelled = true;
                        break;
                    }
                    match pages.next() {
                        None => break,
                        Some(summary) => {
                            let summary = summary?;
                            self.report.listed += 1;
                            Stage::Detailing(summary)
                        }
                    }
                }
                Stage::Detailing(summary) => self.detail(summary),
                Stage::ExtractingAttachments(work) => self.extract_attachments(work),
                Stage::ExtractingRaw(work) => self.extract_raw(work),
                Stage::Emitting(work) => self.emit(work),
            };
        }

        log::debug!("{} search page(s) fetched", pages.pages_fetched());
        Ok(self.report)
    }

    fn detail(&mut self, summary: MessageSummary) -> Stage {
        let detail = match self.mailbox.get_message(&summary.id) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Unable to retrieve message {}: {e}", summary.id);
                self.report.skipped += 1;
                return Stage::Listing;
            }
        };

        let classification = match self.classifier.classify(&detail) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Skipping message {}: {e:#}", summary.id);
                self.report.skipped += 1;
                return Stage::Listing;
            }
        };
        println!("{}", progress_line(self.report.classified, &classification));
        self.report.classified += 1;

        Stage::ExtractingAttachments(Box::new(Work {
            detail,
            classification,
            artifacts: Vec::new(),
        }))
    }

    fn extract_attachments(&mut self, mut work: Box<Work>) -> Stage {
        let prefix = work.classification.prefix.as_str();
        let mut artifacts = Vec::new();
        for part in self.extractor.invoice_parts(&work.detail) {
            match self.extractor.fetch_attachment(&work.detail, part, prefix) {
                Ok(a) => artifacts.push(a),
                Err(e) => {
                    log::warn!(
                        "Unable to retrieve message {} attachment {}: {e:#}",
                        work.detail.id,
                        part.filename
                    );
                    self.report.attachments_failed += 1;
                }
            }
        }
        work.artifacts = artifacts;
        Stage::ExtractingRaw(work)
    }

    fn extract_raw(&mut self, mut work: Box<Work>) -> Stage {
        match self
            .extractor
            .fetch_raw(&work.detail, &work.classification.prefix)
        {
            Ok(a) => work.artifacts.push(a),
            Err(e) => {
                log::warn!("Unable to retrieve raw message {}: {e:#}", work.detail.id);
                self.report.raw_failed += 1;
            }
        }
        Stage::Emitting(work)
    }

    fn emit(&mut self, work: Box<Work>) -> Stage {
        for artifact in &work.artifacts {
            let saved = self.sink.emit(&work.detail.id, artifact);
            match (saved, artifact.kind) {
                (Ok(path), kind) => {
                    log::debug!("Saved {}", path.display());
                    match kind {
                        ArtifactKind::Attachment => self.report.attachments_saved += 1,
                        ArtifactKind::RawMessage => self.report.raw_saved += 1,
                    }
                }
                (Err(e), kind) => {
                    log::error!("Error saving message {}: {e:#}", work.detail.id);
                    match kind {
                        ArtifactKind::Attachment => self.report.attachments_failed += 1,
                        ArtifactKind::RawMessage => self.report.raw_failed += 1,
                    }
                }
            }
        }
        Stage::Listing
    }
}

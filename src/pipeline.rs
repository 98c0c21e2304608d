//! Fetch, classify, archive and acknowledge, one message at a time.
//!
//! A message counts as processed once its archive record exists and its
//! unread flag is cleared. A crash between those two steps leaves the
//! message unread, so the next run archives it again: delivery is
//! at-least-once and duplicate records are possible.

use crate::archive::ArchiveSink;
use crate::classifier::Classifier;
use crate::error::Error;
use crate::mail::{MailApi, MailSource, RawMessage, extract};
use crate::models::ArchiveRecord;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub listed: usize,
    pub archived: usize,
    pub failed: usize,
    /// Archived but still unread; these come back on the next run.
    pub unacknowledged: usize,
    /// Set when another run was already in progress.
    pub skipped: bool,
}

impl RunReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

pub struct Pipeline<A, S> {
    source: MailSource<A>,
    classifier: Classifier,
    sink: S,
    query: String,
    fallback_category: String,
    running: AtomicBool,
}

/// Clears the in-progress flag even if the run future is dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<A: MailApi, S: ArchiveSink> Pipeline<A, S> {
    pub fn new(
        source: MailSource<A>,
        classifier: Classifier,
        sink: S,
        query: impl Into<String>,
        fallback_category: impl Into<String>,
    ) -> Self {
        Self {
            source,
            classifier,
            sink,
            query: query.into(),
            fallback_category: fallback_category.into(),
            running: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &MailSource<A> {
        &self.source
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// One invocation: list unread messages and push each through the
    /// stages in listing order. Never fails; per-message errors are logged
    /// and the message is left unread.
    pub async fn run_once(&self) -> RunReport {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            warn!("Previous run still in progress, skipping");
            return RunReport::skipped();
        }
        let _guard = RunGuard(&self.running);

        let messages = self.source.list_unread(&self.query).await;
        let mut report = RunReport {
            listed: messages.len(),
            ..Default::default()
        };

        if messages.is_empty() {
            debug!("No unread messages");
            return report;
        }

        info!("Processing {} unread message(s)", messages.len());

        for raw in &messages {
            match self.archive(raw).await {
                Ok(record) => {
                    report.archived += 1;
                    if self.source.mark_read(&raw.id).await {
                        info!(id = %raw.id, sender = %record.sender, "Archived message");
                    } else {
                        report.unacknowledged += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!(id = %raw.id, error = %e, "Failed to process message, leaving unread");
                }
            }
        }

        info!(
            listed = report.listed,
            archived = report.archived,
            failed = report.failed,
            unacknowledged = report.unacknowledged,
            "Run finished"
        );
        report
    }

    /// Runs now and then once per `interval` until `shutdown` resolves.
    ///
    /// A shutdown requested during a run is honored once that run has
    /// finished. Returns the number of runs.
    pub async fn run_every<F>(&self, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut runs = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutting down after {} run(s)", runs);
                    break;
                }
                _ = tick.tick() => {
                    self.run_once().await;
                    runs += 1;
                }
            }
        }
        runs
    }

    /// Extract, classify and write the record. Acknowledging is left to the
    /// caller and must only follow a successful return.
    async fn archive(&self, raw: &RawMessage) -> Result<ArchiveRecord, Error> {
        let message = extract(raw);
        let classification = self.classifier.classify(&message.body).await?;
        let record = ArchiveRecord::new(&message, &classification, &self.fallback_category);
        self.sink.create_record(&record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::MemorySink;
    use crate::classifier::tests::{CannedGenerator, GatedGenerator, test_key};
    use crate::mail::tests::{FakeMailbox, unread};
    use std::sync::Arc;

    fn pipeline(mailbox: FakeMailbox, classifier: Classifier, sink: MemorySink) -> Pipeline<FakeMailbox, MemorySink> {
        Pipeline::new(MailSource::new(mailbox), classifier, sink, "is:unread", "Other")
    }

    /// No completion key: the generator is present but never called.
    fn unkeyed() -> Classifier {
        Classifier::new(CannedGenerator::replying("summary: unused"), None)
    }

    #[tokio::test]
    async fn archives_and_acknowledges_message() {
        let mailbox = FakeMailbox::with(vec![unread("m1", "a@x.com", "Help", b"My order is late")]);
        let generator =
            CannedGenerator::replying("summary: order delay\ncategory: Shipping\nsentiment: negative");
        let p = pipeline(mailbox, Classifier::new(generator.clone(), test_key()), MemorySink::default());

        let report = p.run_once().await;

        assert_eq!(
            p.sink().created(),
            vec![ArchiveRecord {
                title: "Help".to_string(),
                sender: "a@x.com".to_string(),
                summary: "order delay".to_string(),
                category: "Shipping".to_string(),
                sentiment: "negative".to_string(),
            }]
        );
        assert_eq!(p.source().api().marked(), vec!["m1".to_string()]);
        assert_eq!(report.archived, 1);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_body_without_classifier_uses_fallback() {
        let mailbox = FakeMailbox::with(vec![unread("m1", "a@x.com", "Hello", b"")]);
        let generator = CannedGenerator::replying("category: Shipping");
        let p = pipeline(mailbox, Classifier::new(generator.clone(), None), MemorySink::default());

        p.run_once().await;

        let created = p.sink().created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].category, "Other");
        assert_eq!(created[0].summary, "");
        assert_eq!(created[0].sentiment, "");
        assert_eq!(p.source().api().marked(), vec!["m1".to_string()]);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn archive_failure_skips_acknowledge_and_continues() {
        let mailbox = FakeMailbox::with(vec![
            unread("m1", "a@x.com", "Broken", b"first"),
            unread("m2", "b@x.com", "Fine", b"second"),
        ]);
        let sink = MemorySink {
            reject: vec!["Broken".to_string()],
            ..Default::default()
        };
        let p = pipeline(mailbox, unkeyed(), sink);

        let report = p.run_once().await;

        assert_eq!(p.source().api().marked(), vec!["m2".to_string()]);
        assert_eq!(p.sink().created().len(), 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.archived, 1);

        // The failed message is still unread and is retried next time.
        let retry = p.source().list_unread("is:unread").await;
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].id, "m1");
    }

    #[tokio::test]
    async fn list_failure_creates_nothing() {
        let mailbox = FakeMailbox {
            fail_list: true,
            ..FakeMailbox::with(vec![unread("m1", "a@x.com", "Help", b"body")])
        };
        let p = pipeline(mailbox, unkeyed(), MemorySink::default());

        let report = p.run_once().await;

        assert!(p.sink().created().is_empty());
        assert!(p.source().api().marked().is_empty());
        assert_eq!(report, RunReport::default());
    }

    #[tokio::test]
    async fn classifier_failure_skips_message() {
        let mailbox = FakeMailbox::with(vec![
            unread("m1", "a@x.com", "One", b"first"),
            unread("m2", "b@x.com", "Two", b"second"),
        ]);
        let p = pipeline(
            mailbox,
            Classifier::new(CannedGenerator::failing("timeout"), test_key()),
            MemorySink::default(),
        );

        let report = p.run_once().await;

        assert!(p.sink().created().is_empty());
        assert!(p.source().api().marked().is_empty());
        assert_eq!(report.failed, 2);
    }

    #[tokio::test]
    async fn acknowledge_failure_is_counted() {
        let mailbox = FakeMailbox {
            fail_modify: vec!["m1".to_string()],
            ..FakeMailbox::with(vec![unread("m1", "a@x.com", "Help", b"body")])
        };
        let p = pipeline(mailbox, unkeyed(), MemorySink::default());

        let report = p.run_once().await;

        assert_eq!(report.archived, 1);
        assert_eq!(report.unacknowledged, 1);
        // Still unread: the next run archives it again.
        let second = p.run_once().await;
        assert_eq!(second.archived, 1);
        assert_eq!(p.sink().created().len(), 2);
    }

    #[tokio::test]
    async fn second_run_finds_nothing() {
        let mailbox = FakeMailbox::with(vec![unread("m1", "a@x.com", "Help", b"body")]);
        let p = pipeline(mailbox, unkeyed(), MemorySink::default());

        p.run_once().await;
        let second = p.run_once().await;

        assert_eq!(second.listed, 0);
        assert_eq!(p.sink().created().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped() {
        let mailbox = FakeMailbox::with(vec![unread("m1", "a@x.com", "Help", b"body")]);
        let generator = Arc::new(GatedGenerator::default());
        let p = pipeline(mailbox, Classifier::new(generator.clone(), test_key()), MemorySink::default());

        let first = p.run_once();
        let second = async {
            // Starts only once the first run is parked inside the classifier.
            generator.entered.notified().await;
            let report = p.run_once().await;
            generator.release.notify_one();
            report
        };
        let (first, second) = tokio::join!(first, second);

        assert!(second.skipped);
        assert_eq!(second.listed, 0);
        assert!(!first.skipped);
        assert_eq!(first.archived, 1);
        assert_eq!(p.sink().created().len(), 1);

        // The guard is released once the first run finishes.
        assert!(!p.run_once().await.skipped);
    }

    #[tokio::test]
    async fn shutdown_during_run_stops_after_it() {
        let mailbox = FakeMailbox::with(vec![unread("m1", "a@x.com", "Help", b"body")]);
        let generator = Arc::new(GatedGenerator::default());
        let p = pipeline(mailbox, Classifier::new(generator.clone(), test_key()), MemorySink::default());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let polling = p.run_every(Duration::from_secs(3600), async {
            let _ = rx.await;
        });
        let control = async {
            generator.entered.notified().await;
            let _ = tx.send(());
            generator.release.notify_one();
        };
        let (runs, ()) = tokio::join!(polling, control);

        assert_eq!(runs, 1);
        assert_eq!(p.sink().created().len(), 1);
        assert_eq!(p.source().api().marked(), vec!["m1".to_string()]);
    }
}

//! Append engine.
//!
//! Producers hold an [`AuditLogger`] and never wait on storage: events go
//! into a bounded queue drained by a single writer task, which appends them
//! one at a time through [`AuditLogStore::append_chained`]. A failed append
//! is logged and counted, never returned to the producer.
//!
//! Events are stored exactly as submitted. Format checks on the event are
//! diagnostics only: a malformed address, verb or action name is still
//! evidence and must reach the log.

use std::sync::Arc;
use std::time::Duration;

use domain::models::AuditEvent;
use persistence::AuditLogStore;
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::config::AuditConfig;
use crate::error::ServiceError;
use crate::metrics::{record_append, record_event_dropped, record_nonconforming_event, DropReason};

enum WriterCommand {
    Append(AuditEvent),
    /// Acknowledged once every command queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

/// Cloneable producer handle for the audit log.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<WriterCommand>,
    enqueue_timeout: Duration,
}

impl AuditLogger {
    /// Queue an event, waiting at most the enqueue timeout for space.
    ///
    /// The event is dropped with a warning if the queue stays full or the
    /// writer has stopped.
    pub async fn log(&self, event: AuditEvent) {
        let action = event.action.clone();
        let send = self.tx.send(WriterCommand::Append(event));

        match tokio::time::timeout(self.enqueue_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(SendError(_))) => dropped(&action, DropReason::WriterClosed),
            Err(_) => dropped(&action, DropReason::QueueTimeout),
        }
    }

    /// Queue an event without waiting; drops it when the queue is full.
    pub fn try_log(&self, event: AuditEvent) {
        let action = event.action.clone();
        match self.tx.try_send(WriterCommand::Append(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => dropped(&action, DropReason::QueueFull),
            Err(TrySendError::Closed(_)) => dropped(&action, DropReason::WriterClosed),
        }
    }

    /// Wait until every event queued before this call has been handled.
    pub async fn flush(&self) -> Result<(), ServiceError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(ack_tx))
            .await
            .map_err(|_| ServiceError::WriterClosed)?;
        ack_rx.await.map_err(|_| ServiceError::WriterClosed)
    }
}

fn dropped(action: &str, reason: DropReason) {
    warn!(action = %action, reason = reason.as_str(), "Audit event dropped");
    record_event_dropped(reason);
}

/// Owner of the writer task. Dropping it also stops the writer once the queue drains.
pub struct AuditWriterHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl AuditWriterHandle {
    /// Stop accepting events, drain the queue and wait for the writer.
    ///
    /// The writer is aborted if draining takes longer than `timeout`;
    /// whatever is still queued at that point is lost.
    pub async fn shutdown(self, timeout: Duration) {
        // The writer may already have exited if every logger was dropped.
        let _ = self.stop_tx.send(());

        let abort = self.join.abort_handle();
        match tokio::time::timeout(timeout, self.join).await {
            Ok(Ok(())) => info!("Audit writer drained"),
            Ok(Err(e)) => error!(error = %e, "Audit writer task failed"),
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Audit writer did not drain in time, aborting"
                );
                abort.abort();
            }
        }
    }
}

/// Start the writer task for `store`.
pub fn spawn_audit_writer(
    store: Arc<dyn AuditLogStore>,
    config: &AuditConfig,
) -> (AuditLogger, AuditWriterHandle) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let (stop_tx, stop_rx) = oneshot::channel();

    let join = tokio::spawn(run_writer(store, rx, stop_rx));

    let logger = AuditLogger {
        tx,
        enqueue_timeout: config.enqueue_timeout(),
    };
    (logger, AuditWriterHandle { stop_tx, join })
}

async fn run_writer(
    store: Arc<dyn AuditLogStore>,
    mut rx: mpsc::Receiver<WriterCommand>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    info!(backend = %store.backend(), "Audit writer started");
    let mut stopping = false;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(WriterCommand::Append(event)) => append_event(store.as_ref(), event).await,
                Some(WriterCommand::Flush(ack)) => {
                    let _ = ack.send(());
                }
                None => break,
            },
            _ = &mut stop_rx, if !stopping => {
                // Buffered commands are still delivered after close().
                stopping = true;
                rx.close();
            }
        }
    }

    info!("Audit writer stopped");
}

async fn append_event(store: &dyn AuditLogStore, event: AuditEvent) {
    if let Err(errors) = event.validate() {
        warn!(
            action = %event.action,
            issues = %errors,
            "Recording nonconforming audit event as submitted"
        );
        record_nonconforming_event();
    }

    match store.append_chained(&event).await {
        Ok(entry) => {
            debug!(id = entry.id, action = %entry.action, "Audit entry appended");
            record_append("success");
        }
        Err(e) => {
            error!(action = %event.action, error = %e, "Failed to append audit entry");
            record_append("failure");
        }
    }
}

use std::thread;
use tokio::sync::{mpsc, oneshot};
use shared::types::{ExperimentRecord, ExperimentStatus};
use crate::error::{ChaosError, Result};
use crate::history::{hash, log::{HistoryLog, NewExperiment}};

/// Commands sent to the history thread
pub enum TrackerCommand {
    Record(NewExperiment, oneshot::Sender<ExperimentRecord>),
    UpdateStatus {
        id: String,
        status: ExperimentStatus,
        reply: oneshot::Sender<Result<ExperimentRecord>>,
    },
    List(oneshot::Sender<Vec<ExperimentRecord>>),
    Get(String, oneshot::Sender<Option<ExperimentRecord>>),
    Len(oneshot::Sender<usize>),
    Hash(oneshot::Sender<String>),
    Shutdown,
}

/// Handle to the experiment history.
///
/// One thread owns the log and applies commands in arrival order, so request
/// handlers recording experiments and the execution monitor reporting status
/// never race each other.
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<TrackerCommand>,
}

impl TrackerHandle {
    /// Spawn the history thread
    pub fn spawn(mut log: HistoryLog) -> Self {
        let (tx, mut rx) = mpsc::channel::<TrackerCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    TrackerCommand::Record(new, reply) => {
                        let record = log.record(new);
                        tracing::info!(
                            "Recorded experiment {} ({} on {}): {}",
                            record.id,
                            record.experiment_type,
                            record.target,
                            record.command
                        );
                        let _ = reply.send(record);
                    }
                    TrackerCommand::UpdateStatus { id, status, reply } => {
                        let result = log.update_status(&id, status);
                        match &result {
                            Ok(record) => tracing::info!("Experiment {} is now {}", record.id, record.status),
                            Err(e) => tracing::warn!("Rejected status update: {}", e),
                        }
                        let _ = reply.send(result);
                    }
                    TrackerCommand::List(reply) => {
                        let _ = reply.send(log.records().to_vec());
                    }
                    TrackerCommand::Get(id, reply) => {
                        let _ = reply.send(log.get(&id));
                    }
                    TrackerCommand::Len(reply) => {
                        let _ = reply.send(log.len());
                    }
                    // Computed on request only, the history is unbounded
                    TrackerCommand::Hash(reply) => {
                        let _ = reply.send(hash::compute_hash(log.records()));
                    }
                    TrackerCommand::Shutdown => {
                        tracing::info!("Tracker thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    async fn request<T>(&self, cmd: TrackerCommand, rx: oneshot::Receiver<T>) -> Result<T> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| ChaosError::TrackerUnavailable)?;
        rx.await.map_err(|_| ChaosError::TrackerUnavailable)
    }

    /// Append a Pending experiment and return it with its new id
    pub async fn record(&self, new: NewExperiment) -> Result<ExperimentRecord> {
        let (reply, rx) = oneshot::channel();
        self.request(TrackerCommand::Record(new, reply), rx).await
    }

    /// Apply a status reported by the execution agent
    pub async fn update_status(&self, id: String, status: ExperimentStatus) -> Result<ExperimentRecord> {
        let (reply, rx) = oneshot::channel();
        self.request(TrackerCommand::UpdateStatus { id, status, reply }, rx)
            .await?
    }

    /// Snapshot of the history in creation order
    pub async fn list(&self) -> Result<Vec<ExperimentRecord>> {
        let (reply, rx) = oneshot::channel();
        self.request(TrackerCommand::List(reply), rx).await
    }

    pub async fn get(&self, id: String) -> Result<Option<ExperimentRecord>> {
        let (reply, rx) = oneshot::channel();
        self.request(TrackerCommand::Get(id, reply), rx).await
    }

    pub async fn len(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.request(TrackerCommand::Len(reply), rx).await
    }

    /// SHA-256 digest of the ordered history
    pub async fn hash(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.request(TrackerCommand::Hash(reply), rx).await
    }

    /// Shutdown the history thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(TrackerCommand::Shutdown)
            .await
            .map_err(|_| ChaosError::TrackerUnavailable)
    }
}

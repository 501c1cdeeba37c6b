use std::collections::HashMap;
use chrono::Utc;
use shared::types::{ExperimentRecord, ExperimentStatus, ExperimentType};
use crate::error::{ChaosError, Result};

/// Fields the caller supplies when an experiment is recorded
#[derive(Debug, Clone)]
pub struct NewExperiment {
    pub description: String,
    pub command: String,
    pub experiment_type: ExperimentType,
    pub target: String,
}

/// Append-only experiment history. Insertion order is the audit order.
#[derive(Debug, Default)]
pub struct HistoryLog {
    records: Vec<ExperimentRecord>,
    index: HashMap<String, usize>,
    next_id: u64,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new Pending experiment with a fresh id
    pub fn record(&mut self, new: NewExperiment) -> ExperimentRecord {
        self.next_id += 1;
        let id = format!("exp-{:06}", self.next_id);
        let now = Utc::now();

        let record = ExperimentRecord {
            id: id.clone(),
            description: new.description,
            command: new.command,
            experiment_type: new.experiment_type,
            target: new.target,
            created_at: now,
            updated_at: now,
            status: ExperimentStatus::Pending,
        };

        self.index.insert(id, self.records.len());
        self.records.push(record.clone());
        record
    }

    /// Move an experiment along the lifecycle. The record keeps its position.
    pub fn update_status(&mut self, id: &str, status: ExperimentStatus) -> Result<ExperimentRecord> {
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| ChaosError::UnknownExperiment(id.to_string()))?;
        let record = &mut self.records[pos];

        if !record.status.can_transition_to(status) {
            return Err(ChaosError::InvalidTransition {
                id: id.to_string(),
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    pub fn get(&self, id: &str) -> Option<ExperimentRecord> {
        self.index.get(id).map(|&pos| self.records[pos].clone())
    }

    pub fn records(&self) -> &[ExperimentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::{ExperimentRecord, ExperimentStatus, ExperimentType};

/// Only audit-relevant fields; `updated_at` moves on every transition and the
/// status already captures that.
#[derive(Serialize)]
struct HashView<'a> {
    id: &'a str,
    description: &'a str,
    command: &'a str,
    experiment_type: ExperimentType,
    target: &'a str,
    status: ExperimentStatus,
}

/// SHA-256 over the history in insertion order.
/// Unlike a set digest, reordering the log changes the hash.
pub fn compute_hash(records: &[ExperimentRecord]) -> String {
    let views: Vec<HashView<'_>> = records
        .iter()
        .map(|r| HashView {
            id: &r.id,
            description: &r.description,
            command: &r.command,
            experiment_type: r.experiment_type,
            target: &r.target,
            status: r.status,
        })
        .collect();

    let json = serde_json::to_string(&views)
        .expect("Failed to serialize history for hashing");

    let hash = Sha256::digest(json.as_bytes());
    hex::encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_record(id: &str) -> ExperimentRecord {
        ExperimentRecord {
            id: id.to_string(),
            description: "cpu load".to_string(),
            command: "blade create cpu load --cpu-percent 80 --timeout 30s".to_string(),
            experiment_type: ExperimentType::Cpu,
            target: "localhost".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            status: ExperimentStatus::Pending,
        }
    }

    #[test]
    fn test_hash_depends_on_order() {
        let a = test_record("exp-000001");
        let b = test_record("exp-000002");

        let hash1 = compute_hash(&[a.clone(), b.clone()]);
        let hash2 = compute_hash(&[b, a]);

        assert_ne!(hash1, hash2, "Audit order is part of the digest");
    }

    #[test]
    fn test_hash_changes_on_status() {
        let a = test_record("exp-000001");
        let mut b = a.clone();
        b.status = ExperimentStatus::Running;

        assert_ne!(compute_hash(&[a]), compute_hash(&[b]));
    }

    #[test]
    fn test_hash_stable_across_timestamps() {
        let a = test_record("exp-000001");
        let mut b = a.clone();
        b.updated_at = Utc::now() + chrono::Duration::seconds(60);

        assert_eq!(compute_hash(&[a]), compute_hash(&[b]));
    }

    #[test]
    fn test_empty_history_hash() {
        assert_eq!(compute_hash(&[]).len(), 64);
    }
}

use std::path::Path;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::types::ServiceInfo;
use crate::config::{DiscoveryConfig, ServicesFile};
use crate::error::ChaosError;
use crate::registry::ServiceRegistry;

/// Outcome of merging one batch of discovered services
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub unchanged: usize,
    pub conflicts: usize,
}

/// Register every service not yet known. Registered entries are immutable, so a
/// re-listed service with different details is reported and left alone.
pub fn sync_services(registry: &ServiceRegistry, services: Vec<ServiceInfo>) -> SyncReport {
    let mut report = SyncReport::default();
    for info in services {
        match registry.register(info.clone()) {
            Ok(()) => report.added += 1,
            Err(ChaosError::DuplicateService(name)) => match registry.lookup(&name) {
                Ok(existing) if existing == info => report.unchanged += 1,
                _ => {
                    tracing::warn!("Ignoring changed definition for registered service {}", name);
                    report.conflicts += 1;
                }
            },
            Err(e) => {
                tracing::error!("Failed to register service {}: {}", info.name, e);
                report.conflicts += 1;
            }
        }
    }
    report
}

pub fn sync_file(registry: &ServiceRegistry, path: &Path) -> Result<SyncReport> {
    let file = ServicesFile::load(path)?;
    Ok(sync_services(registry, file.services))
}

/// Discovery loop: re-reads the services file until cancelled
pub async fn run(
    registry: ServiceRegistry,
    config: DiscoveryConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let Some(path) = config.services_file else {
        tracing::debug!("No services file configured; discovery disabled");
        return Ok(());
    };

    let mut refresh_interval = tokio::time::interval(
        std::time::Duration::from_secs(config.refresh_interval_secs)
    );

    loop {
        tokio::select! {
            _ = refresh_interval.tick() => {
                match sync_file(&registry, &path) {
                    Ok(report) if report.added > 0 || report.conflicts > 0 => {
                        tracing::info!(
                            "Discovery sync from {}: {} added, {} conflicting",
                            path.display(),
                            report.added,
                            report.conflicts
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Failed to refresh services: {:#}", e);
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Discovery shutting down");
                break;
            }
        }
    }

    Ok(())
}

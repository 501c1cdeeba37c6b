use anyhow::{Context as _, Result};
use crate::config::Config;
use crate::history::log::HistoryLog;
use crate::orchestrator::Orchestrator;
use crate::parser::InstructionParser;
use crate::registry::ServiceRegistry;
use crate::synth::{CommandSynthesizer, TemplateCatalog};
use crate::tracker::TrackerHandle;

/// Process-wide state: the service registry, the experiment history and the
/// pipeline that reads and writes them. Built once in `main` and handed to the
/// API by value; every field is a cheap shared handle.
#[derive(Clone)]
pub struct ServiceContext {
    pub registry: ServiceRegistry,
    pub tracker: TrackerHandle,
    pub orchestrator: Orchestrator,
    pub catalog: TemplateCatalog,
}

impl ServiceContext {
    /// Spawn the history thread and register the configured seed services
    pub fn start(config: &Config) -> Result<Self> {
        let registry = ServiceRegistry::new();
        for info in &config.services {
            registry
                .register(info.clone())
                .with_context(|| format!("Invalid [[services]] entry '{}'", info.name))?;
        }

        let tracker = TrackerHandle::spawn(HistoryLog::new());

        let catalog = TemplateCatalog::new(&config.synth);
        let orchestrator = Orchestrator::new(
            InstructionParser::new(registry.clone(), config.parser.clone()),
            CommandSynthesizer::new(catalog.clone()),
            tracker.clone(),
        );

        Ok(Self {
            registry,
            tracker,
            orchestrator,
            catalog,
        })
    }
}

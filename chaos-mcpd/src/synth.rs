use std::collections::BTreeSet;
use serde::Serialize;
use shared::protocol::AGENT_BINARY;
use shared::types::ExperimentType;
use crate::config::SynthConfig;
use crate::error::{ChaosError, Result};
use crate::parser::{
    check_percent, check_token, normalize_duration, ParamValue, ParsedInstruction, Target, PARAM_CPU_PERCENT,
    PARAM_INTERFACE, PARAM_MEM_PERCENT, PARAM_PATH, PARAM_PERCENT, PARAM_PROCESS, PARAM_SIZE,
};

/// How a slot value is validated and rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Integer in 1..=100
    Percent,
    /// Positive integer
    Count,
    /// Single argument token, no shell syntax
    Text,
    /// Normalized duration literal, taken from the instruction's duration
    Duration,
}

impl SlotKind {
    fn placeholder(&self) -> &'static str {
        match self {
            SlotKind::Percent | SlotKind::Count => "<int>",
            SlotKind::Text => "<string>",
            SlotKind::Duration => "<duration>",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Slot {
    pub flag: &'static str,
    pub param: &'static str,
    pub kind: SlotKind,
}

const TIMEOUT: Slot = Slot { flag: "--timeout", param: "timeout", kind: SlotKind::Duration };

/// `blade create <target> <action>` followed by flags in a fixed order
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CommandTemplate {
    pub target: &'static str,
    pub action: &'static str,
    pub slots: &'static [Slot],
}

const CPU_TEMPLATE: CommandTemplate = CommandTemplate {
    target: "cpu",
    action: "load",
    slots: &[
        Slot { flag: "--cpu-percent", param: PARAM_CPU_PERCENT, kind: SlotKind::Percent },
        TIMEOUT,
    ],
};

const MEMORY_TEMPLATE: CommandTemplate = CommandTemplate {
    target: "mem",
    action: "load",
    slots: &[
        Slot { flag: "--mem-percent", param: PARAM_MEM_PERCENT, kind: SlotKind::Percent },
        TIMEOUT,
    ],
};

const NETWORK_TEMPLATE: CommandTemplate = CommandTemplate {
    target: "network",
    action: "loss",
    slots: &[
        Slot { flag: "--percent", param: PARAM_PERCENT, kind: SlotKind::Percent },
        Slot { flag: "--interface", param: PARAM_INTERFACE, kind: SlotKind::Text },
        TIMEOUT,
    ],
};

const DISK_TEMPLATE: CommandTemplate = CommandTemplate {
    target: "disk",
    action: "fill",
    slots: &[
        Slot { flag: "--path", param: PARAM_PATH, kind: SlotKind::Text },
        Slot { flag: "--size", param: PARAM_SIZE, kind: SlotKind::Count },
        TIMEOUT,
    ],
};

const PROCESS_TEMPLATE: CommandTemplate = CommandTemplate {
    target: "process",
    action: "kill",
    slots: &[
        Slot { flag: "--process", param: PARAM_PROCESS, kind: SlotKind::Text },
        TIMEOUT,
    ],
};

impl CommandTemplate {
    pub fn for_type(experiment_type: ExperimentType) -> &'static CommandTemplate {
        match experiment_type {
            ExperimentType::Cpu => &CPU_TEMPLATE,
            ExperimentType::Memory => &MEMORY_TEMPLATE,
            ExperimentType::Network => &NETWORK_TEMPLATE,
            ExperimentType::Disk => &DISK_TEMPLATE,
            ExperimentType::Process => &PROCESS_TEMPLATE,
        }
    }

    /// Human-readable pattern, e.g. `blade create cpu load --cpu-percent <int> --timeout <duration>`
    pub fn pattern(&self) -> String {
        let mut out = format!("{} create {} {}", AGENT_BINARY, self.target, self.action);
        for slot in self.slots {
            out.push(' ');
            out.push_str(slot.flag);
            out.push(' ');
            out.push_str(slot.kind.placeholder());
        }
        out
    }
}

/// Listing entry for the templates endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub experiment_type: ExperimentType,
    pub pattern: String,
    pub slots: &'static [Slot],
}

/// Experiment types the synthesizer may emit commands for.
/// Restricting it in configuration lets operators switch off a fault kind
/// without touching the parser vocabulary.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    enabled: BTreeSet<ExperimentType>,
}

impl TemplateCatalog {
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            enabled: config.enabled_types.iter().copied().collect(),
        }
    }

    pub fn get(&self, experiment_type: ExperimentType) -> Option<&'static CommandTemplate> {
        self.enabled
            .contains(&experiment_type)
            .then(|| CommandTemplate::for_type(experiment_type))
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.enabled
            .iter()
            .map(|&experiment_type| {
                let template = CommandTemplate::for_type(experiment_type);
                CatalogEntry {
                    experiment_type,
                    pattern: template.pattern(),
                    slots: template.slots,
                }
            })
            .collect()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new(&SynthConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub command: String,
    pub explanation: String,
}

/// Turns a parsed instruction into a command line. Never executes anything.
#[derive(Debug, Clone, Default)]
pub struct CommandSynthesizer {
    catalog: TemplateCatalog,
}

impl CommandSynthesizer {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn synthesize(&self, parsed: &ParsedInstruction) -> Result<Synthesis> {
        let template = self
            .catalog
            .get(parsed.experiment_type)
            .ok_or(ChaosError::UnsupportedExperimentType(parsed.experiment_type))?;

        let mut command = format!("{} create {} {}", AGENT_BINARY, template.target, template.action);
        for slot in template.slots {
            let value = slot_value(slot, parsed)?;
            command.push(' ');
            command.push_str(slot.flag);
            command.push(' ');
            command.push_str(&value);
        }

        Ok(Synthesis {
            command,
            explanation: explain(parsed),
        })
    }
}

fn slot_value(slot: &Slot, parsed: &ParsedInstruction) -> Result<String> {
    if slot.kind == SlotKind::Duration {
        let normalized = normalize_duration(&parsed.duration)?;
        if normalized != parsed.duration {
            return Err(ChaosError::InvalidDuration(parsed.duration.clone()));
        }
        return Ok(normalized);
    }

    let value = parsed
        .parameters
        .get(slot.param)
        .ok_or_else(|| ChaosError::invalid_parameter(slot.param, "missing value"))?;

    match (slot.kind, value) {
        (SlotKind::Percent, ParamValue::Int(v)) => Ok(check_percent(slot.param, *v)?.to_string()),
        (SlotKind::Count, ParamValue::Int(v)) if *v > 0 => Ok(v.to_string()),
        (SlotKind::Count, ParamValue::Int(_)) => {
            Err(ChaosError::invalid_parameter(slot.param, "must be positive"))
        }
        (SlotKind::Text, ParamValue::Text(v)) => {
            check_token(slot.param, v)?;
            Ok(v.clone())
        }
        _ => Err(ChaosError::invalid_parameter(
            slot.param,
            format!("unexpected value '{}' for a {:?} slot", value, slot.kind),
        )),
    }
}

fn location(target: &Target) -> String {
    match target {
        Target::Service(_) => format!("on {}", target),
        Target::Process(_) | Target::Host => "on the local host".to_string(),
    }
}

fn param(parsed: &ParsedInstruction, name: &str) -> String {
    parsed
        .parameters
        .get(name)
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn explain(parsed: &ParsedInstruction) -> String {
    let at = location(&parsed.target);
    let d = &parsed.duration;
    let effect = match parsed.experiment_type {
        ExperimentType::Cpu => format!(
            "Drive CPU usage to {}% {} for {}.",
            param(parsed, PARAM_CPU_PERCENT),
            at,
            d
        ),
        ExperimentType::Memory => format!(
            "Hold memory usage at {}% {} for {}.",
            param(parsed, PARAM_MEM_PERCENT),
            at,
            d
        ),
        ExperimentType::Network => format!(
            "Drop {}% of packets on interface {} {} for {}.",
            param(parsed, PARAM_PERCENT),
            param(parsed, PARAM_INTERFACE),
            at,
            d
        ),
        ExperimentType::Disk => format!(
            "Fill {} MB under {} {} for {}.",
            param(parsed, PARAM_SIZE),
            param(parsed, PARAM_PATH),
            at,
            d
        ),
        ExperimentType::Process => format!(
            "Kill process {} {} and keep it down for {}.",
            param(parsed, PARAM_PROCESS),
            at,
            d
        ),
    };
    format!(
        "{} Nothing has been executed; review the command before handing it to the fault-injection agent.",
        effect
    )
}

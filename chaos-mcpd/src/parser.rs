use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::protocol::{
    CTX_DURATION, CTX_EXPERIMENT_TYPE, CTX_SERVICE, CTX_TARGET, CTX_TYPE, LONG_TIMEOUT_SECS,
};
use shared::types::{ExperimentType, ServiceInfo};
use crate::config::ParserConfig;
use crate::error::{ChaosError, Result};
use crate::registry::ServiceRegistry;

/// Parameter names, shared with the command templates
pub const PARAM_CPU_PERCENT: &str = "cpu-percent";
pub const PARAM_MEM_PERCENT: &str = "mem-percent";
pub const PARAM_PERCENT: &str = "percent";
pub const PARAM_INTERFACE: &str = "interface";
pub const PARAM_PATH: &str = "path";
pub const PARAM_SIZE: &str = "size";
pub const PARAM_PROCESS: &str = "process";

/// Type nouns count double against cue words, so "fill memory" is a memory experiment.
const NOUN_WEIGHT: usize = 2;
const CUE_WEIGHT: usize = 1;

struct Vocabulary {
    experiment_type: ExperimentType,
    nouns: Regex,
    cues: Option<Regex>,
}

fn vocab(experiment_type: ExperimentType, nouns: &str, cues: Option<&str>) -> Vocabulary {
    Vocabulary {
        experiment_type,
        nouns: Regex::new(nouns).expect("static vocabulary regex"),
        cues: cues.map(|c| Regex::new(c).expect("static vocabulary regex")),
    }
}

static VOCABULARY: LazyLock<Vec<Vocabulary>> = LazyLock::new(|| {
    vec![
        vocab(
            ExperimentType::Cpu,
            r"(?i)\b(?:cpu|cpus|processor)\b|处理器",
            None,
        ),
        vocab(
            ExperimentType::Memory,
            r"(?i)\b(?:memory|mem|ram)\b|内存",
            Some(r"(?i)\boom\b"),
        ),
        vocab(
            ExperimentType::Network,
            r"(?i)\b(?:network|net|nic)\b|网络|网卡",
            Some(r"(?i)\b(?:packets?|loss|interface)\b|丢包"),
        ),
        vocab(
            ExperimentType::Disk,
            r"(?i)\b(?:disk|disks|storage|filesystem)\b|磁盘|硬盘",
            Some(r"(?i)\bfill\b|填充"),
        ),
        vocab(
            ExperimentType::Process,
            r"(?i)\b(?:process|processes)\b|进程",
            Some(r"(?i)\b(?:kill|terminate)\b|杀死|停止"),
        ),
    ]
});

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Sign and fraction are captured so "-20%" and "50.5%" are rejected, not misread
    Regex::new(r"(?i)(?:^|[^\d.+-])([-+]?\d+(?:\.\d+)?)\s*(?:%|percent\b|pct\b)").expect("static regex")
});

static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:interface|iface|dev|device|nic)\s+([a-z0-9][a-z0-9._-]*)")
        .expect("static regex")
});

static NIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:eth|ens|enp|eno|wlan|bond|veth)[0-9][a-z0-9]*)\b").expect("static regex")
});

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s:=])(/[^\s,，]*)").expect("static regex")
});

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(mb|mib|gb|gib|tb|tib)\b").expect("static regex")
});

static DURATION_KW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:for|timeout|duration|lasting)[\s:=]+(?:of\s+)?([-+]?\d+(?:\.\d+)?\s*[a-z]*)")
        .expect("static regex")
});

static BARE_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^\w.+-])([-+]?\d+(?:\.\d+)?\s*(?:s|sec|secs|m|min|mins|h|hr|hrs))\b")
        .expect("static regex")
});

static DURATION_LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*([a-z]*)$").expect("static regex")
});

/// Values that end up as a single command-line argument
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._/:][A-Za-z0-9._/:-]*$").expect("static regex")
});

static SERVICE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:on|against|targeting|service)\s+(?:the\s+)?(?:service\s+)?([a-z][a-z0-9._-]*)")
        .expect("static regex")
});

static PROCESS_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:process|processes|kill|terminate)\s+(?:the\s+)?(?:process\s+)?([a-z][a-z0-9._-]*)")
        .expect("static regex")
});

/// Words that follow "on"/"kill"/... without naming anything
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "all", "it", "this", "that", "host", "localhost", "machine", "node",
    "server", "service", "process", "processes", "interface", "for", "on", "with", "and",
    "every", "load", "disk", "cpu", "memory", "network", "named", "called", "port", "ports",
    "my", "our", "its", "box", "vm", "instance", "instances", "pod", "pods", "container",
    "containers", "cluster",
];

/// What an experiment is aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A registered service, resolved through the registry
    Service(ServiceInfo),
    /// A bare process name not known to the registry
    Process(String),
    /// Nothing named; the fault applies to the agent's host
    Host,
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Service(info) => &info.name,
            Target::Process(name) => name,
            Target::Host => "localhost",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Service(info) => write!(
                f,
                "service {} ({} on {}:{})",
                info.name, info.process, info.host, info.port
            ),
            Target::Process(name) => write!(f, "process {}", name),
            Target::Host => f.write_str("the local host"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(u64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// Structured intent extracted from one instruction. Request-scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInstruction {
    pub experiment_type: ExperimentType,
    pub target: Target,
    pub parameters: BTreeMap<String, ParamValue>,
    /// Normalized literal, always `<n>s`, `<n>m` or `<n>h`
    pub duration: String,
    pub warnings: Vec<String>,
}

/// Optional hints supplied alongside an instruction.
#[derive(Debug, Clone, Default)]
pub struct Context {
    hints: Map<String, Value>,
}

impl Context {
    pub fn new(hints: Map<String, Value>) -> Self {
        Self { hints }
    }

    /// First non-empty string or number under any of `keys`
    pub fn hint(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.hints.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

impl From<Map<String, Value>> for Context {
    fn from(hints: Map<String, Value>) -> Self {
        Self::new(hints)
    }
}

/// Rule-based translator from free text to a `ParsedInstruction`.
/// Holds no per-request state; the same text and context always parse the same way
/// for a given registry.
#[derive(Clone)]
pub struct InstructionParser {
    registry: ServiceRegistry,
    defaults: ParserConfig,
}

impl InstructionParser {
    pub fn new(registry: ServiceRegistry, defaults: ParserConfig) -> Self {
        Self { registry, defaults }
    }

    pub fn parse(&self, text: &str, context: &Context) -> Result<ParsedInstruction> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChaosError::UnrecognizedIntent);
        }

        let services = self.registry.list();
        let spans = token_spans(text);
        let mentioned = find_service(text, &spans, &services);
        // Registered names are hidden from keyword matching so "disk-cache" is not a disk experiment
        let masked = mask_services(text, &spans, &services);

        let experiment_type = classify(&masked, context)?;
        let duration = self.extract_duration(&masked, context)?;
        let target = self.extract_target(experiment_type, &masked, mentioned, context)?;
        let parameters = self.extract_parameters(experiment_type, &masked, &target, context)?;

        let mut warnings = Vec::new();
        if duration_secs(&duration) > LONG_TIMEOUT_SECS {
            warnings.push(format!(
                "duration {} is longer than {}s; consider a shorter experiment",
                duration, LONG_TIMEOUT_SECS
            ));
        }
        if target == Target::Host {
            warnings.push("no target named; the fault applies to the agent's local host".to_string());
        }

        tracing::debug!(
            "Parsed instruction as {} on {} for {}",
            experiment_type,
            target.name(),
            duration
        );

        Ok(ParsedInstruction {
            experiment_type,
            target,
            parameters,
            duration,
            warnings,
        })
    }

    fn extract_duration(&self, text: &str, context: &Context) -> Result<String> {
        if let Some(caps) = DURATION_KW_RE.captures(text) {
            return normalize_duration(&caps[1]);
        }
        if let Some(caps) = BARE_DURATION_RE.captures(text) {
            return normalize_duration(&caps[1]);
        }
        if let Some(hint) = context.hint(&[CTX_DURATION, "timeout"]) {
            return normalize_duration(&hint);
        }
        normalize_duration(&self.defaults.default_duration)
    }

    fn extract_target(
        &self,
        experiment_type: ExperimentType,
        text: &str,
        mentioned: Option<ServiceInfo>,
        context: &Context,
    ) -> Result<Target> {
        if let Some(info) = mentioned {
            return Ok(Target::Service(info));
        }

        // An explicit service reference must resolve
        for caps in SERVICE_REF_RE.captures_iter(text) {
            let name = &caps[1];
            if is_stop_word(name) || NIC_RE.is_match(name) {
                continue;
            }
            return Err(ChaosError::TargetNotFound(name.to_string()));
        }

        if experiment_type == ExperimentType::Process {
            if let Some(name) = process_reference(text) {
                return Ok(Target::Process(name));
            }
        }

        if let Some(name) = context.hint(&[CTX_SERVICE]) {
            return self
                .registry
                .lookup(&name)
                .map(Target::Service)
                .map_err(|_| ChaosError::TargetNotFound(name));
        }
        if let Some(name) = context.hint(&[CTX_TARGET]) {
            if let Ok(info) = self.registry.lookup(&name) {
                return Ok(Target::Service(info));
            }
            if experiment_type == ExperimentType::Process {
                return Ok(Target::Process(name));
            }
            return Err(ChaosError::TargetNotFound(name));
        }

        Ok(Target::Host)
    }

    fn extract_parameters(
        &self,
        experiment_type: ExperimentType,
        text: &str,
        target: &Target,
        context: &Context,
    ) -> Result<BTreeMap<String, ParamValue>> {
        let mut params = BTreeMap::new();
        let d = &self.defaults;

        match experiment_type {
            ExperimentType::Cpu => {
                let percent = extract_percent(text, context, PARAM_CPU_PERCENT, d.default_cpu_percent)?;
                params.insert(PARAM_CPU_PERCENT.to_string(), ParamValue::Int(percent));
            }
            ExperimentType::Memory => {
                let percent = extract_percent(text, context, PARAM_MEM_PERCENT, d.default_mem_percent)?;
                params.insert(PARAM_MEM_PERCENT.to_string(), ParamValue::Int(percent));
            }
            ExperimentType::Network => {
                let percent = extract_percent(text, context, PARAM_PERCENT, d.default_loss_percent)?;
                let interface = INTERFACE_RE
                    .captures(text)
                    .or_else(|| NIC_RE.captures(text))
                    .map(|caps| caps[1].to_string())
                    .or_else(|| context.hint(&[PARAM_INTERFACE]))
                    .unwrap_or_else(|| d.default_interface.clone());
                params.insert(PARAM_PERCENT.to_string(), ParamValue::Int(percent));
                params.insert(PARAM_INTERFACE.to_string(), ParamValue::Text(interface));
            }
            ExperimentType::Disk => {
                let path = PATH_RE
                    .captures(text)
                    .map(|caps| caps[1].to_string())
                    .or_else(|| context.hint(&[PARAM_PATH]))
                    .unwrap_or_else(|| d.default_disk_path.clone());
                let size = extract_size(text, context, d.default_disk_size)?;
                params.insert(PARAM_PATH.to_string(), ParamValue::Text(path));
                params.insert(PARAM_SIZE.to_string(), ParamValue::Int(size));
            }
            ExperimentType::Process => {
                let process = match target {
                    Target::Process(name) => Some(name.clone()),
                    // "kill process postgres on database" names the process explicitly
                    Target::Service(info) => Some(
                        process_reference(text)
                            .filter(|name| !name.eq_ignore_ascii_case(&info.name))
                            .unwrap_or_else(|| info.process.clone()),
                    ),
                    Target::Host => context.hint(&[PARAM_PROCESS]),
                };
                let process = process.ok_or_else(|| {
                    ChaosError::invalid_parameter(PARAM_PROCESS, "no process or service named")
                })?;
                params.insert(PARAM_PROCESS.to_string(), ParamValue::Text(process));
            }
        }

        for (name, value) in &params {
            if let ParamValue::Text(text) = value {
                check_token(name, text)?;
            }
        }
        Ok(params)
    }
}

/// Normalize a duration literal such as "30s", "5 minutes" or "1h" to `<n>s|m|h`.
pub fn normalize_duration(literal: &str) -> Result<String> {
    let lower = literal.trim().to_ascii_lowercase();
    let invalid = || ChaosError::InvalidDuration(literal.trim().to_string());

    let caps = DURATION_LITERAL_RE.captures(&lower).ok_or_else(invalid)?;
    let amount: u64 = caps[1].parse().map_err(|_| invalid())?;
    if amount == 0 {
        return Err(invalid());
    }
    let unit = match &caps[2] {
        "s" | "sec" | "secs" | "second" | "seconds" => "s",
        "m" | "min" | "mins" | "minute" | "minutes" => "m",
        "h" | "hr" | "hrs" | "hour" | "hours" => "h",
        _ => return Err(invalid()),
    };
    Ok(format!("{}{}", amount, unit))
}

/// Seconds in a normalized duration; saturates rather than overflowing.
pub fn duration_secs(normalized: &str) -> u64 {
    let (amount, unit) = normalized.split_at(normalized.len().saturating_sub(1));
    let amount: u64 = amount.parse().unwrap_or(0);
    let scale = match unit {
        "m" => 60,
        "h" => 3600,
        _ => 1,
    };
    amount.saturating_mul(scale)
}

fn classify(text: &str, context: &Context) -> Result<ExperimentType> {
    let hinted = match context.hint(&[CTX_EXPERIMENT_TYPE, CTX_TYPE]) {
        Some(raw) => Some(
            raw.parse::<ExperimentType>()
                .map_err(|e| ChaosError::invalid_parameter(CTX_EXPERIMENT_TYPE, e))?,
        ),
        None => None,
    };

    let scores: Vec<(ExperimentType, usize)> = VOCABULARY
        .iter()
        .map(|v| {
            let nouns = distinct_matches(&v.nouns, text);
            let cues = v.cues.as_ref().map_or(0, |c| distinct_matches(c, text));
            (v.experiment_type, nouns * NOUN_WEIGHT + cues * CUE_WEIGHT)
        })
        .collect();

    let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    if best == 0 {
        return hinted.ok_or(ChaosError::UnrecognizedIntent);
    }

    let candidates: Vec<ExperimentType> = scores
        .iter()
        .filter(|(_, s)| *s == best)
        .map(|(t, _)| *t)
        .collect();

    match candidates.as_slice() {
        [only] => Ok(*only),
        _ => match hinted {
            Some(hint) if candidates.contains(&hint) => Ok(hint),
            _ => Err(ChaosError::AmbiguousIntent { candidates }),
        },
    }
}

fn distinct_matches(re: &Regex, text: &str) -> usize {
    re.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect::<BTreeSet<_>>()
        .len()
}

fn extract_percent(text: &str, context: &Context, name: &str, default: u64) -> Result<u64> {
    let raw = PERCENT_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
        .or_else(|| context.hint(&[name, PARAM_PERCENT]));
    let Some(raw) = raw else {
        return Ok(default);
    };
    let digits = raw.trim_end_matches('%').trim();
    let not_whole = || ChaosError::invalid_parameter(name, format!("'{}' is not a whole number", raw));
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_whole());
    }
    let value: u64 = digits.parse().map_err(|_| not_whole())?;
    check_percent(name, value)
}

pub fn check_percent(name: &str, value: u64) -> Result<u64> {
    if (1..=100).contains(&value) {
        Ok(value)
    } else {
        Err(ChaosError::invalid_parameter(
            name,
            format!("percentage must be between 1 and 100, got {}", value),
        ))
    }
}

/// A single argument token: no shell syntax, no leading dash
pub fn check_token(name: &str, value: &str) -> Result<()> {
    if TOKEN_RE.is_match(value) {
        Ok(())
    } else {
        Err(ChaosError::invalid_parameter(
            name,
            format!("'{}' may only contain letters, digits and . _ / : -", value),
        ))
    }
}

/// Disk size in megabytes
fn extract_size(text: &str, context: &Context, default: u64) -> Result<u64> {
    let size = match SIZE_RE.captures(text) {
        Some(caps) => {
            let amount: u64 = caps[1]
                .parse()
                .map_err(|_| ChaosError::invalid_parameter(PARAM_SIZE, "size is too large"))?;
            let scale: u64 = match caps[2].to_ascii_lowercase().as_str() {
                "gb" | "gib" => 1024,
                "tb" | "tib" => 1024 * 1024,
                _ => 1,
            };
            amount
                .checked_mul(scale)
                .ok_or_else(|| ChaosError::invalid_parameter(PARAM_SIZE, "size is too large"))?
        }
        None => match context.hint(&[PARAM_SIZE]) {
            Some(raw) => raw.parse().map_err(|_| {
                ChaosError::invalid_parameter(PARAM_SIZE, format!("'{}' is not a size in MB", raw))
            })?,
            None => default,
        },
    };
    if size == 0 {
        return Err(ChaosError::invalid_parameter(PARAM_SIZE, "size must be positive"));
    }
    Ok(size)
}

fn process_reference(text: &str) -> Option<String> {
    PROCESS_REF_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .find(|name| !is_stop_word(name))
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.iter().any(|s| s.eq_ignore_ascii_case(word))
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Byte spans of name-like tokens, with trailing sentence dots dropped
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (is_token_char(c), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
        .into_iter()
        .map(|(s, e)| (s, s + text[s..e].trim_end_matches('.').len()))
        .filter(|(s, e)| e > s)
        .collect()
}

fn matches_service<'a>(token: &str, services: &'a [ServiceInfo]) -> Option<&'a ServiceInfo> {
    services.iter().find(|s| s.name.eq_ignore_ascii_case(token))
}

/// First registered service named in the text
fn find_service(text: &str, spans: &[(usize, usize)], services: &[ServiceInfo]) -> Option<ServiceInfo> {
    spans
        .iter()
        .find_map(|&(s, e)| matches_service(&text[s..e], services))
        .cloned()
}

fn mask_services(text: &str, spans: &[(usize, usize)], services: &[ServiceInfo]) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut last = 0;
    for &(s, e) in spans {
        if matches_service(&text[s..e], services).is_some() {
            masked.push_str(&text[last..s]);
            masked.push_str(&" ".repeat(e - s));
            last = e;
        }
    }
    masked.push_str(&text[last..]);
    masked
}

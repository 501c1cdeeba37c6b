use shared::types::{McpRequest, McpResponse};
use crate::error::{ChaosError, Result};
use crate::history::log::NewExperiment;
use crate::parser::{Context, InstructionParser};
use crate::synth::CommandSynthesizer;
use crate::tracker::TrackerHandle;

const NOT_RECORDED: &str = "The instruction was not translated and no experiment was recorded.";

/// Drives parse -> synthesize -> record for one instruction and always answers
/// with a structured response.
#[derive(Clone)]
pub struct Orchestrator {
    parser: InstructionParser,
    synth: CommandSynthesizer,
    tracker: TrackerHandle,
}

impl Orchestrator {
    pub fn new(parser: InstructionParser, synth: CommandSynthesizer, tracker: TrackerHandle) -> Self {
        Self { parser, synth, tracker }
    }

    pub async fn handle(&self, instruction: &str, context: &Context) -> McpResponse {
        match self.try_handle(instruction, context).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Rejected instruction {:?}: {}", instruction, e);
                error_response(&e)
            }
        }
    }

    /// Each instruction is handled on its own; one failure does not stop the rest.
    pub async fn handle_batch(&self, requests: Vec<McpRequest>) -> Vec<McpResponse> {
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            let context = Context::new(request.context);
            responses.push(self.handle(&request.instruction, &context).await);
        }
        responses
    }

    async fn try_handle(&self, instruction: &str, context: &Context) -> Result<McpResponse> {
        let parsed = self.parser.parse(instruction, context)?;
        let synthesis = self.synth.synthesize(&parsed)?;

        // Only a fully synthesized command reaches the history
        let record = self
            .tracker
            .record(NewExperiment {
                description: instruction.trim().to_string(),
                command: synthesis.command.clone(),
                experiment_type: parsed.experiment_type,
                target: parsed.target.name().to_string(),
            })
            .await?;

        Ok(McpResponse {
            explanation: synthesis.explanation,
            command: synthesis.command,
            error: None,
            error_code: None,
            experiment_id: Some(record.id),
            warnings: parsed.warnings,
        })
    }
}

fn error_response(err: &ChaosError) -> McpResponse {
    McpResponse {
        explanation: NOT_RECORDED.to_string(),
        command: String::new(),
        error: Some(err.to_string()),
        error_code: Some(err.kind().to_string()),
        experiment_id: None,
        warnings: Vec::new(),
    }
}

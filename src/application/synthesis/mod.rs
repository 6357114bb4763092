pub mod extract;
pub mod prompts;

use crate::domain::artifact::{ArtifactPhase, CandidateArtifact};
use crate::domain::errors::{ExecutionFailure, LlmServiceError, SynthesisError};
use crate::domain::performance::PerformanceMetrics;
use crate::domain::ports::LanguageModelService;
use crate::domain::strategy::{ParameterSet, StrategySpec};
use crate::domain::validation::ValidationReport;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Correction context handed back to the synthesizer on a repair attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RepairFeedback {
    Findings(ValidationReport),
    Execution {
        failure: ExecutionFailure,
        output_tail: String,
    },
    Synthesis(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisRequest {
    Initial,
    /// `previous` is `None` when the last attempt produced no usable artifact
    Repair {
        previous: Option<CandidateArtifact>,
        parameters: ParameterSet,
        feedback: RepairFeedback,
    },
    Optimize {
        base: CandidateArtifact,
        previous_metrics: PerformanceMetrics,
        parameters: ParameterSet,
    },
}

impl SynthesisRequest {
    pub fn phase(&self) -> ArtifactPhase {
        match self {
            SynthesisRequest::Initial => ArtifactPhase::Synthesized,
            SynthesisRequest::Repair { .. } => ArtifactPhase::Repaired,
            SynthesisRequest::Optimize { .. } => ArtifactPhase::Optimized,
        }
    }

    /// Parameter values the produced artifact must carry
    pub fn parameters<'a>(&'a self, spec: &'a StrategySpec) -> &'a ParameterSet {
        match self {
            SynthesisRequest::Initial => &spec.parameters,
            SynthesisRequest::Repair { parameters, .. } | SynthesisRequest::Optimize { parameters, .. } => {
                parameters
            }
        }
    }
}

/// Unusable output is retried by the repair loop; service failures end the run
#[derive(Debug, Error)]
pub enum SynthesizeError {
    #[error(transparent)]
    Invalid(#[from] SynthesisError),

    #[error(transparent)]
    Service(#[from] LlmServiceError),
}

/// Asks the language model for strategy source and wraps it as a new artifact
pub struct CodeSynthesizer {
    llm: Arc<dyn LanguageModelService>,
}

impl CodeSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModelService>) -> Self {
        Self { llm }
    }

    /// `version` comes from the run so versions stay strictly increasing
    pub async fn synthesize(
        &self,
        spec: &StrategySpec,
        request: &SynthesisRequest,
        version: u32,
    ) -> Result<CandidateArtifact, SynthesizeError> {
        let phase = request.phase();
        debug!("CodeSynthesizer: requesting {} artifact v{} for {}", phase, version, spec.ticker);

        let completion = self
            .llm
            .complete(&prompts::system_prompt(spec), &prompts::user_prompt(spec, request))
            .await?;

        let source = extract::extract_source(&completion).inspect_err(|e| {
            warn!("CodeSynthesizer: completion for v{} unusable: {}", version, e);
        })?;

        info!(
            "CodeSynthesizer: {} artifact v{} ({} lines)",
            phase,
            version,
            source.lines().count()
        );
        Ok(CandidateArtifact::new(
            version,
            phase,
            source,
            request.parameters(spec).clone(),
        ))
    }
}

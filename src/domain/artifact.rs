use crate::domain::strategy::ParameterSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which request produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactPhase {
    Synthesized,
    Repaired,
    Optimized,
}

impl fmt::Display for ArtifactPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactPhase::Synthesized => write!(f, "synthesized"),
            ArtifactPhase::Repaired => write!(f, "repaired"),
            ArtifactPhase::Optimized => write!(f, "optimized"),
        }
    }
}

/// One version of generated strategy source.
///
/// Artifacts are never edited in place: a repair or an optimization step
/// always produces a new artifact with a new version allocated by the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateArtifact {
    version: u32,
    phase: ArtifactPhase,
    source: String,
    parameters: ParameterSet,
    created_at: DateTime<Utc>,
}

impl CandidateArtifact {
    pub fn new(version: u32, phase: ArtifactPhase, source: String, parameters: ParameterSet) -> Self {
        Self {
            version,
            phase,
            source,
            parameters,
            created_at: Utc::now(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn phase(&self) -> ArtifactPhase {
        self.phase
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.parameters
    }
}

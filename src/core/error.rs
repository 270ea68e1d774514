use std::fmt;

use crate::core::node::RevisionId;

/// Per-revision processing stage, for error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase
{
    Flatten,
    References,
    Structure,
}

impl fmt::Display for Phase
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        let name = match self
        {
            Phase::Flatten => "flatten",
            Phase::References => "references",
            Phase::Structure => "structure",
        };
        f.write_str(name)
    }
}

/// Failures isolated by the pipeline. None of them stop the batch: a
/// revision failure skips that revision, an export failure skips that paper.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError
{
    #[error("no root .tex file found for {revision}")]
    MissingRootFile
    {
        revision: RevisionId
    },

    #[error("{phase} phase failed for {revision}")]
    PhaseFailure
    {
        revision: RevisionId,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to export hierarchy for paper {paper}")]
    ExportFailure
    {
        paper: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError
{
    pub fn phase(
        revision: &RevisionId,
        phase: Phase,
        source: anyhow::Error,
    ) -> Self
    {
        PipelineError::PhaseFailure { revision: revision.clone(), phase, source }
    }
}

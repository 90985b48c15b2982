//! Analyzer trait: the seam to the clinical analysis pipeline.
//!
//! Everything clinical lives behind this trait: drug interaction detection,
//! contraindication matching, external regulatory or literature lookups,
//! narrative generation. The queueing core schedules analyzers, isolates
//! their filesystem state, and records their outcome; it never inspects
//! what they compute.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::request::AnalysisRequest;
use crate::workspace::Workspace;

/// Runs the clinical analysis for one job.
///
/// The caller guarantees the workspace exists, holds the request payload at
/// `input.json` next to an empty `results/` directory, and is not shared
/// with any other job. The workspace is removed after `analyze` returns,
/// so anything worth keeping must go into the returned report.
///
/// Errors (and panics) from `analyze` are captured onto the job record as
/// a failure; they never take a worker down.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Name of this analyzer, used in log fields.
    fn name(&self) -> &'static str;

    /// Produce the report payload for one validated request.
    async fn analyze(&self, workspace: &Workspace, request: &AnalysisRequest) -> Result<Value>;
}

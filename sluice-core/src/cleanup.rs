//! Best-effort cleanup rule.
//!
//! Rollback and connection release run after the real outcome of a call is
//! already known. A failure in either must never replace that outcome, so it
//! is logged and dropped here instead of being propagated. A [`Session`]
//! treats its commit the same way.
//!
//! [`Session`]: crate::session::Session

use tracing::warn;

use crate::error::SluiceResult;

/// The cleanup step that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStage {
    /// Rolling back a transaction after the wrapped call failed.
    Rollback,
    /// Closing a connection opened by a resource scope or session.
    Release,
    /// Committing at the end of a session.
    Commit,
}

impl CleanupStage {
    /// Stage name used in log events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rollback => "rollback",
            Self::Release => "release",
            Self::Commit => "commit",
        }
    }
}

/// Discard the result of a cleanup step.
///
/// Returns `true` when the step succeeded. A failure is logged at `warn` and
/// otherwise ignored.
pub fn discard_cleanup_failure(stage: CleanupStage, result: SluiceResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(
                target: "sluice::cleanup",
                stage = stage.as_str(),
                code = %err.code,
                error = %err,
                "cleanup failed; keeping original outcome"
            );
            false
        }
    }
}

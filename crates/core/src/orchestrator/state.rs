//! Per-job state machine.

use serde::Serialize;

/// Lifecycle of one conversion request.
///
/// The machine is linear with a single failure sink: every state may move to
/// the next one or to `Failed`, and `Delivered` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Identifier resolved, no file accepted yet.
    Received,
    /// At least one file passed the extension and arity checks.
    Validated,
    /// Every accepted file is on disk.
    Staged,
    /// The converter is running.
    Converting,
    /// The artifact is ready to be streamed.
    Packaged,
    /// The response layer released the artifact.
    Delivered,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Validated => "validated",
            JobState::Staged => "staged",
            JobState::Converting => "converting",
            JobState::Packaged => "packaged",
            JobState::Delivered => "delivered",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Delivered | JobState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    ///
    /// `Staged -> Validated` is allowed so that files of a merge can be
    /// validated and staged one after another.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Received, Validated)
            | (Validated, Staged)
            | (Staged, Validated)
            | (Staged, Converting)
            | (Converting, Packaged)
            | (Packaged, Delivered) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_linear() {
        let path = [
            JobState::Received,
            JobState::Validated,
            JobState::Staged,
            JobState::Converting,
            JobState::Packaged,
            JobState::Delivered,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!JobState::Received.can_transition_to(JobState::Converting));
        assert!(!JobState::Converting.can_transition_to(JobState::Delivered));
        assert!(!JobState::Packaged.can_transition_to(JobState::Converting));
    }

    #[test]
    fn test_failure_from_any_live_state() {
        for state in [
            JobState::Received,
            JobState::Validated,
            JobState::Staged,
            JobState::Converting,
            JobState::Packaged,
        ] {
            assert!(state.can_transition_to(JobState::Failed));
            assert!(!state.is_terminal());
        }
        assert!(!JobState::Delivered.can_transition_to(JobState::Failed));
        assert!(!JobState::Failed.can_transition_to(JobState::Failed));
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn test_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobState::Converting).unwrap(), "\"converting\"");
    }
}

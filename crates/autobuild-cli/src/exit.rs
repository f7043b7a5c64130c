/// Outcomes that are not failures of the tool itself but still need a
/// distinct exit code for scripts and CI.
#[derive(Debug)]
pub struct BuildExit {
    pub code: i32,
    pub message: String,
}

/// Generic rejection (`autobuild check`).
pub const DENIED: i32 = 1;
/// Spec is unapproved or its approval went stale; also a blocked hook call.
pub const REVIEW_REQUIRED: i32 = 2;
/// QA escalated to a human or ran out of iterations.
pub const QA_INCOMPLETE: i32 = 3;
/// Stopped early (Ctrl-C, session cap, stalled agent); safe to resume.
pub const PAUSED: i32 = 4;

impl BuildExit {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BuildExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exit {}: {}", self.code, self.message)
    }
}

impl std::error::Error for BuildExit {}

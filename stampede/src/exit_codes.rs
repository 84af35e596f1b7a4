#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Run completed but degradation signals were raised.
    Degraded = 10,

    /// Pre-run authentication verification failed.
    AuthFailed = 20,

    /// Invalid CLI/plan input (bad flags, malformed plan file, unknown scenario, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, task failures, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_run(degraded: bool) -> Self {
        if degraded { Self::Degraded } else { Self::Success }
    }
}

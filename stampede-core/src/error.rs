pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("`base_url` must be set")]
    MissingBaseUrl,

    #[error("invalid `base_url`: {0}")]
    InvalidBaseUrl(String),

    #[error("at least one endpoint must be configured")]
    NoEndpoints,

    #[error("no endpoint has a positive weight")]
    NoActiveEndpoints,

    #[error("duplicate endpoint name after normalization: `{0}`")]
    DuplicateEndpoint(String),

    #[error("endpoint `{endpoint}` has an invalid weight: {weight}")]
    InvalidWeight { endpoint: String, weight: f64 },

    #[error("`stages` must be a non-empty list of {{ duration, target }} with a nonzero total duration")]
    InvalidStages,

    #[error("think time range must satisfy min <= max")]
    InvalidThinkTime,

    #[error("requests-per-session range must satisfy 1 <= min <= max")]
    InvalidRequestRange,

    #[error("circuit breaker threshold must be within 0..=1")]
    InvalidBreakerThreshold,

    #[error("target endpoint not found: `{0}`")]
    UnknownEndpoint(String),

    #[error("target endpoint `{0}` is disabled (weight 0)")]
    EndpointDisabled(String),

    #[error("auth mode `{mode}` requires `{field}`")]
    MissingCredential {
        mode: &'static str,
        field: &'static str,
    },

    #[error("weighted selection requires at least one candidate")]
    EmptyCandidates,

    #[error("authentication check failed: got status {status}, expected {expected}")]
    AuthCheckFailed { status: u16, expected: u16 },

    #[error("virtual user error: {0}")]
    Vu(String),
}

impl Error {
    /// Fatal-before-load errors: the run must never start.
    #[must_use]
    pub fn is_pre_run(&self) -> bool {
        !matches!(self, Error::Join(_) | Error::Vu(_))
    }
}

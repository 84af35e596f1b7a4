use std::time::Duration;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport-level failure or timeout. Wire status 0 is reserved for this.
    Timeout,
    /// HTTP response whose status counts as a failure.
    Http(u16),
    /// The request could not even be constructed (bad URL, bad body).
    InvalidRequest,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => f.write_str("TIMEOUT"),
            FailureKind::Http(code) => write!(f, "HTTP_{code}"),
            FailureKind::InvalidRequest => f.write_str("INVALID_REQUEST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failed { kind: FailureKind, message: String },
}

/// One executed attempt, as seen by the metrics store.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// Response status; 0 means the request never produced an HTTP status.
    pub status: u16,
    pub duration: Duration,
    pub verdict: Verdict,
}

impl RequestOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.verdict, Verdict::Success)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.verdict,
            Verdict::Failed {
                kind: FailureKind::Timeout,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_display_forms() {
        assert_eq!(FailureKind::Timeout.to_string(), "TIMEOUT");
        assert_eq!(FailureKind::Http(503).to_string(), "HTTP_503");
        assert_eq!(FailureKind::InvalidRequest.to_string(), "INVALID_REQUEST");
    }

    #[test]
    fn outcome_predicates() {
        let ok = RequestOutcome {
            status: 200,
            duration: Duration::from_millis(10),
            verdict: Verdict::Success,
        };
        assert!(ok.is_success());
        assert!(!ok.is_timeout());

        let timed_out = RequestOutcome {
            status: 0,
            duration: Duration::from_millis(10),
            verdict: Verdict::Failed {
                kind: FailureKind::Timeout,
                message: "request timed out".to_string(),
            },
        };
        assert!(!timed_out.is_success());
        assert!(timed_out.is_timeout());
    }
}

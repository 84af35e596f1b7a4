use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::breaker::BreakerConfig;
use crate::error::{Error, Result};

/// Deterministic metric/name key: lowercase, every non-alphanumeric run
/// becomes a single underscore. Applied once at configuration load time.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Pause range between consecutive requests within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub const NONE: ThinkTime = ThinkTime {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    }

    fn validate(&self) -> Result<()> {
        if self.max < self.min {
            return Err(Error::InvalidThinkTime);
        }
        Ok(())
    }
}

/// One ramp step: hold `duration`, ramping linearly toward `target` VUs.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first; 0 means a single attempt.
    pub max_retries: u32,
    /// Base backoff; attempt `i` sleeps `backoff * 2^i`.
    pub backoff: Duration,
    pub description: Option<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(200),
            description: None,
        }
    }
}

/// One API call definition. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    /// Normalized metric key, derived from `name` at load time.
    pub slug: Arc<str>,
    pub method: http::Method,
    pub path: String,
    /// Relative selection weight; 0 disables weighted selection for this
    /// endpoint (it can still be targeted directly by name).
    pub weight: f64,
    pub expected_status: u16,
    pub timeout: Duration,
    pub body: Option<serde_json::Value>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub tags: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(name: &str, method: http::Method, path: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: Arc::from(normalize_name(name)),
            method,
            path: path.to_string(),
            weight: 1.0,
            expected_status: 200,
            timeout: Duration::from_secs(30),
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.weight > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub name: String,
    pub weight: f64,
    pub think_time: ThinkTime,
    pub min_requests_per_session: u32,
    pub max_requests_per_session: u32,
}

impl UserProfile {
    pub fn sample_request_count<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.max_requests_per_session <= self.min_requests_per_session {
            return self.min_requests_per_session;
        }
        rng.gen_range(self.min_requests_per_session..=self.max_requests_per_session)
    }
}

/// Named load shape. Exactly one scenario is active per run.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub stages: Vec<Stage>,
    pub retry: RetryPolicy,
    /// Think time used when no profile is selected.
    pub think_time: ThinkTime,
}

#[derive(Debug, Clone)]
pub enum AuthMode {
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        header: String,
        key: String,
    },
}

impl AuthMode {
    pub fn headers(&self) -> Vec<(String, String)> {
        use base64::Engine as _;

        match self {
            AuthMode::None => Vec::new(),
            AuthMode::Bearer { token } => {
                vec![("authorization".to_string(), format!("Bearer {token}"))]
            }
            AuthMode::Basic { username, password } => {
                let raw = format!("{username}:{password}");
                let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
                vec![("authorization".to_string(), format!("Basic {encoded}"))]
            }
            AuthMode::ApiKey { header, key } => vec![(header.clone(), key.clone())],
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            AuthMode::None => Ok(()),
            AuthMode::Bearer { token } if token.is_empty() => Err(Error::MissingCredential {
                mode: "bearer",
                field: "token",
            }),
            AuthMode::Basic { username, .. } if username.is_empty() => {
                Err(Error::MissingCredential {
                    mode: "basic",
                    field: "username",
                })
            }
            AuthMode::ApiKey { header, .. } if header.is_empty() => Err(Error::MissingCredential {
                mode: "api-key",
                field: "header",
            }),
            AuthMode::ApiKey { key, .. } if key.is_empty() => Err(Error::MissingCredential {
                mode: "api-key",
                field: "key",
            }),
            _ => Ok(()),
        }
    }
}

/// Advisory pre-run health probe.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub path: String,
    pub expected_status: u16,
    pub timeout: Duration,
}

/// Fatal pre-run authentication probe.
#[derive(Debug, Clone)]
pub struct AuthCheck {
    pub method: http::Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub expected_status: u16,
    pub timeout: Duration,
}

/// Everything a run needs, validated eagerly and immutable afterwards.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub base_url: String,
    pub endpoints: Vec<Endpoint>,
    pub profiles: Vec<UserProfile>,
    pub scenario: Scenario,
    pub breaker: BreakerConfig,
    pub auth: AuthMode,
    pub global_headers: Vec<(String, String)>,
    /// Drive traffic at this one endpoint only, bypassing weighted selection.
    pub target: Option<String>,
    /// Opt-in exact expected-status matching on top of the lenient 2xx rule.
    pub strict_status: bool,
    /// Per-request timeout override for long-running diagnostics runs.
    pub extended_timeout: Option<Duration>,
    pub health: Option<HealthCheck>,
    pub auth_check: Option<AuthCheck>,
    pub seed: Option<u64>,
}

impl RunPlan {
    pub fn active_endpoints(&self) -> Vec<&Endpoint> {
        self.endpoints.iter().filter(|e| e.is_active()).collect()
    }

    pub fn find_endpoint(&self, name: &str) -> Option<&Endpoint> {
        let slug = normalize_name(name);
        self.endpoints
            .iter()
            .find(|e| e.name == name || *e.slug == *slug)
    }

    pub fn max_vus(&self) -> u64 {
        self.scenario
            .stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::MissingBaseUrl);
        }
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|_| Error::InvalidBaseUrl(self.base_url.clone()))?;
        if parsed.scheme() != "http" {
            return Err(Error::InvalidBaseUrl(self.base_url.clone()));
        }

        if self.endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }

        let mut slugs: Vec<&str> = Vec::with_capacity(self.endpoints.len());
        for e in &self.endpoints {
            if !e.weight.is_finite() || e.weight < 0.0 {
                return Err(Error::InvalidWeight {
                    endpoint: e.name.clone(),
                    weight: e.weight,
                });
            }
            if slugs.contains(&&*e.slug) {
                return Err(Error::DuplicateEndpoint(e.slug.to_string()));
            }
            slugs.push(&e.slug);
        }

        match &self.target {
            Some(name) => {
                let endpoint = self
                    .find_endpoint(name)
                    .ok_or_else(|| Error::UnknownEndpoint(name.clone()))?;
                if !endpoint.is_active() {
                    return Err(Error::EndpointDisabled(name.clone()));
                }
            }
            None => {
                if self.active_endpoints().is_empty() {
                    return Err(Error::NoActiveEndpoints);
                }
            }
        }

        if self.scenario.stages.is_empty() {
            return Err(Error::InvalidStages);
        }
        let total: Duration = self
            .scenario
            .stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration));
        if total.is_zero() || self.max_vus() == 0 {
            return Err(Error::InvalidStages);
        }
        self.scenario.think_time.validate()?;

        for p in &self.profiles {
            if !p.weight.is_finite() || p.weight < 0.0 {
                return Err(Error::InvalidWeight {
                    endpoint: p.name.clone(),
                    weight: p.weight,
                });
            }
            p.think_time.validate()?;
            if p.min_requests_per_session == 0
                || p.max_requests_per_session < p.min_requests_per_session
            {
                return Err(Error::InvalidRequestRange);
            }
        }

        if !(0.0..=1.0).contains(&self.breaker.threshold) {
            return Err(Error::InvalidBreakerThreshold);
        }

        self.auth.validate()?;

        Ok(())
    }
}

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, bail};
use serde::Deserialize;

use stampede_core::BreakerConfig;
use stampede_core::config::{
    AuthCheck, AuthMode, Endpoint, HealthCheck, RetryPolicy, RunPlan, Scenario, Stage, ThinkTime,
    UserProfile,
};

/// Duration as a humantime string (e.g. `10s`, `250ms`), integer seconds, or
/// float seconds.
#[derive(Debug, Clone, Copy, Default)]
struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration must not be negative"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a finite, non-negative number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_weight() -> f64 {
    1.0
}

fn default_expected_status() -> u16 {
    200
}

fn default_endpoint_timeout() -> YamlDuration {
    YamlDuration(Duration::from_secs(30))
}

fn default_check_timeout() -> YamlDuration {
    YamlDuration(Duration::from_secs(5))
}

fn default_backoff() -> YamlDuration {
    YamlDuration(Duration::from_millis(200))
}

fn default_breaker_threshold() -> f64 {
    0.5
}

fn default_min_sample_size() -> u64 {
    20
}

fn default_reset_after() -> YamlDuration {
    YamlDuration(Duration::from_secs(30))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PlanYaml {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    global_headers: BTreeMap<String, String>,
    #[serde(default)]
    auth: Option<AuthYaml>,
    #[serde(default)]
    endpoints: Vec<EndpointYaml>,
    #[serde(default)]
    profiles: Vec<ProfileYaml>,
    #[serde(default)]
    scenarios: Vec<ScenarioYaml>,
    #[serde(default)]
    default_scenario: Option<String>,
    #[serde(default)]
    circuit_breaker: Option<BreakerYaml>,
    #[serde(default)]
    health_check: Option<HealthCheckYaml>,
    #[serde(default)]
    auth_check: Option<AuthCheckYaml>,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EndpointYaml {
    name: String,
    #[serde(default = "default_method")]
    method: String,
    path: String,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default = "default_expected_status")]
    expected_status: u16,
    #[serde(default = "default_endpoint_timeout")]
    timeout: YamlDuration,
    #[serde(default)]
    body: Option<serde_json::Value>,
    #[serde(default)]
    query: BTreeMap<String, String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ThinkTimeYaml {
    #[serde(default)]
    min: YamlDuration,
    #[serde(default)]
    max: YamlDuration,
}

impl ThinkTimeYaml {
    fn into_inner(self) -> ThinkTime {
        ThinkTime {
            min: self.min.into_inner(),
            max: self.max.into_inner(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RequestRangeYaml {
    min: u32,
    max: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ProfileYaml {
    name: String,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    think_time: ThinkTimeYaml,
    requests_per_session: RequestRangeYaml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StageYaml {
    target: u64,
    #[serde(default)]
    duration: YamlDuration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RetryYaml {
    #[serde(default)]
    max_retries: u32,
    #[serde(default = "default_backoff")]
    backoff: YamlDuration,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScenarioYaml {
    name: String,
    #[serde(default)]
    stages: Vec<StageYaml>,
    #[serde(default)]
    retry: Option<RetryYaml>,
    #[serde(default)]
    think_time: Option<ThinkTimeYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
enum AuthYaml {
    None,
    Bearer { token: String },
    Basic { username: String, password: String },
    ApiKey { header: String, key: String },
}

impl AuthYaml {
    fn into_inner(self) -> AuthMode {
        match self {
            AuthYaml::None => AuthMode::None,
            AuthYaml::Bearer { token } => AuthMode::Bearer { token },
            AuthYaml::Basic { username, password } => AuthMode::Basic { username, password },
            AuthYaml::ApiKey { header, key } => AuthMode::ApiKey { header, key },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BreakerYaml {
    #[serde(default = "default_breaker_threshold")]
    threshold: f64,
    #[serde(default = "default_min_sample_size")]
    min_sample_size: u64,
    #[serde(default = "default_reset_after")]
    reset_after: YamlDuration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct HealthCheckYaml {
    path: String,
    #[serde(default = "default_expected_status")]
    expected_status: u16,
    #[serde(default = "default_check_timeout")]
    timeout: YamlDuration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AuthCheckYaml {
    #[serde(default = "default_auth_check_method")]
    method: String,
    path: String,
    #[serde(default)]
    body: Option<serde_json::Value>,
    #[serde(default = "default_expected_status")]
    expected_status: u16,
    #[serde(default = "default_check_timeout")]
    timeout: YamlDuration,
}

fn default_auth_check_method() -> String {
    "POST".to_string()
}

fn parse_method(raw: &str) -> anyhow::Result<http::Method> {
    http::Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method `{raw}`"))
}

/// Load a plan file and resolve the scenario to run.
///
/// `scenario` is the CLI override; otherwise the plan's `defaultScenario`
/// wins, then its first scenario.
pub fn load_plan(path: &Path, scenario: Option<&str>) -> anyhow::Result<RunPlan> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan file {}", path.display()))?;
    let yaml: PlanYaml = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse plan file {}", path.display()))?;
    build_plan(yaml, scenario)
}

fn build_plan(yaml: PlanYaml, scenario: Option<&str>) -> anyhow::Result<RunPlan> {
    if yaml.scenarios.is_empty() {
        bail!("plan defines no scenarios");
    }

    let wanted = scenario.or(yaml.default_scenario.as_deref());
    let chosen = match wanted {
        Some(name) => yaml
            .scenarios
            .into_iter()
            .find(|s| s.name == name)
            .with_context(|| format!("unknown scenario: `{name}`"))?,
        None => match yaml.scenarios.into_iter().next() {
            Some(first) => first,
            None => bail!("plan defines no scenarios"),
        },
    };

    let mut endpoints = Vec::with_capacity(yaml.endpoints.len());
    for e in yaml.endpoints {
        let method = parse_method(&e.method)?;
        let mut endpoint = Endpoint::new(&e.name, method, &e.path);
        endpoint.weight = e.weight;
        endpoint.expected_status = e.expected_status;
        endpoint.timeout = e.timeout.into_inner();
        endpoint.body = e.body;
        endpoint.query = e.query.into_iter().collect();
        endpoint.headers = e.headers.into_iter().collect();
        endpoint.tags = e.tags.into_iter().collect();
        endpoints.push(endpoint);
    }

    let profiles = yaml
        .profiles
        .into_iter()
        .map(|p| UserProfile {
            name: p.name,
            weight: p.weight,
            think_time: p.think_time.into_inner(),
            min_requests_per_session: p.requests_per_session.min,
            max_requests_per_session: p.requests_per_session.max,
        })
        .collect();

    let retry = match chosen.retry {
        Some(r) => RetryPolicy {
            max_retries: r.max_retries,
            backoff: r.backoff.into_inner(),
            description: r.description,
        },
        None => RetryPolicy::default(),
    };

    let scenario = Scenario {
        name: chosen.name,
        stages: chosen
            .stages
            .into_iter()
            .map(|s| Stage {
                duration: s.duration.into_inner(),
                target: s.target,
            })
            .collect(),
        retry,
        think_time: chosen
            .think_time
            .map(ThinkTimeYaml::into_inner)
            .unwrap_or(ThinkTime::NONE),
    };

    let breaker = match yaml.circuit_breaker {
        Some(b) => BreakerConfig {
            threshold: b.threshold,
            min_sample_size: b.min_sample_size,
            reset_after: b.reset_after.into_inner(),
        },
        None => BreakerConfig::default(),
    };

    let health = yaml.health_check.map(|h| HealthCheck {
        path: h.path,
        expected_status: h.expected_status,
        timeout: h.timeout.into_inner(),
    });

    let auth_check = match yaml.auth_check {
        Some(a) => Some(AuthCheck {
            method: parse_method(&a.method)?,
            path: a.path,
            body: a.body,
            expected_status: a.expected_status,
            timeout: a.timeout.into_inner(),
        }),
        None => None,
    };

    Ok(RunPlan {
        base_url: yaml.base_url.unwrap_or_default(),
        endpoints,
        profiles,
        scenario,
        breaker,
        auth: yaml.auth.map(AuthYaml::into_inner).unwrap_or(AuthMode::None),
        global_headers: yaml.global_headers.into_iter().collect(),
        target: None,
        strict_status: false,
        extended_timeout: None,
        health,
        auth_check,
        seed: yaml.seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
baseUrl: http://localhost:8080
globalHeaders:
  x-env: staging
auth:
  mode: bearer
  token: secret
endpoints:
  - name: List Orders
    path: /orders
    weight: 80
  - name: Create Order
    method: post
    path: /orders
    weight: 20
    expectedStatus: 201
    timeout: 10s
    body:
      sku: A-1
      qty: 2
profiles:
  - name: reader
    weight: 3
    thinkTime:
      min: 500ms
      max: 2s
    requestsPerSession:
      min: 3
      max: 8
scenarios:
  - name: smoke
    stages:
      - duration: 30s
        target: 5
  - name: soak
    stages:
      - duration: 2m
        target: 50
      - duration: 10m
        target: 50
    retry:
      maxRetries: 2
      backoff: 250ms
    thinkTime:
      min: 1s
      max: 3s
defaultScenario: smoke
circuitBreaker:
  threshold: 0.4
  minSampleSize: 10
  resetAfter: 1m
healthCheck:
  path: /health
authCheck:
  path: /auth/verify
  expectedStatus: 204
seed: 7
"#;

    fn parse(scenario: Option<&str>) -> RunPlan {
        let yaml: PlanYaml = match serde_yaml::from_str(PLAN) {
            Ok(y) => y,
            Err(err) => panic!("{err}"),
        };
        match build_plan(yaml, scenario) {
            Ok(p) => p,
            Err(err) => panic!("{err}"),
        }
    }

    #[test]
    fn full_plan_round_trips_into_core_types() {
        let plan = parse(None);
        assert_eq!(plan.base_url, "http://localhost:8080");
        assert_eq!(plan.endpoints.len(), 2);
        assert_eq!(plan.endpoints[0].weight, 80.0);
        assert_eq!(plan.endpoints[1].method, http::Method::POST);
        assert_eq!(plan.endpoints[1].expected_status, 201);
        assert_eq!(plan.endpoints[1].timeout, Duration::from_secs(10));
        assert!(plan.endpoints[1].body.is_some());

        assert_eq!(plan.profiles.len(), 1);
        assert_eq!(plan.profiles[0].min_requests_per_session, 3);
        assert_eq!(
            plan.profiles[0].think_time.min,
            Duration::from_millis(500)
        );

        // defaultScenario wins when no CLI override is given.
        assert_eq!(plan.scenario.name, "smoke");
        assert_eq!(plan.scenario.stages.len(), 1);

        assert_eq!(plan.breaker.threshold, 0.4);
        assert_eq!(plan.breaker.min_sample_size, 10);
        assert_eq!(plan.breaker.reset_after, Duration::from_secs(60));

        assert!(matches!(plan.auth, AuthMode::Bearer { .. }));
        assert!(plan.health.is_some());
        let auth_check = match &plan.auth_check {
            Some(a) => a,
            None => panic!("auth check expected"),
        };
        assert_eq!(auth_check.method, http::Method::POST);
        assert_eq!(auth_check.expected_status, 204);
        assert_eq!(plan.seed, Some(7));

        if let Err(err) = plan.validate() {
            panic!("plan should validate: {err}");
        }
    }

    #[test]
    fn cli_scenario_override_selects_by_name() {
        let plan = parse(Some("soak"));
        assert_eq!(plan.scenario.name, "soak");
        assert_eq!(plan.scenario.stages.len(), 2);
        assert_eq!(plan.scenario.retry.max_retries, 2);
        assert_eq!(plan.scenario.retry.backoff, Duration::from_millis(250));
        assert_eq!(plan.scenario.think_time.max, Duration::from_secs(3));
    }

    #[test]
    fn unknown_scenario_is_an_error() {
        let yaml: PlanYaml = match serde_yaml::from_str(PLAN) {
            Ok(y) => y,
            Err(err) => panic!("{err}"),
        };
        let err = match build_plan(yaml, Some("missing")) {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("unknown scenario"));
    }

    #[test]
    fn empty_scenario_list_is_an_error() {
        let err = match build_plan(
            match serde_yaml::from_str("endpoints: []") {
                Ok(y) => y,
                Err(err) => panic!("{err}"),
            },
            None,
        ) {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("no scenarios"));
    }

    #[test]
    fn durations_accept_numbers_and_strings() {
        let yaml: ThinkTimeYaml = match serde_yaml::from_str("min: 2\nmax: 1500ms") {
            Ok(y) => y,
            Err(err) => panic!("{err}"),
        };
        let tt = yaml.into_inner();
        assert_eq!(tt.min, Duration::from_secs(2));
        assert_eq!(tt.max, Duration::from_millis(1500));
    }

    #[test]
    fn invalid_method_is_an_error() {
        assert!(parse_method("ge t").is_err());
        let ok = match parse_method("delete") {
            Ok(m) => m,
            Err(err) => panic!("{err}"),
        };
        assert_eq!(ok, http::Method::DELETE);
    }
}

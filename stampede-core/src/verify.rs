use bytes::Bytes;

use crate::config::RunPlan;
use crate::error::{Error, Result};
use crate::transport::{HttpRequest, Transport};

/// What the pre-run checks concluded. Health is advisory; a failed auth
/// check never gets this far because it aborts with an error instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    Skipped,
    Passed { status: u16 },
    Warning(String),
}

/// Run the configured pre-run checks once, before any load is generated.
///
/// Both checks go straight through the transport: no retry, no circuit
/// breaker, their own timeouts.
pub async fn preflight<T: Transport>(plan: &RunPlan, transport: &T) -> Result<HealthOutcome> {
    verify_auth(plan, transport).await?;
    health_check(plan, transport).await
}

async fn health_check<T: Transport>(plan: &RunPlan, transport: &T) -> Result<HealthOutcome> {
    let Some(check) = &plan.health else {
        return Ok(HealthOutcome::Skipped);
    };

    let url = join_url(plan, &check.path)?;
    let req = HttpRequest {
        method: http::Method::GET,
        url,
        headers: plan.global_headers.clone(),
        body: Bytes::new(),
        timeout: Some(check.timeout),
    };

    match transport.send(req).await {
        Ok(res) if res.status == check.expected_status => {
            Ok(HealthOutcome::Passed { status: res.status })
        }
        Ok(res) => Ok(HealthOutcome::Warning(format!(
            "health check returned status {}, expected {}",
            res.status, check.expected_status
        ))),
        Err(err) => Ok(HealthOutcome::Warning(format!("health check failed: {err}"))),
    }
}

async fn verify_auth<T: Transport>(plan: &RunPlan, transport: &T) -> Result<()> {
    let Some(check) = &plan.auth_check else {
        return Ok(());
    };

    let url = join_url(plan, &check.path)?;
    let body = match &check.body {
        Some(value) => {
            Bytes::from(serde_json::to_vec(value).map_err(|e| Error::Vu(e.to_string()))?)
        }
        None => Bytes::new(),
    };

    let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
    headers.extend(plan.auth.headers());
    headers.extend(plan.global_headers.iter().cloned());

    let req = HttpRequest {
        method: check.method.clone(),
        url,
        headers,
        body,
        timeout: Some(check.timeout),
    };

    match transport.send(req).await {
        Ok(res) if res.status == check.expected_status => Ok(()),
        Ok(res) => Err(Error::AuthCheckFailed {
            status: res.status,
            expected: check.expected_status,
        }),
        // Unreachable auth endpoint is as fatal as a rejection.
        Err(_) => Err(Error::AuthCheckFailed {
            status: 0,
            expected: check.expected_status,
        }),
    }
}

fn join_url(plan: &RunPlan, path: &str) -> Result<String> {
    url::Url::parse(&plan.base_url)
        .and_then(|base| base.join(path))
        .map(|u| u.to_string())
        .map_err(|_| Error::InvalidBaseUrl(plan.base_url.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::config::{
        AuthCheck, AuthMode, Endpoint, HealthCheck, RetryPolicy, Scenario, Stage, ThinkTime,
    };
    use crate::transport::{HttpResponse, TransportError};
    use parking_lot::Mutex;
    use std::time::Duration;

    struct OneShot {
        status: Option<u16>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl OneShot {
        fn status(status: u16) -> Self {
            Self {
                status: Some(status),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn unreachable_target() -> Self {
            Self {
                status: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for OneShot {
        async fn send(&self, req: HttpRequest) -> crate::transport::Result<HttpResponse> {
            self.seen.lock().push(req);
            match self.status {
                Some(status) => Ok(HttpResponse {
                    status,
                    body: Bytes::new(),
                }),
                None => Err(TransportError::Timeout(Duration::from_millis(1))),
            }
        }
    }

    fn plan() -> RunPlan {
        RunPlan {
            base_url: "http://localhost:8080".to_string(),
            endpoints: vec![Endpoint::new("List Orders", http::Method::GET, "/orders")],
            profiles: Vec::new(),
            scenario: Scenario {
                name: "steady".to_string(),
                stages: vec![Stage {
                    duration: Duration::from_secs(1),
                    target: 1,
                }],
                retry: RetryPolicy::default(),
                think_time: ThinkTime::NONE,
            },
            breaker: BreakerConfig::default(),
            auth: AuthMode::None,
            global_headers: Vec::new(),
            target: None,
            strict_status: false,
            extended_timeout: None,
            health: None,
            auth_check: None,
            seed: None,
        }
    }

    #[tokio::test]
    async fn no_checks_configured_is_a_clean_pass() {
        let transport = OneShot::status(200);
        let out = match preflight(&plan(), &transport).await {
            Ok(o) => o,
            Err(err) => panic!("{err}"),
        };
        assert_eq!(out, HealthOutcome::Skipped);
        assert!(transport.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn health_failure_is_a_warning_not_an_abort() {
        let mut p = plan();
        p.health = Some(HealthCheck {
            path: "/health".to_string(),
            expected_status: 200,
            timeout: Duration::from_secs(5),
        });

        let transport = OneShot::status(503);
        let out = match preflight(&p, &transport).await {
            Ok(o) => o,
            Err(err) => panic!("{err}"),
        };
        assert!(matches!(out, HealthOutcome::Warning(_)));
    }

    #[tokio::test]
    async fn unreachable_health_endpoint_is_also_a_warning() {
        let mut p = plan();
        p.health = Some(HealthCheck {
            path: "/health".to_string(),
            expected_status: 200,
            timeout: Duration::from_secs(5),
        });

        let transport = OneShot::unreachable_target();
        let out = match preflight(&p, &transport).await {
            Ok(o) => o,
            Err(err) => panic!("{err}"),
        };
        assert!(matches!(out, HealthOutcome::Warning(_)));
    }

    #[tokio::test]
    async fn auth_rejection_aborts_before_load() {
        let mut p = plan();
        p.auth = AuthMode::Bearer {
            token: "tok".to_string(),
        };
        p.auth_check = Some(AuthCheck {
            method: http::Method::POST,
            path: "/auth/verify".to_string(),
            body: None,
            expected_status: 200,
            timeout: Duration::from_secs(5),
        });

        let transport = OneShot::status(401);
        match preflight(&p, &transport).await {
            Err(Error::AuthCheckFailed {
                status: 401,
                expected: 200,
            }) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_check_sends_credentials_and_body() {
        let mut p = plan();
        p.auth = AuthMode::ApiKey {
            header: "x-api-key".to_string(),
            key: "secret".to_string(),
        };
        p.auth_check = Some(AuthCheck {
            method: http::Method::POST,
            path: "/login".to_string(),
            body: Some(serde_json::json!({ "user": "probe" })),
            expected_status: 200,
            timeout: Duration::from_secs(5),
        });

        let transport = OneShot::status(200);
        if let Err(err) = preflight(&p, &transport).await {
            panic!("{err}");
        }

        let seen = transport.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, http::Method::POST);
        assert_eq!(seen[0].url, "http://localhost:8080/login");
        assert!(
            seen[0]
                .seen_header("x-api-key")
                .is_some_and(|v| v == "secret")
        );
        assert!(!seen[0].body.is_empty());
    }

    impl HttpRequest {
        fn seen_header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }
}

use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stampede_metrics::{FailureKind, MetricsStore, RequestOutcome, Verdict};

use crate::breaker::{BreakerTrip, CircuitBreaker};
use crate::config::{Endpoint, RunPlan, UserProfile};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::select::pick_weighted;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Shared handles one virtual user needs to run sessions. Cheap to clone.
pub struct SessionContext<T> {
    pub plan: Arc<RunPlan>,
    pub transport: Arc<T>,
    pub breaker: Arc<CircuitBreaker>,
    pub metrics: Arc<MetricsStore>,
}

impl<T> Clone for SessionContext<T> {
    fn clone(&self) -> Self {
        Self {
            plan: Arc::clone(&self.plan),
            transport: Arc::clone(&self.transport),
            breaker: Arc::clone(&self.breaker),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// What one session did, rolled up for the run loop.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionOutcome {
    pub executed: u64,
    pub skipped: u64,
    pub trips: Vec<BreakerTrip>,
}

impl SessionOutcome {
    fn absorb(&mut self, exec: Execution) {
        match exec {
            Execution::Skipped => self.skipped += 1,
            Execution::Completed { trip, .. } => {
                self.executed += 1;
                if let Some(trip) = trip {
                    self.trips.push(trip);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Execution {
    /// Circuit breaker was open; nothing was sent.
    Skipped,
    Completed {
        success: bool,
        trip: Option<BreakerTrip>,
    },
}

/// One full virtual-user session: profile selection, request-count draw, then
/// a strictly sequential select/execute/think loop.
pub async fn run_session<T, R>(
    ctx: &SessionContext<T>,
    rng: &mut R,
) -> Result<SessionOutcome>
where
    T: Transport,
    R: Rng + ?Sized,
{
    let mut outcome = SessionOutcome::default();

    // Target mode bypasses selection and runs the one endpoint once.
    if let Some(name) = &ctx.plan.target {
        let endpoint = ctx
            .plan
            .find_endpoint(name)
            .ok_or_else(|| Error::UnknownEndpoint(name.clone()))?;
        outcome.absorb(execute_endpoint(ctx, endpoint).await);
        return Ok(outcome);
    }

    let active = ctx.plan.active_endpoints();
    if active.is_empty() {
        return Err(Error::NoActiveEndpoints);
    }

    let profile = select_profile(&ctx.plan.profiles, rng)?;
    let requests = match profile {
        Some(p) => p.sample_request_count(rng),
        None => active.len() as u32,
    };
    let think_time = match profile {
        Some(p) => p.think_time,
        None => ctx.plan.scenario.think_time,
    };

    for i in 0..requests {
        let endpoint = *pick_weighted(&active, |e| e.weight, rng)?;
        outcome.absorb(execute_endpoint(ctx, endpoint).await);
        // No pause after the final request of the session.
        if i + 1 < requests {
            tokio::time::sleep(think_time.sample(rng)).await;
        }
    }

    Ok(outcome)
}

fn select_profile<'a, R: Rng + ?Sized>(
    profiles: &'a [UserProfile],
    rng: &mut R,
) -> Result<Option<&'a UserProfile>> {
    let candidates: Vec<&UserProfile> = profiles.iter().filter(|p| p.weight > 0.0).collect();
    if candidates.is_empty() {
        return Ok(None);
    }
    Ok(Some(*pick_weighted(&candidates, |p| p.weight, rng)?))
}

/// Execute one endpoint as a unit: breaker gate, request build, retried
/// transport call, outcome classification, metrics and breaker update.
///
/// Nothing here propagates: a failed build or exhausted retry degrades to a
/// failed outcome so a bad endpoint can never abort the run.
pub async fn execute_endpoint<T: Transport>(
    ctx: &SessionContext<T>,
    endpoint: &Endpoint,
) -> Execution {
    if !ctx.breaker.allow() {
        ctx.metrics.endpoint(&endpoint.slug).record_skip();
        return Execution::Skipped;
    }

    let outcome = match build_request(&ctx.plan, endpoint) {
        Ok(template) => attempt_with_retry(ctx, template).await,
        Err(err) => RequestOutcome {
            status: 0,
            duration: Duration::ZERO,
            verdict: Verdict::Failed {
                kind: FailureKind::InvalidRequest,
                message: err.to_string(),
            },
        },
    };

    let success = outcome.is_success();
    ctx.metrics.endpoint(&endpoint.slug).record(&outcome);
    let trip = ctx.breaker.record(success);

    Execution::Completed { success, trip }
}

async fn attempt_with_retry<T: Transport>(
    ctx: &SessionContext<T>,
    template: RequestTemplate,
) -> RequestOutcome {
    // Only transport-level failures are retried; an HTTP error response is a
    // completed attempt and a deterministic 4xx will not improve on retry.
    let tmpl = &template;
    let transport = &ctx.transport;
    let attempted: std::result::Result<(HttpResponse, Duration), (TransportError, Duration)> =
        with_retry(&ctx.plan.scenario.retry, move |_| {
            let transport = Arc::clone(transport);
            let req = tmpl.to_request();
            async move {
                let started = Instant::now();
                match transport.send(req).await {
                    Ok(res) => Ok((res, started.elapsed())),
                    Err(err) => Err((err, started.elapsed())),
                }
            }
        })
        .await;

    match attempted {
        Ok((res, duration)) => classify(res.status, &template, duration),
        Err((err, duration)) => RequestOutcome {
            status: 0,
            duration,
            verdict: Verdict::Failed {
                kind: FailureKind::Timeout,
                message: err.to_string(),
            },
        },
    }
}

fn classify(status: u16, template: &RequestTemplate, duration: Duration) -> RequestOutcome {
    let exact = status == template.expected_status;
    let success = if template.strict_status {
        exact
    } else {
        // Exact match always counts; beyond that, any 2xx satisfies an
        // expected 2xx. A non-2xx expectation (e.g. a negative-path 404)
        // only accepts its exact status.
        exact
            || ((200..300).contains(&status) && (200..300).contains(&template.expected_status))
    };

    let verdict = if success {
        Verdict::Success
    } else {
        Verdict::Failed {
            kind: FailureKind::Http(status),
            message: format!(
                "unexpected status {status} (expected {})",
                template.expected_status
            ),
        }
    };

    RequestOutcome {
        status,
        duration,
        verdict,
    }
}

struct RequestTemplate {
    method: http::Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    timeout: Duration,
    expected_status: u16,
    strict_status: bool,
}

impl RequestTemplate {
    fn to_request(&self) -> HttpRequest {
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: Some(self.timeout),
        }
    }
}

fn build_request(plan: &RunPlan, endpoint: &Endpoint) -> Result<RequestTemplate> {
    let mut url = url::Url::parse(&plan.base_url)
        .and_then(|base| base.join(&endpoint.path))
        .map_err(|_| Error::InvalidBaseUrl(plan.base_url.clone()))?;
    if !endpoint.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &endpoint.query {
            pairs.append_pair(k, v);
        }
    }

    let takes_body = endpoint.method == http::Method::POST || endpoint.method == http::Method::PUT;
    let body = match &endpoint.body {
        Some(value) if takes_body => {
            Bytes::from(serde_json::to_vec(value).map_err(|e| Error::Vu(e.to_string()))?)
        }
        _ => Bytes::new(),
    };

    // Later layers win on key collision.
    let mut headers: Vec<(String, String)> = Vec::new();
    layer_header(
        &mut headers,
        "content-type".to_string(),
        "application/json".to_string(),
    );
    for (k, v) in plan.auth.headers() {
        layer_header(&mut headers, k, v);
    }
    for (k, v) in &plan.global_headers {
        layer_header(&mut headers, k.clone(), v.clone());
    }
    for (k, v) in &endpoint.headers {
        layer_header(&mut headers, k.clone(), v.clone());
    }

    Ok(RequestTemplate {
        method: endpoint.method.clone(),
        url: url.to_string(),
        headers,
        body,
        timeout: plan.extended_timeout.unwrap_or(endpoint.timeout),
        expected_status: endpoint.expected_status,
        strict_status: plan.strict_status,
    })
}

fn layer_header(headers: &mut Vec<(String, String)>, name: String, value: String) {
    match headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case(&name))
    {
        Some(slot) => slot.1 = value,
        None => headers.push((name, value)),
    }
}

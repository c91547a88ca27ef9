//! Concurrent fan-out of a match query across outbound partners.
//!
//! Each partner call runs as its own task behind a fixed-size worker pool
//! (excess work queues for a permit) with its own cancellable timeout, so a
//! slow or failing partner cannot block or poison collection from the
//! others. On top of the per-call timeouts there is an overall batch
//! deadline; partners still outstanding when it expires are reported as
//! failures rather than stalling the caller. Failed calls are not retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::API_MIME_TYPE;
use crate::trust::{Direction, PartnerServer, TrustError, TrustRegistry};

/// Path of the match endpoint below every partner's base URL
pub const MATCH_ENDPOINT: &str = "/match";

/// Header carrying the shared-secret credential
pub const AUTH_HEADER: &str = "X-Auth-Token";

/// Why one partner produced no result. Always scoped to that partner; the
/// batch itself never fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartnerFailure {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response status: {0}")]
    Status(u16),

    #[error("invalid response body: {0}")]
    InvalidBody(String),

    #[error("fan-out deadline exceeded before the call completed")]
    DeadlineExceeded,
}

/// Fan-out tuning knobs
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Default timeout for one partner call
    pub per_call_timeout: Duration,

    /// Overall deadline for the whole batch, independent of worker
    /// availability
    pub batch_deadline: Duration,

    /// Worker pool size; sized independently of the partner count
    pub pool_size: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            per_call_timeout: Duration::from_secs(10),
            batch_deadline: Duration::from_secs(30),
            pool_size: 8,
        }
    }
}

/// The result of one dispatched partner call
#[derive(Debug, Clone)]
pub struct PartnerOutcome {
    pub server_id: String,
    pub server_label: String,
    pub outcome: Result<Value, PartnerFailure>,
}

/// Fans match queries out to authorized outbound partners.
#[derive(Clone)]
pub struct FederationProxy {
    registry: TrustRegistry,
    client: reqwest::Client,
    config: FanoutConfig,
    pool: Arc<Semaphore>,
}

impl FederationProxy {
    pub fn new(registry: TrustRegistry, client: reqwest::Client, config: FanoutConfig) -> Self {
        let pool = Arc::new(Semaphore::new(config.pool_size));
        Self {
            registry,
            client,
            config,
            pool,
        }
    }

    /// Dispatch `payload` to every outbound partner (restricted to
    /// `targets` when given) and collect one outcome per partner.
    ///
    /// # Errors
    ///
    /// Returns `TrustError` only if the partner list cannot be read;
    /// individual call failures are captured per partner.
    pub async fn fanout(
        &self,
        payload: &Value,
        per_call_timeout: Option<Duration>,
        targets: Option<&[String]>,
    ) -> Result<Vec<PartnerOutcome>, TrustError> {
        let mut partners = self.registry.list(Direction::Out)?;
        if let Some(targets) = targets {
            partners.retain(|p| targets.iter().any(|t| t == &p.server_id));
        }

        let timeout = per_call_timeout.unwrap_or(self.config.per_call_timeout);
        Ok(self.dispatch(partners, payload, timeout).await)
    }

    /// Dispatch `payload` to an explicit partner list.
    pub async fn dispatch(
        &self,
        partners: Vec<PartnerServer>,
        payload: &Value,
        per_call_timeout: Duration,
    ) -> Vec<PartnerOutcome> {
        let roster: Vec<(String, String)> = partners
            .iter()
            .map(|p| (p.server_id.clone(), p.server_label.clone()))
            .collect();

        let deadline = Instant::now() + self.config.batch_deadline;
        let mut tasks = JoinSet::new();
        for partner in partners {
            let client = self.client.clone();
            let pool = Arc::clone(&self.pool);
            let payload = payload.clone();
            tasks.spawn(async move {
                let outcome = match pool.acquire_owned().await {
                    Ok(_permit) => {
                        call_partner(&client, &partner, &payload, per_call_timeout).await
                    }
                    Err(_) => Err(PartnerFailure::Network("worker pool closed".to_string())),
                };
                (partner, outcome)
            });
        }

        let mut outcomes: Vec<PartnerOutcome> = Vec::with_capacity(roster.len());
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((partner, outcome)))) => {
                    if let Err(failure) = &outcome {
                        warn!("Partner {:?} failed: {failure}", partner.server_id);
                    }
                    outcomes.push(PartnerOutcome {
                        server_id: partner.server_id,
                        server_label: partner.server_label,
                        outcome,
                    });
                }
                Ok(Some(Err(join_error))) => warn!("Fan-out task failed: {join_error}"),
                Ok(None) => break,
                Err(_) => {
                    warn!("Fan-out batch deadline exceeded; aborting outstanding calls");
                    tasks.abort_all();
                    break;
                }
            }
        }

        // Partners without an outcome ran past the batch deadline
        for (server_id, server_label) in roster {
            if !outcomes.iter().any(|o| o.server_id == server_id) {
                outcomes.push(PartnerOutcome {
                    server_id,
                    server_label,
                    outcome: Err(PartnerFailure::DeadlineExceeded),
                });
            }
        }
        outcomes
    }
}

/// One partner call: POST the payload with the partner's credential, within
/// its own timeout.
async fn call_partner(
    client: &reqwest::Client,
    partner: &PartnerServer,
    payload: &Value,
    timeout: Duration,
) -> Result<Value, PartnerFailure> {
    let Some(base_url) = partner.base_url.as_deref() else {
        return Err(PartnerFailure::Network("partner has no base URL".to_string()));
    };
    let url = format!("{}{MATCH_ENDPOINT}", base_url.trim_end_matches('/'));
    debug!("Querying partner {:?} at {url}", partner.server_id);

    let send = async {
        let response = client
            .post(&url)
            .header(AUTH_HEADER, &partner.server_key)
            .header(CONTENT_TYPE, API_MIME_TYPE)
            .header(ACCEPT, API_MIME_TYPE)
            .json(payload)
            .send()
            .await
            .map_err(|e| PartnerFailure::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PartnerFailure::Status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PartnerFailure::InvalidBody(e.to_string()))
    };

    match tokio::time::timeout(timeout, send).await {
        Ok(result) => result,
        Err(_) => Err(PartnerFailure::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn test_fanout_with_no_partners() {
        let registry = TrustRegistry::new(Arc::new(MemoryBackend::new()));
        let proxy = FederationProxy::new(registry, reqwest::Client::new(), FanoutConfig::default());

        let outcomes = proxy
            .fanout(&serde_json::json!({}), None, None)
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_isolates_network_failure() {
        let registry = TrustRegistry::new(Arc::new(MemoryBackend::new()));
        let proxy = FederationProxy::new(registry, reqwest::Client::new(), FanoutConfig::default());

        // Nothing listens on this address; the call fails fast, per partner
        let partner = PartnerServer {
            server_id: "dead".to_string(),
            server_label: "dead".to_string(),
            server_key: "key".to_string(),
            direction: Direction::Out,
            base_url: Some("http://127.0.0.1:9".to_string()),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let outcomes = proxy
            .dispatch(vec![partner], &serde_json::json!({}), Duration::from_secs(2))
            .await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].outcome,
            Err(PartnerFailure::Network(_)) | Err(PartnerFailure::Timeout(_))
        ));
    }
}

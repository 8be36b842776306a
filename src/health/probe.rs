//! Health probes.
//!
//! # Responsibilities
//! - Issue one HTTP or TCP check against an endpoint
//! - Normalize every failure into a [`ProbeResult`] with an error kind
//!
//! # Design Decisions
//! - A probe never returns an error; failures are data
//! - HTTP success is any status in 200..=399, matching platform probes
//! - The timeout covers connect and response headers

use std::error::Error as StdError;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use hyper::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time;

use crate::config::ProbeKind;
use crate::registry::{now_millis, Endpoint, MemberId, Timestamp};

/// Why a probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeErrorKind {
    Timeout,
    ConnectionRefused,
    BadStatus,
    Unknown,
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub member_id: MemberId,
    pub timestamp: Timestamp,
    pub success: bool,
    pub latency_ms: u64,
    pub error_kind: Option<ProbeErrorKind>,
}

impl ProbeResult {
    pub fn success(member_id: MemberId, latency: Duration) -> Self {
        Self {
            member_id,
            timestamp: now_millis(),
            success: true,
            latency_ms: latency.as_millis() as u64,
            error_kind: None,
        }
    }

    pub fn failure(member_id: MemberId, latency: Duration, kind: ProbeErrorKind) -> Self {
        Self {
            member_id,
            timestamp: now_millis(),
            success: false,
            latency_ms: latency.as_millis() as u64,
            error_kind: Some(kind),
        }
    }
}

/// Issues health checks.
///
/// Implementations must not fail and should honor `timeout`; the scheduler
/// still cuts a probe off at twice the timeout.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    async fn probe(
        &self,
        member_id: &MemberId,
        endpoint: &Endpoint,
        kind: &ProbeKind,
        timeout: Duration,
    ) -> ProbeResult;
}

/// Probes real endpoints over the network.
#[derive(Clone)]
pub struct NetworkProbeClient {
    client: Client<HttpConnector, Body>,
}

impl Default for NetworkProbeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProbeClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    async fn probe_http(
        &self,
        member_id: &MemberId,
        endpoint: &Endpoint,
        path: &str,
        timeout: Duration,
    ) -> ProbeResult {
        let start = Instant::now();
        let uri = format!("http://{}{}", endpoint, path);

        let request = match Request::builder()
            .method("GET")
            .uri(&uri)
            .header("user-agent", "tierwatch-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(member = %member_id, uri = %uri, error = %e, "Failed to build health check request");
                return ProbeResult::failure(member_id.clone(), start.elapsed(), ProbeErrorKind::Unknown);
            }
        };

        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if (200..400).contains(&status.as_u16()) {
                    ProbeResult::success(member_id.clone(), start.elapsed())
                } else {
                    tracing::debug!(member = %member_id, status = %status, "Health check failed: bad status");
                    ProbeResult::failure(member_id.clone(), start.elapsed(), ProbeErrorKind::BadStatus)
                }
            }
            Ok(Err(e)) => {
                let kind = classify_error(&e);
                tracing::debug!(member = %member_id, error = %e, kind = ?kind, "Health check failed: connection error");
                ProbeResult::failure(member_id.clone(), start.elapsed(), kind)
            }
            Err(_) => {
                tracing::debug!(member = %member_id, "Health check failed: timeout");
                ProbeResult::failure(member_id.clone(), start.elapsed(), ProbeErrorKind::Timeout)
            }
        }
    }

    async fn probe_tcp(
        &self,
        member_id: &MemberId,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> ProbeResult {
        let start = Instant::now();
        match time::timeout(timeout, TcpStream::connect(endpoint.as_str())).await {
            Ok(Ok(_stream)) => ProbeResult::success(member_id.clone(), start.elapsed()),
            Ok(Err(e)) => {
                let kind = classify_error(&e);
                tracing::debug!(member = %member_id, error = %e, kind = ?kind, "TCP check failed");
                ProbeResult::failure(member_id.clone(), start.elapsed(), kind)
            }
            Err(_) => {
                tracing::debug!(member = %member_id, "TCP check failed: timeout");
                ProbeResult::failure(member_id.clone(), start.elapsed(), ProbeErrorKind::Timeout)
            }
        }
    }
}

#[async_trait]
impl ProbeClient for NetworkProbeClient {
    async fn probe(
        &self,
        member_id: &MemberId,
        endpoint: &Endpoint,
        kind: &ProbeKind,
        timeout: Duration,
    ) -> ProbeResult {
        match kind {
            ProbeKind::Http { path } => self.probe_http(member_id, endpoint, path, timeout).await,
            ProbeKind::Tcp => self.probe_tcp(member_id, endpoint, timeout).await,
        }
    }
}

/// Walk the error chain looking for an I/O cause we can name.
fn classify_error(err: &(dyn StdError + 'static)) -> ProbeErrorKind {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return ProbeErrorKind::ConnectionRefused,
                std::io::ErrorKind::TimedOut => return ProbeErrorKind::Timeout,
                _ => {}
            }
        }
        current = e.source();
    }
    ProbeErrorKind::Unknown
}

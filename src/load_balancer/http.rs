//! Backend pool adapter for an external pool-management API.
//!
//! # Contract
//! ```text
//! PUT {base_url}/pools/{tier}/members/{member_id}
//! {"active": true|false, "endpoint": "host:port"}
//! ```
//! Any 2xx is an acknowledgement. Removal may take a full platform probe
//! interval to be visible at the edge; nothing here waits for that.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::load_balancer::{Ack, RoutingError, TrafficRouter};
use crate::registry::Member;

#[derive(Debug, Serialize)]
struct PoolUpdate<'a> {
    active: bool,
    endpoint: &'a str,
}

/// Calls the pool-management API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPoolRouter {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpPoolRouter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RoutingError::Config(format!("invalid base_url '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RoutingError::Config(format!("base_url '{}' cannot be a base", base_url)));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoutingError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// URL of the pool entry for `member`.
    pub fn member_url(&self, member: &Member) -> Result<Url, RoutingError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RoutingError::Config("base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["pools", member.tier.as_str(), "members", member.id.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl TrafficRouter for HttpPoolRouter {
    async fn set_member_active(&self, member: &Member, active: bool) -> Result<Ack, RoutingError> {
        let url = self.member_url(member)?;
        let body = PoolUpdate {
            active,
            endpoint: member.endpoint.as_str(),
        };

        let response = self
            .client
            .put(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RoutingError::Timeout(self.timeout)
                } else {
                    RoutingError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(member = %member.id, url = %url, active, "Backend pool API acknowledged update");
        // The API does not say whether anything changed.
        Ok(Ack { changed: true })
    }
}

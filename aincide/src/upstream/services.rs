//! Reachability probes for dashboard services.

use crate::config::ServiceConfig;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    Offline,
}

/// Result of probing one configured service. Recomputed on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceHealth {
    pub name: String,
    pub url: String,
    pub status: ServiceStatus,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ServiceProber {
    http: reqwest::Client,
    timeout: Duration,
}

impl ServiceProber {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Any response below 500 counts as online, including redirects and auth challenges.
    #[instrument(skip(self, service), fields(service = %service.name))]
    pub async fn probe(&self, service: &ServiceConfig) -> ServiceHealth {
        let status = match self.http.get(service.url.clone()).timeout(self.timeout).send().await {
            Ok(response) if response.status().as_u16() < 500 => ServiceStatus::Online,
            Ok(response) => {
                debug!(status = %response.status(), "Service answered with a server error");
                ServiceStatus::Offline
            }
            Err(e) => {
                debug!(error = %e, timeout = e.is_timeout(), "Service probe failed");
                ServiceStatus::Offline
            }
        };

        ServiceHealth {
            name: service.name.clone(),
            url: service.url.to_string(),
            status,
            description: service.description.clone(),
        }
    }

    /// Probe every service concurrently. Output order matches `services`.
    pub async fn probe_all(&self, services: &[ServiceConfig]) -> Vec<ServiceHealth> {
        join_all(services.iter().map(|service| self.probe(service))).await
    }
}

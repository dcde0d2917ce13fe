//! One-shot health probe that seeds the pool before dispatch.

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use futures::stream::{self, StreamExt};
use std::time::Duration;

/// Probes candidate proxies concurrently and keeps the ones that answer
#[derive(Clone, Debug)]
pub struct ProxyValidator {
    probe_url: String,
    timeout: Duration,
    concurrency: usize,
}

impl ProxyValidator {
    /// Build a validator from the proxy section of the configuration
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            probe_url: config.probe_url.clone(),
            timeout: config.probe_timeout,
            concurrency: config.probe_concurrency.max(1),
        }
    }

    /// Probe every candidate; return the usable ones in input order
    ///
    /// Fails with [`Error::NoProxies`] for an empty candidate list and
    /// [`Error::NoUsableProxies`] when nothing passes.
    pub async fn validate_all(&self, candidates: &[String]) -> Result<Vec<String>> {
        if candidates.is_empty() {
            return Err(Error::NoProxies);
        }

        let results: Vec<(String, bool)> = stream::iter(candidates.iter().cloned())
            .map(|address| async move {
                let ok = self.probe(&address).await;
                (address, ok)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let usable: Vec<String> = results
            .into_iter()
            .filter_map(|(address, ok)| ok.then_some(address))
            .collect();

        tracing::info!(
            candidates = candidates.len(),
            usable = usable.len(),
            "proxy validation finished"
        );

        if usable.is_empty() {
            tracing::error!(candidates = candidates.len(), "no proxy passed validation");
            return Err(Error::NoUsableProxies {
                candidates: candidates.len(),
            });
        }

        Ok(usable)
    }

    async fn probe(&self, address: &str) -> bool {
        let client = match reqwest::Proxy::all(address)
            .and_then(|proxy| reqwest::Client::builder().proxy(proxy).timeout(self.timeout).build())
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(proxy = %address, error = %e, "invalid proxy address");
                return false;
            }
        };

        match client.get(&self.probe_url).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(proxy = %address, "proxy probe succeeded");
                true
            }
            Ok(response) => {
                tracing::warn!(proxy = %address, status = %response.status(), "proxy probe rejected");
                false
            }
            Err(e) => {
                tracing::warn!(proxy = %address, error = %e, "proxy probe failed");
                false
            }
        }
    }
}

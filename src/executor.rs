//! Single-attempt lookup execution.
//!
//! An executor sends one query for one subject through one proxy and reports
//! a [`Classification`]. Retrying is the coordinator's job.

use crate::config::ApiConfig;
use crate::types::{Classification, Subject};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// The API requires a death date field but never receives a real one
pub const DEATH_DATE_ABSENT: &str = "NULL";

/// Abstraction over one lookup attempt, enabling testability.
#[async_trait::async_trait]
pub trait LookupExecutor: Send + Sync {
    /// Query the API for `subject` through the proxy at `endpoint`
    async fn execute(&self, subject: &Subject, endpoint: &str) -> Classification;

    /// Drop whatever is kept for `endpoint` once it has left the pool
    async fn forget_endpoint(&self, _endpoint: &str) {}
}

/// JSON body POSTed to the lookup API
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LookupPayload {
    /// "<family> <given> <patronymic>"
    pub name: String,
    /// `YYYYMMDD`
    pub birth_date: String,
    /// Always [`DEATH_DATE_ABSENT`], even when the subject has a death date
    pub death_date: &'static str,
}

impl LookupPayload {
    /// Build the query for a subject
    pub fn for_subject(subject: &Subject) -> Self {
        Self {
            name: subject.full_name(),
            birth_date: subject.compact_birth_date(),
            death_date: DEATH_DATE_ABSENT,
        }
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    records: Option<Vec<Value>>,
}

/// Classify an HTTP response by status and body
///
/// A 200 with `records` missing, null or empty is a valid "no match".
pub fn classify_response(status: u16, body: &[u8]) -> Classification {
    match status {
        200 => match serde_json::from_slice::<LookupResponse>(body) {
            Ok(parsed) => Classification::Success(parsed.records.unwrap_or_default()),
            Err(e) => {
                tracing::warn!(error = %e, "unparsable lookup response, treating as no match");
                Classification::Success(Vec::new())
            }
        },
        429 => Classification::RateLimited,
        500..=599 => Classification::ServerError(status),
        other => Classification::ClientError(other),
    }
}

/// Production [`LookupExecutor`] issuing HTTP requests through proxies.
pub struct HttpExecutor {
    api_url: String,
    timeout: Duration,
    /// One client per proxy address
    clients: Mutex<HashMap<String, reqwest::Client>>,
}

impl HttpExecutor {
    /// Create an executor for the configured API
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            api_url: config.url.clone(),
            timeout: config.request_timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client_for(&self, endpoint: &str) -> Result<reqwest::Client, reqwest::Error> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(endpoint) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(endpoint)?)
            .timeout(self.timeout)
            .build()?;
        clients.insert(endpoint.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait::async_trait]
impl LookupExecutor for HttpExecutor {
    async fn execute(&self, subject: &Subject, endpoint: &str) -> Classification {
        let client = match self.client_for(endpoint).await {
            Ok(client) => client,
            Err(e) => return Classification::ConnectionFailure(e.to_string()),
        };

        let payload = LookupPayload::for_subject(subject);
        let response = match client.post(&self.api_url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(subject_id = %subject.id, proxy = %endpoint, error = %e, "lookup request failed");
                return Classification::ConnectionFailure(e.to_string());
            }
        };

        let status = response.status().as_u16();
        match response.bytes().await {
            Ok(body) => classify_response(status, &body),
            Err(e) => Classification::ConnectionFailure(e.to_string()),
        }
    }

    async fn forget_endpoint(&self, endpoint: &str) {
        self.clients.lock().await.remove(endpoint);
    }
}

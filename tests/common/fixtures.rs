//! Subjects, configurations and pools for integration tests

use chrono::NaiveDate;
use record_sweep::{Config, ProxyPool, Subject, SubjectId};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn subject(id: &str, family_name: &str) -> Subject {
    Subject {
        id: SubjectId::new(id),
        family_name: family_name.to_string(),
        name: "Maria".to_string(),
        patronymic: "Alekseevna".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1929, 6, 14).unwrap(),
        death_date: None,
    }
}

pub fn subjects(count: usize) -> Vec<Subject> {
    (1..=count)
        .map(|i| subject(&i.to_string(), &format!("Family{i}")))
        .collect()
}

/// Fast settings: no pacing, millisecond delays, output under `dir`
pub fn fast_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.dispatch.workers = 3;
    config.dispatch.submit_pacing = Duration::ZERO;
    config.dispatch.drain_interval = Duration::from_millis(5);
    config.retry.rate_limit_delay = Duration::from_millis(2);
    config.retry.server_error_delay = Duration::from_millis(5);
    config.retry.unavailable_backoff = Duration::from_millis(5);
    config.checkpoint.output_path = dir.join("results.json");
    config
}

pub fn pool(addresses: &[&str], quota: u32) -> Arc<ProxyPool> {
    Arc::new(ProxyPool::new(
        addresses.iter().map(|a| a.to_string()),
        quota,
        Duration::from_secs(3600),
    ))
}

/// Parse the output file as a JSON array
pub fn read_output(path: &Path) -> Vec<Value> {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

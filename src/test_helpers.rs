//! Shared fixtures for unit tests.

use crate::types::{Subject, SubjectId};
use chrono::NaiveDate;
use tokio::net::TcpListener;

/// Subject with fixed, recognisable identity fields
pub(crate) fn subject(id: &str) -> Subject {
    Subject {
        id: SubjectId::new(id),
        family_name: "Sokolov".to_string(),
        name: "Ivan".to_string(),
        patronymic: "Ilyich".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1940, 1, 9).unwrap(),
        death_date: Some(NaiveDate::from_ymd_opt(2019, 11, 30).unwrap()),
    }
}

/// Address of a local port nothing listens on
pub(crate) async fn dead_proxy_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    address
}

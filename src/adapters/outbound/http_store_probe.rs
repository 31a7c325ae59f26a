//! HTTP Store Probe
//!
//! Checks store reachability through an HTTP health endpoint (for stores
//! fronted by a proxy or a REST gateway). Any 2xx response is healthy.

use crate::domain::errors::StoreError;
use crate::domain::ports::StoreProbe;
use crate::domain::value_objects::ConnectivityKind;
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpStoreProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpStoreProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::generic(format!("client error: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

fn classify(err: &reqwest::Error) -> ConnectivityKind {
    if err.is_timeout() {
        ConnectivityKind::Timeout
    } else if err.is_connect() {
        ConnectivityKind::ConnectionRefused
    } else {
        ConnectivityKind::Generic
    }
}

#[async_trait]
impl StoreProbe for HttpStoreProbe {
    async fn probe(&self) -> Result<(), StoreError> {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(StoreError::generic(format!(
                "unhealthy status: {}",
                resp.status()
            ))),
            Err(e) => Err(StoreError::new(classify(&e), format!("request failed: {}", e))),
        }
    }

    fn target(&self) -> String {
        self.url.clone()
    }
}

//! TCP Store Probe
//!
//! Checks store reachability by resolving its address and opening a TCP
//! connection. Failures are tagged by stage: resolution errors are DNS
//! failures, connect errors are classified by socket error kind.

use crate::domain::errors::StoreError;
use crate::domain::ports::StoreProbe;
use crate::domain::value_objects::ConnectivityKind;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};

pub struct TcpStoreProbe {
    addr: String,
    timeout: Duration,
}

impl TcpStoreProbe {
    /// `addr` is `host:port`.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl StoreProbe for TcpStoreProbe {
    async fn probe(&self) -> Result<(), StoreError> {
        let target = lookup_host(self.addr.as_str())
            .await
            .map_err(|e| {
                StoreError::new(
                    ConnectivityKind::DnsFailure,
                    format!("failed to resolve {}: {}", self.addr, e),
                )
            })?
            .next()
            .ok_or_else(|| {
                StoreError::new(
                    ConnectivityKind::DnsFailure,
                    format!("{} resolved to no addresses", self.addr),
                )
            })?;

        match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(mut stream)) => {
                let _ = stream.shutdown().await;
                Ok(())
            }
            Ok(Err(e)) => Err(StoreError::new(
                ConnectivityKind::from_io_error(&e),
                format!("connection to {} failed: {}", self.addr, e),
            )),
            Err(_) => Err(StoreError::timeout(format!("connection to {} timed out", self.addr))),
        }
    }

    fn target(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

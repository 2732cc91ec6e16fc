use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::domain::CYREST_PORT;
use crate::error::SearchError;
use crate::http::build_client;

/// One liveness probe of the local desktop application.
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn check(&self) -> Result<(), SearchError>;
}

#[async_trait]
impl<T: ReachabilityCheck + ?Sized> ReachabilityCheck for Arc<T> {
    async fn check(&self) -> Result<(), SearchError> {
        (**self).check().await
    }
}

#[derive(Clone)]
pub struct CyRestHttpClient {
    client: Client,
    port: u16,
}

impl CyRestHttpClient {
    pub fn new(port: u16, timeout: Option<Duration>) -> Result<Self, SearchError> {
        Ok(Self {
            client: build_client(timeout)?,
            port,
        })
    }

    pub fn with_default_port(timeout: Option<Duration>) -> Result<Self, SearchError> {
        Self::new(CYREST_PORT, timeout)
    }

    fn status_url(&self) -> String {
        format!("http://localhost:{}/v1", self.port)
    }
}

#[async_trait]
impl ReachabilityCheck for CyRestHttpClient {
    async fn check(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .get(self.status_url())
            .send()
            .await
            .map_err(|err| SearchError::CyRestHttp(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::CyRestStatus {
                status: status.as_u16(),
            });
        }
        // The service answers with its version record; anything else is not CyREST.
        response
            .json::<Value>()
            .await
            .map_err(|err| SearchError::CyRestHttp(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_url_uses_port() {
        let client = CyRestHttpClient::with_default_port(None).unwrap();
        assert_eq!(client.status_url(), "http://localhost:1234/v1");
    }
}

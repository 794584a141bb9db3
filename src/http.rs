use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AnalyzerError;

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Non-2xx responses become `RemoteServiceError`.
    pub fn error_for_status(self, url: &str) -> Result<Self, AnalyzerError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AnalyzerError::remote(format!(
                "{} returned HTTP {}",
                url, self.status
            )))
        }
    }
}

/// Outbound HTTP seen by the remote-service backends.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, AnalyzerError>;
    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse, AnalyzerError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hcs-pipeline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn read(resp: reqwest::Response) -> Result<HttpResponse, AnalyzerError> {
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, AnalyzerError> {
        let resp = self.client.get(url).send().await?;
        Self::read(resp).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse, AnalyzerError> {
        let resp = self.client.post(url).json(body).send().await?;
        Self::read(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyzerErrorKind;

    #[test]
    fn test_error_for_status() {
        let ok = HttpResponse { status: 204, body: String::new() };
        assert!(ok.error_for_status("http://svc/job").is_ok());

        let err = HttpResponse { status: 503, body: "busy".to_string() }
            .error_for_status("http://svc/job")
            .unwrap_err();
        assert_eq!(err.kind, AnalyzerErrorKind::RemoteServiceError);
        assert!(err.detail.contains("503"));
    }
}

use crate::api::open_status;
use crate::initdata::InitDataValidator;
use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const OPEN_ENDPOINT: &str = "/api/open";

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("open request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid open base url: {0}")]
    BaseUrl(String),
    #[error("open task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// `/api/open?` followed by the session blob, verbatim.
pub fn open_path(init_data: &str) -> String {
    format!("{OPEN_ENDPOINT}?{init_data}")
}

/// Delivers the renderer's open call.
#[async_trait]
pub trait OpenTransport: Send + Sync {
    async fn open(&self, path: &str) -> Result<StatusCode, OpenError>;
}

/// Handle on a dispatched open call. Dropping it detaches the call.
#[derive(Debug)]
pub struct OpenTask {
    handle: JoinHandle<Result<StatusCode, OpenError>>,
}

impl OpenTask {
    pub fn spawn(transport: Arc<dyn OpenTransport>, path: String) -> Self {
        let handle = tokio::spawn(async move {
            let result = transport.open(&path).await;
            match &result {
                Ok(status) => debug!(%status, "open call completed"),
                Err(err) => debug!(%err, "open call failed"),
            }
            result
        });
        Self { handle }
    }

    pub async fn join(self) -> Result<StatusCode, OpenError> {
        self.handle.await?
    }
}

/// Sends the open call over HTTP; the response body is ignored.
#[derive(Clone, Debug)]
pub struct HttpOpenTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOpenTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OpenError> {
        let parsed = url::Url::parse(base_url).map_err(|e| OpenError::BaseUrl(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(OpenError::BaseUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl OpenTransport for HttpOpenTransport {
    async fn open(&self, path: &str) -> Result<StatusCode, OpenError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(url).send().await?;
        Ok(resp.status())
    }
}

/// Runs the `/api/open` check in-process, for pages rendered by the server.
#[derive(Clone, Debug, Default)]
pub struct InProcessOpenTransport {
    validator: Option<Arc<InitDataValidator>>,
}

impl InProcessOpenTransport {
    pub fn new(validator: Option<Arc<InitDataValidator>>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl OpenTransport for InProcessOpenTransport {
    async fn open(&self, path: &str) -> Result<StatusCode, OpenError> {
        let (endpoint, query) = path.split_once('?').unwrap_or((path, ""));
        if endpoint != OPEN_ENDPOINT {
            warn!(%endpoint, "in-process open called with unknown endpoint");
            return Ok(StatusCode::NOT_FOUND);
        }
        Ok(open_status(self.validator.as_deref(), query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initdata::tests::{SIGNED, SIGNED_BAD_USER, TOKEN};

    #[test]
    fn open_path_is_verbatim() {
        assert_eq!(open_path(""), "/api/open?");
        assert_eq!(
            open_path("user=%7B%7D&hash=a b<c>"),
            "/api/open?user=%7B%7D&hash=a b<c>"
        );
    }

    #[tokio::test]
    async fn in_process_transport_validates() {
        let validator = Arc::new(InitDataValidator::new(TOKEN, Duration::ZERO));
        let transport = InProcessOpenTransport::new(Some(validator));
        assert_eq!(
            transport.open(&open_path(SIGNED)).await.unwrap(),
            StatusCode::OK
        );
        assert_eq!(
            transport.open(&open_path("hash=00")).await.unwrap(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            transport.open(&open_path(SIGNED_BAD_USER)).await.unwrap(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            transport.open("/api/other?x").await.unwrap(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn in_process_transport_without_token_is_unavailable() {
        let transport = InProcessOpenTransport::default();
        assert_eq!(
            transport.open(&open_path(SIGNED)).await.unwrap(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn joined_task_reports_transport_failure() {
        let closed_port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let base = format!("http://127.0.0.1:{closed_port}");
        let transport = HttpOpenTransport::new(&base, Duration::from_secs(2)).unwrap();
        let task = OpenTask::spawn(Arc::new(transport), open_path("x=1"));
        assert!(matches!(task.join().await, Err(OpenError::Request(_))));
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(HttpOpenTransport::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpOpenTransport::new("mailto:a@b", Duration::from_secs(1)).is_err());
    }
}

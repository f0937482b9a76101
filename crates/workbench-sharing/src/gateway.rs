//! Remote Sharing Gateway

use serde::{Deserialize, Serialize};
use std::time::Duration;
use workbench_common::{SharingConfig, WorkbenchError, WorkbenchResult};

/// Header naming the cluster a request comes from
pub const CLUSTER_HEADER: &str = "x-workbench-cluster";

/// README of a publicly shared dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadmeContent {
    /// Preview type, e.g. "text"
    #[serde(rename = "type", default)]
    pub kind: String,
    /// README body
    pub content: String,
    /// File extension of the README, if the peer reports one
    #[serde(default)]
    pub extension: Option<String>,
}

/// Thin client to remote clusters
pub struct RemoteSharingGateway {
    config: SharingConfig,
    client: reqwest::Client,
}

impl RemoteSharingGateway {
    /// Build the HTTP client with the configured timeout
    pub fn new(config: SharingConfig) -> WorkbenchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| WorkbenchError::Config(format!("http client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Address of this cluster, if sharing is usable
    fn check_ready(&self) -> WorkbenchResult<&str> {
        if !self.config.enabled {
            return Err(WorkbenchError::SubsystemNotReady("remote sharing is disabled".into()));
        }
        match self.config.local_cluster_address.as_deref() {
            Some(address) if !address.trim().is_empty() => Ok(address),
            _ => Err(WorkbenchError::SubsystemNotReady(
                "local cluster address is not configured".into(),
            )),
        }
    }

    /// Fetch the README of `public_dataset_id` from the cluster at `remote_address`
    ///
    /// The id always occupies exactly one path segment of the request.
    pub async fn fetch_readme(&self, public_dataset_id: &str, remote_address: &str) -> WorkbenchResult<ReadmeContent> {
        let local = self.check_ready()?;
        check_dataset_id(public_dataset_id)?;
        let failure = |cause: String| WorkbenchError::CommunicationFailure {
            address: remote_address.to_string(),
            cause,
        };

        let mut url =
            reqwest::Url::parse(remote_address).map_err(|e| failure(format!("invalid address: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| failure("address cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["remote", "sharing", "datasets", public_dataset_id, "readme"]);

        tracing::debug!(address = %remote_address, dataset = %public_dataset_id, "fetching remote readme");
        let response = self
            .client
            .get(url)
            .header(CLUSTER_HEADER, local)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(address = %remote_address, status = status.as_u16(), "remote readme request rejected");
            return Err(failure(format!("unexpected status {}", status)));
        }
        let body = response.text().await.map_err(|e| failure(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| failure(format!("malformed readme: {}", e)))
    }
}

/// Reject ids that could step out of their path segment
fn check_dataset_id(id: &str) -> WorkbenchResult<()> {
    let traversal = id == "." || id == "..";
    if id.trim().is_empty() || traversal || id.contains(['/', '\\', '?', '#']) {
        tracing::warn!(dataset = %id, "rejected dataset id");
        return Err(WorkbenchError::InvalidDatasetId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn ready() -> SharingConfig {
        SharingConfig {
            enabled: true,
            local_cluster_address: Some("https://cluster-a.example.com".into()),
            request_timeout_secs: 5,
        }
    }

    /// Answer one request with `status` and `body`, yielding the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (address, task)
    }

    #[tokio::test]
    async fn test_fetch_readme() {
        let (address, server) =
            serve_once("200 OK", r#"{"type":"text","content":"hello","extension":"md"}"#).await;
        let gateway = RemoteSharingGateway::new(ready()).unwrap();

        let readme = gateway.fetch_readme("ds-42", &address).await.unwrap();
        assert_eq!(readme.content, "hello");
        assert_eq!(readme.extension.as_deref(), Some("md"));

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /remote/sharing/datasets/ds-42/readme "));
        assert!(request.contains("x-workbench-cluster: https://cluster-a.example.com"));
    }

    #[tokio::test]
    async fn test_not_ready() {
        let disabled = RemoteSharingGateway::new(SharingConfig::default()).unwrap();
        assert!(matches!(
            disabled.fetch_readme("ds", "http://127.0.0.1:9").await,
            Err(WorkbenchError::SubsystemNotReady(_))
        ));

        let no_address = RemoteSharingGateway::new(SharingConfig {
            local_cluster_address: None,
            ..ready()
        })
        .unwrap();
        assert!(matches!(
            no_address.fetch_readme("ds", "http://127.0.0.1:9").await,
            Err(WorkbenchError::SubsystemNotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_peer_carries_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let gateway = RemoteSharingGateway::new(ready()).unwrap();
        match gateway.fetch_readme("ds", &address).await {
            Err(WorkbenchError::CommunicationFailure { address: reported, .. }) => assert_eq!(reported, address),
            other => panic!("expected communication failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_and_bad_status() {
        let gateway = RemoteSharingGateway::new(ready()).unwrap();

        let (address, _server) = serve_once("200 OK", "not json").await;
        assert!(matches!(
            gateway.fetch_readme("ds", &address).await,
            Err(WorkbenchError::CommunicationFailure { .. })
        ));

        let (address, _server) = serve_once("404 Not Found", "{}").await;
        assert!(matches!(
            gateway.fetch_readme("ds", &address).await,
            Err(WorkbenchError::CommunicationFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_id_is_a_single_encoded_segment() {
        let (address, server) = serve_once("200 OK", r#"{"type":"text","content":"hi"}"#).await;
        let gateway = RemoteSharingGateway::new(ready()).unwrap();

        gateway
            .fetch_readme("my dataset%", &format!("{}/", address))
            .await
            .unwrap();

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("get /remote/sharing/datasets/my%20dataset%25/readme "));
    }

    #[tokio::test]
    async fn test_path_escaping_ids_rejected_before_any_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let gateway = RemoteSharingGateway::new(ready()).unwrap();

        for id in ["../../../admin/secrets?x=", "..", ".", "", "a/b", "a#b", "a\\b"] {
            assert_eq!(
                gateway.fetch_readme(id, &address).await.unwrap_err(),
                WorkbenchError::InvalidDatasetId(id.to_string())
            );
        }

        let accepted = tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;
        assert!(accepted.is_err(), "no connection may reach the peer");
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let gateway = RemoteSharingGateway::new(ready()).unwrap();
        assert!(matches!(
            gateway.fetch_readme("ds", "not an address").await,
            Err(WorkbenchError::CommunicationFailure { .. })
        ));
    }
}

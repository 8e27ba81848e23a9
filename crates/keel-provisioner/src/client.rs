//! Hand-written `provisioner.Provisioner` client.

use std::time::Duration;

use keel_core::{StateUpdate, WorkspaceId};
use keel_settings::ProvisionerSettings;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::{GrpcMethod, Request, Response, Status, Streaming};
use tracing::debug;

use crate::error::ProvisionerError;
use crate::proto::{
    GET_STATE_UPDATE_METHOD, GET_STATE_UPDATE_PATH, Infra, SERVICE_NAME, WORKSPACE_ID_METADATA,
};

/// Connection parameters for the provisioner channel.
#[derive(Clone, Debug)]
pub struct ProvisionerConfig {
    /// Endpoint URI, e.g. `http://localhost:8082`.
    pub endpoint: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// TCP keepalive; `None` leaves it off.
    pub tcp_keepalive: Option<Duration>,
    /// HTTP/2 PING interval.
    pub http2_keepalive_interval: Duration,
    /// HTTP/2 PING ack timeout.
    pub http2_keepalive_timeout: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self::from(&ProvisionerSettings::default())
    }
}

impl From<&ProvisionerSettings> for ProvisionerConfig {
    fn from(settings: &ProvisionerSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            tcp_keepalive: (settings.tcp_keepalive_secs > 0)
                .then(|| Duration::from_secs(settings.tcp_keepalive_secs)),
            http2_keepalive_interval: Duration::from_secs(settings.http2_keepalive_interval_secs),
            http2_keepalive_timeout: Duration::from_secs(settings.http2_keepalive_timeout_secs),
        }
    }
}

impl ProvisionerConfig {
    /// Build the tonic endpoint.
    pub fn endpoint(&self) -> Result<Endpoint, ProvisionerError> {
        let endpoint = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| ProvisionerError::InvalidEndpoint(format!("{}: {e}", self.endpoint)))?
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(self.tcp_keepalive)
            .http2_keep_alive_interval(self.http2_keepalive_interval)
            .keep_alive_timeout(self.http2_keepalive_timeout)
            .keep_alive_while_idle(true);
        Ok(endpoint)
    }
}

/// Client for `provisioner.Provisioner`.
///
/// Cheap to clone; clones share one HTTP/2 connection.
#[derive(Clone)]
pub struct ProvisionerClient {
    inner: tonic::client::Grpc<Channel>,
}

impl ProvisionerClient {
    /// Wrap an existing channel.
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Create a client whose connection is established on first use.
    pub fn connect_lazy(config: &ProvisionerConfig) -> Result<Self, ProvisionerError> {
        let channel = config.endpoint()?.connect_lazy();
        debug!(endpoint = %config.endpoint, "provisioner channel configured");
        Ok(Self::new(channel))
    }

    /// Open the state stream for `infra`, tagged with `workspace_id`.
    pub async fn get_state_update(
        &mut self,
        infra: Infra,
        workspace_id: &WorkspaceId,
    ) -> Result<Response<Streaming<StateUpdate>>, ProvisionerError> {
        let request = state_update_request(infra, workspace_id)?;
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(GET_STATE_UPDATE_PATH);
        let response = self.inner.server_streaming(request, path, codec).await?;
        Ok(response)
    }
}

/// Build a `GetStateUpdate` request with its workspace metadata.
pub fn state_update_request(
    infra: Infra,
    workspace_id: &WorkspaceId,
) -> Result<Request<Infra>, ProvisionerError> {
    let value = MetadataValue::try_from(workspace_id.as_str())
        .map_err(|e| ProvisionerError::InvalidMetadata(format!("{workspace_id}: {e}")))?;
    let mut request = Request::new(infra);
    let _ = request.metadata_mut().insert(WORKSPACE_ID_METADATA, value);
    let _ = request
        .extensions_mut()
        .insert(GrpcMethod::new(SERVICE_NAME, GET_STATE_UPDATE_METHOD));
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infra() -> Infra {
        Infra {
            project_id: 5,
            id: 9,
            suffix: "k2".into(),
        }
    }

    #[test]
    fn request_carries_workspace_metadata() {
        let workspace = WorkspaceId::from("eks-5-9-k2-op");
        let request = state_update_request(infra(), &workspace).unwrap();
        let value = request.metadata().get(WORKSPACE_ID_METADATA).unwrap();
        assert_eq!(value.to_str().unwrap(), "eks-5-9-k2-op");
        assert_eq!(request.get_ref(), &infra());
    }

    #[test]
    fn request_rejects_unprintable_workspace() {
        let workspace = WorkspaceId::from("bad\nid");
        let err = state_update_request(infra(), &workspace).unwrap_err();
        assert!(matches!(err, ProvisionerError::InvalidMetadata(_)));
    }

    #[test]
    fn config_from_settings() {
        let settings = ProvisionerSettings {
            endpoint: "http://prov:9000".into(),
            connect_timeout_ms: 1500,
            tcp_keepalive_secs: 0,
            http2_keepalive_interval_secs: 10,
            http2_keepalive_timeout_secs: 3,
        };
        let config = ProvisionerConfig::from(&settings);
        assert_eq!(config.endpoint, "http://prov:9000");
        assert_eq!(config.connect_timeout, Duration::from_millis(1500));
        assert!(config.tcp_keepalive.is_none());
        assert_eq!(config.http2_keepalive_interval, Duration::from_secs(10));
        assert_eq!(config.http2_keepalive_timeout, Duration::from_secs(3));
    }

    #[test]
    fn endpoint_parses_uri() {
        let endpoint = ProvisionerConfig::default().endpoint().unwrap();
        assert_eq!(endpoint.uri().to_string(), "http://localhost:8082/");
    }

    #[test]
    fn endpoint_rejects_garbage() {
        let config = ProvisionerConfig {
            endpoint: "not a uri".into(),
            ..ProvisionerConfig::default()
        };
        assert!(matches!(
            config.endpoint(),
            Err(ProvisionerError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn lazy_client_does_not_dial() {
        let config = ProvisionerConfig {
            endpoint: "http://127.0.0.1:1".into(),
            ..ProvisionerConfig::default()
        };
        assert!(ProvisionerClient::connect_lazy(&config).is_ok());
    }
}

//! [`UpstreamConnector`] backed by the provisioner gRPC service.

use std::sync::Arc;

use async_trait::async_trait;
use keel_bridge::{ConnectError, UpstreamConnector, UpstreamSource};
use keel_core::InfraTarget;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{ProvisionerClient, ProvisionerConfig};
use crate::error::ProvisionerError;
use crate::proto::Infra;
use crate::source::GrpcStateSource;

/// State streams opened (counter).
pub const PROVISIONER_STREAMS_OPENED_TOTAL: &str = "provisioner_streams_opened_total";
/// Failed stream opens (counter, labels: reason).
pub const PROVISIONER_OPEN_ERRORS_TOTAL: &str = "provisioner_open_errors_total";

/// Opens `GetStateUpdate` streams on a shared channel.
#[derive(Clone)]
pub struct ProvisionerConnector {
    client: ProvisionerClient,
}

impl ProvisionerConnector {
    /// Use an existing client.
    pub fn new(client: ProvisionerClient) -> Self {
        Self { client }
    }

    /// Configure a lazily connecting client.
    pub fn from_config(config: &ProvisionerConfig) -> Result<Self, ProvisionerError> {
        Ok(Self::new(ProvisionerClient::connect_lazy(config)?))
    }

    async fn open_stream(
        &self,
        target: &InfraTarget,
        scope: &CancellationToken,
    ) -> Result<GrpcStateSource, ProvisionerError> {
        let infra = Infra::try_from(target)?;
        let workspace_id = target.workspace_id();
        let mut client = self.client.clone();

        let response = tokio::select! {
            biased;
            () = scope.cancelled() => return Err(ProvisionerError::Cancelled),
            response = client.get_state_update(infra, &workspace_id) => response?,
        };

        info!(%workspace_id, infra = %target, "state stream opened");
        Ok(GrpcStateSource::new(response.into_inner(), scope))
    }
}

#[async_trait]
impl UpstreamConnector for ProvisionerConnector {
    async fn open(
        &self,
        target: &InfraTarget,
        scope: CancellationToken,
    ) -> Result<Arc<dyn UpstreamSource>, ConnectError> {
        match self.open_stream(target, &scope).await {
            Ok(source) => {
                counter!(PROVISIONER_STREAMS_OPENED_TOTAL).increment(1);
                Ok(Arc::new(source))
            }
            Err(err) => {
                warn!(infra = %target, error = %err, "failed to open state stream");
                let err = ConnectError::from(err);
                let reason = match &err {
                    ConnectError::NotFound(_) => "not_found",
                    ConnectError::Unavailable(_) => "unavailable",
                    ConnectError::InvalidTarget(_) => "invalid_target",
                };
                counter!(PROVISIONER_OPEN_ERRORS_TOTAL, "reason" => reason).increment(1);
                Err(err)
            }
        }
    }
}

//! Volume daemon client over a Unix domain socket
//!
//! The daemon is node-local and trusted, so the channel carries no TLS and
//! no credentials. Both services share one HTTP/2 connection.

use crate::api::{CapacityStream, LogicalVolumeApi, VolumeGroupApi};
use crate::convert::{snapshot_from_proto, volume_from_proto};
use crate::error::{DaemonError, DaemonResult};
use async_trait::async_trait;
use futures::StreamExt;
use hyper_util::rt::TokioIo;
use lvbridge_common::VolumeHandle;
use lvbridge_proto::lvmd::lv_service_client::LvServiceClient;
use lvbridge_proto::lvmd::vg_service_client::VgServiceClient;
use lvbridge_proto::lvmd::{
    CreateLvRequest, Empty, GetFreeBytesRequest, GetLvListRequest, RemoveLvRequest,
    ResizeLvRequest,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, info};

/// Typed client for the volume-group and logical-volume services
#[derive(Clone, Debug)]
pub struct DaemonClient {
    socket: PathBuf,
    vg: VgServiceClient<Channel>,
    lv: LvServiceClient<Channel>,
}

impl DaemonClient {
    /// Connect to the daemon listening on `socket`
    pub async fn connect(socket: impl AsRef<Path>, timeout: Duration) -> DaemonResult<Self> {
        let socket = socket.as_ref().to_path_buf();
        let path = socket.clone();

        // The authority is never resolved; the connector always dials the socket
        let channel = Endpoint::from_static("http://lvmd.local")
            .connect_timeout(timeout)
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = path.clone();
                async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
            }))
            .await
            .map_err(|source| DaemonError::Connect {
                socket: socket.clone(),
                source,
            })?;

        info!("Connected to lvmd at {}", socket.display());
        Ok(Self::from_channel(socket, channel))
    }

    /// Build a client over an existing channel
    #[must_use]
    pub fn from_channel(socket: PathBuf, channel: Channel) -> Self {
        Self {
            socket,
            vg: VgServiceClient::new(channel.clone()),
            lv: LvServiceClient::new(channel),
        }
    }

    /// Socket this client dials
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

#[async_trait]
impl VolumeGroupApi for DaemonClient {
    async fn free_bytes(&self, device_class: &str) -> DaemonResult<u64> {
        let mut client = self.vg.clone();
        let resp = client
            .get_free_bytes(GetFreeBytesRequest {
                device_class: device_class.to_string(),
            })
            .await
            .map_err(|s| DaemonError::rpc("GetFreeBytes", s))?;
        Ok(resp.into_inner().free_bytes)
    }

    async fn list_volumes(&self, device_class: &str) -> DaemonResult<Vec<VolumeHandle>> {
        let mut client = self.vg.clone();
        let resp = client
            .get_lv_list(GetLvListRequest {
                device_class: device_class.to_string(),
            })
            .await
            .map_err(|s| DaemonError::rpc("GetLVList", s))?;
        resp.into_inner()
            .volumes
            .into_iter()
            .map(|lv| volume_from_proto("GetLVList", lv))
            .collect()
    }

    async fn watch(&self) -> DaemonResult<CapacityStream> {
        let mut client = self.vg.clone();
        let stream = client
            .watch(Empty {})
            .await
            .map_err(|s| DaemonError::rpc("Watch", s))?
            .into_inner();
        debug!("Capacity watch opened on {}", self.socket.display());

        Ok(stream
            .map(|item| match item {
                Ok(resp) => snapshot_from_proto(resp),
                Err(status) => Err(DaemonError::rpc("Watch", status)),
            })
            .boxed())
    }
}

#[async_trait]
impl LogicalVolumeApi for DaemonClient {
    async fn create_volume(
        &self,
        name: &str,
        size_gb: u64,
        device_class: &str,
    ) -> DaemonResult<VolumeHandle> {
        let mut client = self.lv.clone();
        let resp = client
            .create_lv(CreateLvRequest {
                name: name.to_string(),
                size_gb,
                device_class: device_class.to_string(),
            })
            .await
            .map_err(|s| DaemonError::rpc("CreateLV", s))?;
        let volume = resp
            .into_inner()
            .volume
            .ok_or_else(|| DaemonError::invalid_response("CreateLV", "missing volume"))?;
        volume_from_proto("CreateLV", volume)
    }

    async fn remove_volume(&self, id: &str) -> DaemonResult<()> {
        let mut client = self.lv.clone();
        client
            .remove_lv(RemoveLvRequest { id: id.to_string() })
            .await
            .map_err(|s| DaemonError::rpc("RemoveLV", s))?;
        Ok(())
    }

    async fn resize_volume(&self, id: &str, size_gb: u64) -> DaemonResult<()> {
        let mut client = self.lv.clone();
        client
            .resize_lv(ResizeLvRequest {
                id: id.to_string(),
                size_gb,
            })
            .await
            .map_err(|s| DaemonError::rpc("ResizeLV", s))?;
        Ok(())
    }
}

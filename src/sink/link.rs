use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use super::error::{ConnectError, DisconnectError};
use crate::communication::transport::{Channel, Connector};
use crate::device::Device;

/// Opens a channel to `psm` on the device from the adapter it belongs to,
/// giving up after `timeout`.
pub(super) async fn open(
    connector: &Arc<dyn Connector>,
    device: &Arc<dyn Device>,
    psm: u16,
    timeout: Duration,
) -> Result<Box<dyn Channel>, ConnectError> {
    let connecting = connector.connect(
        device.local_address(),
        device.remote_address(),
        device.address_type(),
        psm,
    );

    match tokio::time::timeout(timeout, connecting).await {
        Ok(result) => result.map_err(ConnectError::from),
        Err(_) => Err(ConnectError::Timeout),
    }
}

/// Shuts the channel down. It is released even when that fails.
pub(super) async fn close(mut channel: Box<dyn Channel>, timeout: Duration) -> Result<(), DisconnectError> {
    match tokio::time::timeout(timeout, channel.shutdown()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(DisconnectError::Timeout),
    }
}

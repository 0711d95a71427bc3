use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::error::{ConnectError, DisconnectError};
use super::{link, ConnectionStatus, AVDTP_FLOW};
use crate::communication::transport::{Channel, Connector};
use crate::config::SinkConfig;
use crate::device::Device;

/// The AVDTP signalling connection to an audio sink. It only has to exist;
/// no signalling is exchanged on it yet.
pub struct AudioReceiver {
    device: Arc<dyn Device>,
    connector: Arc<dyn Connector>,
    open_timeout: Duration,
    close_timeout: Duration,
    channel: Option<Box<dyn Channel>>,
    status: watch::Sender<ConnectionStatus>,
}

impl AudioReceiver {
    pub fn new(device: Arc<dyn Device>, connector: Arc<dyn Connector>, config: &SinkConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Unassigned);
        let receiver = AudioReceiver {
            device,
            connector,
            open_timeout: config.open_timeout(),
            close_timeout: config.close_timeout(),
            channel: None,
            status,
        };

        receiver.set_status(ConnectionStatus::Disconnected);
        receiver
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Follows status changes. The first value seen is the current one.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub async fn connect(&mut self, psm: u16) -> Result<(), ConnectError> {
        if self.channel.is_some() {
            return Err(ConnectError::AlreadyOpen);
        }

        let remote = self.device.remote_address();
        match link::open(&self.connector, &self.device, psm, self.open_timeout).await {
            Ok(channel) => {
                debug!(target: AVDTP_FLOW, "opened AVDTP link to {} on PSM {}", remote, psm);
                self.channel = Some(channel);
                self.set_status(ConnectionStatus::Idle);
                Ok(())
            }
            Err(err) => {
                error!(target: AVDTP_FLOW, "failed to open AVDTP link to {}: {}", remote, err);
                Err(err)
            }
        }
    }

    /// Closes the link. Succeeds when it was already closed; the status is
    /// `Disconnected` afterwards whatever the outcome.
    pub async fn disconnect(&mut self) -> Result<(), DisconnectError> {
        let result = match self.channel.take() {
            Some(channel) => {
                let result = link::close(channel, self.close_timeout).await;
                match &result {
                    Ok(()) => debug!(target: AVDTP_FLOW, "closed AVDTP link"),
                    Err(err) => error!(target: AVDTP_FLOW, "failed to close AVDTP link: {}", err),
                }
                result
            }
            None => Ok(()),
        };

        self.set_status(ConnectionStatus::Disconnected);
        result
    }

    fn set_status(&self, status: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });

        if changed {
            info!(target: AVDTP_FLOW, "audio sink status: {:?}", status);
        }
    }
}

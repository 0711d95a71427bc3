//! The audio sink: one assigned device at a time, explored over SDP and
//! connected over AVDTP when it turns out to be an A2DP sink.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::info;

use crate::communication::transport::{Connector, L2capConnector};
use crate::config::SinkConfig;
use crate::device::Controller;
use crate::dispatch::Dispatcher;
use crate::Address;

pub use error::{AttachError, ConnectError, DisconnectError, DiscoveryError};
pub use explorer::{ServiceExplorer, ServicesHandler};
pub use orchestrator::SinkOrchestrator;
pub use receiver::AudioReceiver;
pub use service::{AudioFeature, AudioFeatures, AudioService, Role, Version};

pub mod error;
mod explorer;
mod link;
mod orchestrator;
mod receiver;
mod service;

pub(crate) const SDP_FLOW: &str = "bluez_audio_sink::sdp";
pub(crate) const AVDTP_FLOW: &str = "bluez_audio_sink::avdtp";
pub(crate) const A2DP_FLOW: &str = "bluez_audio_sink::a2dp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// No device is assigned.
    Unassigned,
    /// A device is assigned but no AVDTP link is open.
    Disconnected,
    /// The AVDTP link is open and no stream is configured.
    Idle,
}

struct Assignment {
    address: Address,
    sink: SinkOrchestrator,
}

/// Accepts one device at a time and keeps it connected as an audio sink for
/// as long as it stays assigned.
pub struct AudioSink {
    controller: Arc<dyn Controller>,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    config: SinkConfig,
    assigned: Mutex<Option<Assignment>>,
}

impl AudioSink {
    pub fn new(
        controller: Arc<dyn Controller>,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        config: SinkConfig,
    ) -> Self {
        AudioSink {
            controller,
            connector,
            dispatcher,
            config,
            assigned: Mutex::new(None),
        }
    }

    /// An audio sink reaching devices through kernel L2CAP sockets.
    pub fn with_l2cap(controller: Arc<dyn Controller>, dispatcher: Dispatcher, config: SinkConfig) -> Self {
        Self::new(controller, Arc::new(L2capConnector), dispatcher, config)
    }

    fn assigned(&self) -> MutexGuard<'_, Option<Assignment>> {
        self.assigned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts managing the device with the given address, in the
    /// `XX:XX:XX:XX:XX:XX` form.
    pub fn assign(&self, device: &str) -> Result<(), AttachError> {
        let address: Address = device.parse()?;

        let mut assigned = self.assigned();
        if assigned.is_some() {
            return Err(AttachError::AlreadyAssigned);
        }

        let device = self
            .controller
            .device(&address)
            .ok_or(AttachError::DeviceUnavailable)?;
        let sink = SinkOrchestrator::new(device, self.connector.clone(), self.dispatcher.clone(), &self.config)?;

        info!(target: A2DP_FLOW, "assigned {}", address);
        *assigned = Some(Assignment { address, sink });
        Ok(())
    }

    /// Stops managing the device and closes its links.
    pub async fn revoke(&self, device: &str) -> Result<(), AttachError> {
        let address: Address = device.parse()?;

        let assignment = {
            let mut assigned = self.assigned();
            match assigned.as_ref() {
                Some(assignment) if assignment.address == address => assigned.take(),
                _ => None,
            }
        }
        .ok_or(AttachError::NotAssigned)?;

        assignment.sink.close().await;
        info!(target: A2DP_FLOW, "revoked {}", address);
        Ok(())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.assigned()
            .as_ref()
            .map(|assignment| assignment.sink.status())
            .unwrap_or(ConnectionStatus::Unassigned)
    }

    /// Follows the status of the assigned device, if there is one.
    pub fn subscribe(&self) -> Option<watch::Receiver<ConnectionStatus>> {
        self.assigned()
            .as_ref()
            .map(|assignment| assignment.sink.subscribe())
    }
}

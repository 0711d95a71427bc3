use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::error::AttachError;
use super::explorer::{ServiceExplorer, ServicesHandler};
use super::receiver::AudioReceiver;
use super::service::{AudioService, Role};
use super::{ConnectionStatus, A2DP_FLOW};
use crate::communication::transport::Connector;
use crate::config::SinkConfig;
use crate::device::Device;
use crate::dispatch::Dispatcher;

struct State {
    service: AudioService,
    explorer: ServiceExplorer,
    receiver: AudioReceiver,
    closed: bool,
}

struct Inner {
    device: Arc<dyn Device>,
    dispatcher: Dispatcher,
    status: watch::Receiver<ConnectionStatus>,
    state: Mutex<State>,
}

/// Drives one device from "connected" to an open AVDTP link: discovers its
/// audio service once per connection and connects to it when it is a sink.
pub struct SinkOrchestrator {
    inner: Arc<Inner>,
    observing: bool,
}

impl SinkOrchestrator {
    /// Starts observing `device`. Its current state is evaluated right away,
    /// so a device that is already connected is explored without waiting for
    /// a notification.
    pub fn new(
        device: Arc<dyn Device>,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        config: &SinkConfig,
    ) -> Result<Self, AttachError> {
        let explorer = ServiceExplorer::new(device.clone(), connector.clone(), dispatcher.clone(), config);
        let receiver = AudioReceiver::new(device.clone(), connector, config);

        let inner = Arc::new(Inner {
            device: device.clone(),
            dispatcher,
            status: receiver.subscribe(),
            state: Mutex::new(State {
                service: AudioService::default(),
                explorer,
                receiver,
                closed: false,
            }),
        });

        let observer = Arc::downgrade(&inner);
        device
            .register_update_callback(Box::new(move || Inner::schedule_update(&observer)))
            .map_err(|err| {
                error!(target: A2DP_FLOW, "cannot observe {}: {}", device.remote_address(), err);
                AttachError::ObserverInstallFailed(err)
            })?;

        Inner::schedule_update(&Arc::downgrade(&inner));

        Ok(SinkOrchestrator {
            inner,
            observing: true,
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.clone()
    }

    /// What is known about the device's audio service right now.
    pub async fn service(&self) -> AudioService {
        self.inner.state.lock().await.service
    }

    /// Stops observing the device and closes both links.
    pub async fn close(mut self) {
        self.stop_observing();

        let mut state = self.inner.state.lock().await;
        state.closed = true;
        state.service = AudioService::default();
        let _ = state.explorer.disconnect().await;
        let _ = state.receiver.disconnect().await;
    }

    fn stop_observing(&mut self) {
        if !std::mem::replace(&mut self.observing, false) {
            return;
        }

        if let Err(err) = self.inner.device.unregister_update_callback() {
            warn!(target: A2DP_FLOW, "could not stop observing the device: {}", err);
        }
    }
}

impl Drop for SinkOrchestrator {
    fn drop(&mut self) {
        self.stop_observing();
    }
}

impl Inner {
    // called on whatever thread the device notifies from
    fn schedule_update(this: &Weak<Inner>) {
        let inner = match this.upgrade() {
            Some(inner) => inner,
            None => return,
        };

        let dispatcher = inner.dispatcher.clone();
        if let Err(err) = dispatcher.submit(async move { inner.device_updated().await }) {
            warn!(target: A2DP_FLOW, "dropping device update: {}", err);
        }
    }

    fn services_handler(self: &Arc<Self>) -> ServicesHandler {
        let this = Arc::downgrade(self);
        Arc::new(move |services: Vec<AudioService>| {
            let this = this.clone();
            async move {
                if let Some(inner) = this.upgrade() {
                    inner.services_discovered(services).await;
                }
            }
            .boxed()
        })
    }

    async fn device_updated(self: &Arc<Self>) {
        let remote = self.device.remote_address();
        if !self.device.is_bonded() {
            debug!(target: A2DP_FLOW, "ignoring update of unbonded device {}", remote);
            return;
        }

        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }

        if !self.device.is_connected() {
            debug!(target: A2DP_FLOW, "{} disconnected", remote);
            state.service = AudioService::default();
            let _ = state.explorer.disconnect().await;
            let _ = state.receiver.disconnect().await;
            return;
        }

        match state.service.role() {
            Role::Unknown => {
                if state.explorer.is_open().await {
                    debug!(target: A2DP_FLOW, "discovery on {} is already running", remote);
                    return;
                }

                // failures are logged by the explorer; the next update retries
                if state.explorer.connect().await.is_ok() {
                    state.explorer.discover(self.services_handler()).await;
                }
            }
            Role::Sink => {
                if !state.receiver.is_open() {
                    let psm = state.service.psm();
                    let _ = state.receiver.connect(psm).await;
                }
            }
            Role::Source | Role::Neither => {
                info!(target: A2DP_FLOW, "{} is not an audio sink", remote);
            }
        }
    }

    async fn services_discovered(&self, services: Vec<AudioService>) {
        debug_assert!(!services.is_empty());
        let remote = self.device.remote_address();

        let mut state = self.state.lock().await;
        if state.closed || !self.device.is_connected() {
            debug!(target: A2DP_FLOW, "discarding services of {}, it is gone", remote);
            return;
        }

        let _ = state.explorer.disconnect().await;

        if services.len() > 1 {
            info!(
                target: A2DP_FLOW,
                "{} offers {} audio sink services, picking one",
                remote,
                services.len()
            );
        }

        let service = match services
            .iter()
            .find(|service| service.role() == Role::Sink)
            .or_else(|| services.first())
        {
            Some(service) => *service,
            None => return,
        };

        info!(
            target: A2DP_FLOW,
            "{} is a {:?} on PSM {} (AVDTP {}, A2DP {}, features {:?})",
            remote,
            service.role(),
            service.psm(),
            service.transport_version(),
            service.profile_version(),
            service.features()
        );

        state.service = service;
        if service.role() == Role::Sink {
            let _ = state.receiver.connect(service.psm()).await;
        }
    }
}

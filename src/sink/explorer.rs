use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::error::{ConnectError, DisconnectError, DiscoveryError};
use super::link;
use super::service::AudioService;
use super::SDP_FLOW;
use crate::communication::discovery::{
    class, ServiceAttributeRange, ServiceDiscoveryClient, ServiceRecord, SDP_PSM,
};
use crate::communication::transport::{Channel, Connector};
use crate::config::SinkConfig;
use crate::device::Device;
use crate::dispatch::Dispatcher;
use crate::Address;

type Client = ServiceDiscoveryClient<Box<dyn Channel>>;

/// Receives the audio sink services found by a discovery round. Never called
/// with an empty list.
pub type ServicesHandler = Arc<dyn Fn(Vec<AudioService>) -> BoxFuture<'static, ()> + Send + Sync>;

struct Session {
    client: Option<Client>,
    // bumped whenever the link changes, so a round that outlives its link
    // knows not to report
    round: u64,
    discovering: bool,
}

#[derive(Clone, Copy)]
struct Timeouts {
    open: Duration,
    close: Duration,
    discovery: Duration,
}

/// Runs SDP against one device: opens the link, asks for A2DP sink records
/// in the background and hands the usable ones to a callback.
pub struct ServiceExplorer {
    device: Arc<dyn Device>,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    timeouts: Timeouts,
    max_attribute_bytes: u16,
    session: Arc<Mutex<Session>>,
}

impl ServiceExplorer {
    pub fn new(
        device: Arc<dyn Device>,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        config: &SinkConfig,
    ) -> Self {
        ServiceExplorer {
            device,
            connector,
            dispatcher,
            timeouts: Timeouts {
                open: config.open_timeout(),
                close: config.close_timeout(),
                discovery: config.discovery_timeout(),
            },
            max_attribute_bytes: config.max_attribute_bytes,
            session: Arc::new(Mutex::new(Session {
                client: None,
                round: 0,
                discovering: false,
            })),
        }
    }

    /// True while the SDP link is open or a discovery round is using it.
    pub async fn is_open(&self) -> bool {
        let session = self.session.lock().await;
        session.client.is_some() || session.discovering
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        let mut session = self.session.lock().await;
        if session.client.is_some() || session.discovering {
            return Err(ConnectError::AlreadyOpen);
        }

        let remote = self.device.remote_address();
        match link::open(&self.connector, &self.device, SDP_PSM, self.timeouts.open).await {
            Ok(channel) => {
                session.client = Some(ServiceDiscoveryClient::new(channel));
                session.round += 1;
                debug!(target: SDP_FLOW, "opened SDP link to {}", remote);
                Ok(())
            }
            Err(err) => {
                error!(target: SDP_FLOW, "failed to open SDP link to {}: {}", remote, err);
                Err(err)
            }
        }
    }

    /// Closes the link. A round still in flight is abandoned: it closes the
    /// link itself and does not report. Closing a closed explorer succeeds.
    pub async fn disconnect(&self) -> Result<(), DisconnectError> {
        let mut session = self.session.lock().await;
        session.round += 1;
        if session.discovering {
            debug!(target: SDP_FLOW, "abandoning discovery in progress");
            session.discovering = false;
        }

        let client = match session.client.take() {
            Some(client) => client,
            None => return Ok(()),
        };

        let remote = self.device.remote_address();
        match link::close(client.into_inner(), self.timeouts.close).await {
            Ok(()) => {
                debug!(target: SDP_FLOW, "closed SDP link to {}", remote);
                Ok(())
            }
            Err(err) => {
                error!(target: SDP_FLOW, "failed to close SDP link to {}: {}", remote, err);
                Err(err)
            }
        }
    }

    /// Starts a discovery round in the background and returns at once. Does
    /// nothing unless the link is open and idle.
    pub async fn discover(&self, handler: ServicesHandler) {
        let mut session = self.session.lock().await;
        if session.discovering {
            debug!(target: SDP_FLOW, "discovery already in progress");
            return;
        }

        let client = match session.client.take() {
            Some(client) => client,
            None => {
                warn!(target: SDP_FLOW, "cannot discover services, the SDP link is not open");
                return;
            }
        };

        let round = Round {
            id: session.round,
            remote: self.device.remote_address(),
            session: self.session.clone(),
            dispatcher: self.dispatcher.clone(),
            timeouts: self.timeouts,
            max_attribute_bytes: self.max_attribute_bytes,
        };

        session.discovering = true;
        if let Err(err) = self.dispatcher.submit(round.run(client, handler)) {
            error!(target: SDP_FLOW, "could not schedule discovery: {}", err);
            session.discovering = false;
        }
    }
}

/// One discovery query and everything that follows from its outcome.
struct Round {
    id: u64,
    remote: Address,
    session: Arc<Mutex<Session>>,
    dispatcher: Dispatcher,
    timeouts: Timeouts,
    max_attribute_bytes: u16,
}

impl Round {
    async fn run(self, mut client: Client, handler: ServicesHandler) {
        debug!(target: SDP_FLOW, "querying {} for audio sink services", self.remote);

        let query = client.service_search_attribute(
            vec![class::AUDIO_SINK.into()],
            self.max_attribute_bytes,
            vec![ServiceAttributeRange::ALL],
        );
        let outcome = match tokio::time::timeout(self.timeouts.discovery, query).await {
            Ok(Ok(records)) => Ok(records),
            Ok(Err(err)) => Err(DiscoveryError::from(err)),
            Err(_) => Err(DiscoveryError::Timeout),
        };

        let services = outcome.and_then(|records| {
            let services: Vec<AudioService> = records
                .iter()
                .filter(|record| record.is_class_supported(class::AUDIO_SINK))
                .inspect(|record| dump(record))
                .map(AudioService::from_record)
                .collect();

            if services.is_empty() {
                Err(DiscoveryError::NoMatchingService)
            } else {
                Ok(services)
            }
        });

        let mut session = self.session.lock().await;
        if session.round != self.id {
            drop(session);
            debug!(target: SDP_FLOW, "discovery on {} outlived its link", self.remote);
            let _ = link::close(client.into_inner(), self.timeouts.close).await;
            return;
        }
        session.discovering = false;

        match services {
            Ok(services) => {
                info!(
                    target: SDP_FLOW,
                    "{} offers {} audio sink service(s)",
                    self.remote,
                    services.len()
                );
                match self.dispatcher.submit(handler(services)) {
                    Ok(()) => session.client = Some(client),
                    Err(err) => {
                        error!(target: SDP_FLOW, "could not report discovered services: {}", err);
                        session.round += 1;
                        drop(session);
                        let _ = link::close(client.into_inner(), self.timeouts.close).await;
                    }
                }
            }
            Err(err) => {
                match &err {
                    DiscoveryError::NoMatchingService => info!(target: SDP_FLOW, "{}: {}", self.remote, err),
                    _ => error!(target: SDP_FLOW, "discovery on {} failed: {}", self.remote, err),
                }

                // nobody is told about this round, so nobody else would close
                // the link
                session.round += 1;
                drop(session);
                let _ = link::close(client.into_inner(), self.timeouts.close).await;
            }
        }
    }
}

fn dump(record: &ServiceRecord) {
    debug!(target: SDP_FLOW, "record {:08x?}", record.handle());
    for class in record.classes() {
        debug!(target: SDP_FLOW, "  class {:?}", class);
    }
    for profile in record.profiles() {
        debug!(
            target: SDP_FLOW,
            "  profile {:?} version {}.{}",
            profile.profile,
            profile.version >> 8,
            profile.version & 0xFF
        );
    }
    for protocol in record.protocols() {
        debug!(target: SDP_FLOW, "  protocol {:?} {:?}", protocol.protocol, protocol.parameters);
    }
}

//! Fakes shared by the unit tests: a scripted SDP server, a device and
//! controller whose state the test drives, and a connector that hands out
//! in-memory channels.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::communication::discovery::error::ErrorCode;
use crate::communication::discovery::serialization::{DataElement, PduId, ToBuf};
use crate::communication::discovery::{class, parse_attribute_lists, ServiceRecord, SDP_PSM};
use crate::communication::transport::{Channel, Connector};
use crate::communication::Uuid16;
use crate::device::{Controller, Device, ObserverError, UpdateHandler};
use crate::{Address, AddressType};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds, giving up after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Gives dispatched jobs time to run before asserting that nothing happened.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

pub struct RecordBuilder {
    handle: u32,
    classes: Vec<Uuid16>,
    psm: Option<u16>,
    avdtp: Option<u16>,
    profile: Option<u16>,
    features: Option<u16>,
}

impl RecordBuilder {
    pub fn sink() -> Self {
        Self::with_classes(&[class::AUDIO_SINK])
    }

    pub fn with_classes(classes: &[Uuid16]) -> Self {
        RecordBuilder {
            handle: 0x0001_0001,
            classes: classes.to_vec(),
            psm: None,
            avdtp: None,
            profile: Some(0x0103),
            features: None,
        }
    }

    pub fn psm(mut self, psm: u16) -> Self {
        self.psm = Some(psm);
        self
    }

    pub fn avdtp(mut self, version: u16) -> Self {
        self.avdtp = Some(version);
        self
    }

    pub fn features(mut self, features: u16) -> Self {
        self.features = Some(features);
        self
    }

    /// The attribute list of one record, as an SDP server sends it.
    pub fn build(self) -> DataElement {
        let mut pairs = vec![
            DataElement::Uint16(0x0000),
            DataElement::Uint32(self.handle),
            DataElement::Uint16(0x0001),
            DataElement::Sequence(self.classes.iter().map(|c| DataElement::Uuid16(*c)).collect()),
        ];

        let mut protocols = vec![];
        if let Some(psm) = self.psm {
            protocols.push(DataElement::Sequence(vec![
                DataElement::Uuid16(class::L2CAP),
                DataElement::Uint16(psm),
            ]));
        }
        if let Some(version) = self.avdtp {
            protocols.push(DataElement::Sequence(vec![
                DataElement::Uuid16(class::AVDTP),
                DataElement::Uint16(version),
            ]));
        }
        if !protocols.is_empty() {
            pairs.push(DataElement::Uint16(0x0004));
            pairs.push(DataElement::Sequence(protocols));
        }

        if let Some(version) = self.profile {
            pairs.push(DataElement::Uint16(0x0009));
            pairs.push(DataElement::Sequence(vec![DataElement::Sequence(vec![
                DataElement::Uuid16(class::ADVANCED_AUDIO_DISTRIBUTION),
                DataElement::Uint16(version),
            ])]));
        }

        if let Some(features) = self.features {
            pairs.push(DataElement::Uint16(0x0311));
            pairs.push(DataElement::Uint16(features));
        }

        DataElement::Sequence(pairs)
    }
}

pub fn sink_record(psm: u16, avdtp_version: u16) -> DataElement {
    RecordBuilder::sink().psm(psm).avdtp(avdtp_version).build()
}

pub fn source_record(psm: u16, avdtp_version: u16) -> DataElement {
    RecordBuilder::with_classes(&[class::AUDIO_SOURCE])
        .psm(psm)
        .avdtp(avdtp_version)
        .build()
}

pub fn service_record(attributes: DataElement) -> ServiceRecord {
    let mut buf = BytesMut::new();
    DataElement::Sequence(vec![attributes]).to_buf(&mut buf);
    parse_attribute_lists(&mut buf.freeze()).unwrap().remove(0)
}

#[derive(Debug, Clone)]
enum Reply {
    Records(Vec<DataElement>),
    Error(ErrorCode),
    Silent,
}

/// What the fake SDP server answers to every service search attribute
/// request.
#[derive(Debug, Clone)]
pub struct ScriptedSdpServer {
    reply: Reply,
    fragment: Option<usize>,
    delay: Option<Duration>,
}

impl ScriptedSdpServer {
    pub fn records(records: Vec<DataElement>) -> Self {
        ScriptedSdpServer {
            reply: Reply::Records(records),
            fragment: None,
            delay: None,
        }
    }

    pub fn error(code: ErrorCode) -> Self {
        ScriptedSdpServer {
            reply: Reply::Error(code),
            fragment: None,
            delay: None,
        }
    }

    /// Reads requests but never answers.
    pub fn silent() -> Self {
        ScriptedSdpServer {
            reply: Reply::Silent,
            fragment: None,
            delay: None,
        }
    }

    /// Sends the attribute lists at most `size` bytes at a time.
    pub fn fragmented(mut self, size: usize) -> Self {
        self.fragment = Some(size);
        self
    }

    /// Waits `delay` before answering each request.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Number of requests the fake SDP servers sharing it have received.
#[derive(Debug, Clone, Default)]
pub struct RequestCounter(Arc<AtomicUsize>);

impl RequestCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn sdp_server(stream: DuplexStream, script: ScriptedSdpServer) -> RequestCounter {
    let requests = RequestCounter::default();
    serve_sdp(stream, script, requests.clone());
    requests
}

// the continuation state this server hands out is the offset to resume from
fn continuation_offset(mut parameter: &[u8]) -> usize {
    let _ = DataElement::from_buf(&mut parameter).unwrap();
    parameter.advance(2);
    let _ = DataElement::from_buf(&mut parameter).unwrap();
    match parameter.get_u8() {
        2 => parameter.get_u16() as usize,
        _ => 0,
    }
}

fn serve_sdp(mut stream: DuplexStream, script: ScriptedSdpServer, requests: RequestCounter) {
    tokio::spawn(async move {
        let mut lists = BytesMut::new();
        if let Reply::Records(records) = &script.reply {
            DataElement::Sequence(records.clone()).to_buf(&mut lists);
        }
        let lists = lists.freeze();

        loop {
            let mut header = [0u8; 5];
            if stream.read_exact(&mut header).await.is_err() {
                break;
            }
            let txn = u16::from_be_bytes([header[1], header[2]]);
            let size = u16::from_be_bytes([header[3], header[4]]) as usize;

            let mut parameter = vec![0u8; size];
            if stream.read_exact(&mut parameter).await.is_err() {
                break;
            }
            requests.0.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = script.delay {
                tokio::time::sleep(delay).await;
            }

            let mut response = BytesMut::new();
            let id = match &script.reply {
                Reply::Silent => continue,
                Reply::Error(code) => {
                    response.put_u16(*code as u16);
                    PduId::ErrorResponse
                }
                Reply::Records(_) => {
                    let start = continuation_offset(&parameter);
                    let end = match script.fragment {
                        Some(size) => (start + size).min(lists.len()),
                        None => lists.len(),
                    };

                    response.put_u16((end - start) as u16);
                    response.put_slice(&lists[start..end]);
                    if end < lists.len() {
                        response.put_u8(2);
                        response.put_u16(end as u16);
                    } else {
                        response.put_u8(0);
                    }
                    PduId::ServiceSearchAttributeResponse
                }
            };

            let mut pdu = BytesMut::new();
            pdu.put_u8(id as u8);
            pdu.put_u16(txn);
            pdu.put_u16(response.len() as u16);
            pdu.put_slice(&response);
            if stream.write_all(&pdu).await.is_err() {
                break;
            }
        }
    });
}

pub struct FakeDevice {
    remote: Address,
    bonded: AtomicBool,
    connected: AtomicBool,
    handler: Mutex<Option<UpdateHandler>>,
}

impl FakeDevice {
    /// A bonded device that is not connected yet.
    pub fn new(remote: &str) -> Arc<Self> {
        Arc::new(FakeDevice {
            remote: remote.parse().unwrap(),
            bonded: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            handler: Mutex::new(None),
        })
    }

    pub fn set_bonded(&self, bonded: bool) {
        self.bonded.store(bonded, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    /// Invokes the installed handler, as the stack does after any change.
    pub fn notify(&self) {
        if let Some(handler) = self.handler.lock().unwrap().as_ref() {
            handler();
        }
    }
}

impl Device for FakeDevice {
    fn is_bonded(&self) -> bool {
        self.bonded.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn local_address(&self) -> Address {
        Address::new([0x01, 0x00, 0x00, 0x00, 0x00, 0x00])
    }

    fn remote_address(&self) -> Address {
        self.remote
    }

    fn address_type(&self) -> AddressType {
        AddressType::BREDR
    }

    fn register_update_callback(&self, handler: UpdateHandler) -> Result<(), ObserverError> {
        let mut slot = self.handler.lock().unwrap();
        if slot.is_some() {
            return Err(ObserverError::AlreadyRegistered);
        }
        *slot = Some(handler);
        Ok(())
    }

    fn unregister_update_callback(&self) -> Result<(), ObserverError> {
        self.handler
            .lock()
            .unwrap()
            .take()
            .map(|_| ())
            .ok_or(ObserverError::NotRegistered)
    }
}

#[derive(Default)]
pub struct FakeController {
    devices: Mutex<HashMap<Address, Arc<FakeDevice>>>,
}

impl FakeController {
    pub fn with_device(device: Arc<FakeDevice>) -> Arc<Self> {
        let controller = FakeController::default();
        controller
            .devices
            .lock()
            .unwrap()
            .insert(device.remote_address(), device);
        Arc::new(controller)
    }
}

impl Controller for FakeController {
    fn device(&self, address: &Address) -> Option<Arc<dyn Device>> {
        self.devices
            .lock()
            .unwrap()
            .get(address)
            .map(|device| device.clone() as Arc<dyn Device>)
    }
}

/// Serves SDP from a [`ScriptedSdpServer`] and accepts every other PSM with
/// a channel nobody reads from.
pub struct FakeConnector {
    script: Mutex<ScriptedSdpServer>,
    refused: Mutex<HashSet<u16>>,
    hanging: Mutex<HashSet<u16>>,
    connects: Mutex<Vec<u16>>,
    local_addresses: Mutex<Vec<Address>>,
    peers: Mutex<Vec<DuplexStream>>,
    sdp_requests: RequestCounter,
}

impl FakeConnector {
    pub fn new(script: ScriptedSdpServer) -> Arc<Self> {
        Arc::new(FakeConnector {
            script: Mutex::new(script),
            refused: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            connects: Mutex::new(vec![]),
            local_addresses: Mutex::new(vec![]),
            peers: Mutex::new(vec![]),
            sdp_requests: RequestCounter::default(),
        })
    }

    pub fn set_script(&self, script: ScriptedSdpServer) {
        *self.script.lock().unwrap() = script;
    }

    pub fn refuse(&self, psm: u16) {
        self.refused.lock().unwrap().insert(psm);
    }

    /// Connections to `psm` never complete.
    pub fn hang(&self, psm: u16) {
        self.hanging.lock().unwrap().insert(psm);
    }

    /// Number of connection attempts to `psm`, failed ones included.
    pub fn connects(&self, psm: u16) -> usize {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .filter(|p| **p == psm)
            .count()
    }

    /// The adapter addresses connections were opened from, in order.
    pub fn local_addresses(&self) -> Vec<Address> {
        self.local_addresses.lock().unwrap().clone()
    }

    pub fn sdp_requests(&self) -> usize {
        self.sdp_requests.count()
    }
}

impl Connector for FakeConnector {
    fn connect(
        &self,
        local: Address,
        _remote: Address,
        _address_type: AddressType,
        psm: u16,
    ) -> BoxFuture<'static, std::io::Result<Box<dyn Channel>>> {
        self.connects.lock().unwrap().push(psm);
        self.local_addresses.lock().unwrap().push(local);

        if self.refused.lock().unwrap().contains(&psm) {
            return async {
                Err(std::io::Error::from(
                    std::io::ErrorKind::ConnectionRefused,
                ))
            }
            .boxed();
        }

        if self.hanging.lock().unwrap().contains(&psm) {
            return futures::future::pending().boxed();
        }

        let (channel, peer) = tokio::io::duplex(4096);
        if psm == SDP_PSM {
            let script = self.script.lock().unwrap().clone();
            serve_sdp(peer, script, self.sdp_requests.clone());
        } else {
            self.peers.lock().unwrap().push(peer);
        }

        async move { Ok(Box::new(channel) as Box<dyn Channel>) }.boxed()
    }
}

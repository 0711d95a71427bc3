use std::collections::HashMap;
use std::fmt::Debug;

use super::{Uuid, Uuid16};
use error::ErrorCode;
use serialization::{DataElement, Pdu, PduId, ToBuf, PDU_HEADER_SIZE};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub use error::Error;
pub use record::{ProfileDescriptor, ProtocolDescriptor, ServiceRecord};

pub mod error;
mod record;
pub mod serialization;

pub const SDP_PSM: u16 = 0x0001;
pub const SDP_BROWSE_ROOT: Uuid16 = Uuid16(0x1002);

/// Protocol and service class identifiers referenced by the audio profiles.
pub mod class {
    use crate::communication::Uuid16;

    pub const L2CAP: Uuid16 = Uuid16(0x0100);
    pub const AVDTP: Uuid16 = Uuid16(0x0019);
    pub const AUDIO_SOURCE: Uuid16 = Uuid16(0x110A);
    pub const AUDIO_SINK: Uuid16 = Uuid16(0x110B);
    pub const ADVANCED_AUDIO_DISTRIBUTION: Uuid16 = Uuid16(0x110D);
}

// continuation state is never longer than this on the wire
const MAX_CONTINUATION_STATE: usize = 16;

/// A response is accepted while its attribute lists total at most this many
/// times the byte count asked for per PDU.
const MAX_FRAGMENTS: usize = 16;

// reads are buffered so that a whole seqpacket lands in the buffer at once
const RECEIVE_BUFFER: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAttributeRange {
    Single(ServiceAttributeId),
    Range(ServiceAttributeId, ServiceAttributeId),
}

impl ServiceAttributeRange {
    pub const ALL: Self = Self::Range(ServiceAttributeId(0), ServiceAttributeId(u16::MAX));
}

#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct ServiceAttributeId(pub u16);

impl Debug for ServiceAttributeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x?}", self.0)
    }
}

impl ServiceAttributeId {
    pub const SERVICE_RECORD_HANDLE: Self = Self(0x0000);
    pub const SERVICE_CLASS_ID_LIST: Self = Self(0x0001);
    pub const SERVICE_RECORD_STATE: Self = Self(0x0002);
    pub const SERVICE_ID: Self = Self(0x0003);
    pub const PROTOCOL_DESCRIPTOR_LIST: Self = Self(0x0004);
    pub const BROWSE_GROUP_LIST: Self = Self(0x0005);
    pub const LANGUAGE_BASE_ATTRIBUTE_ID_LIST: Self = Self(0x0006);
    pub const SERVICE_INFO_TIME_TO_LIVE: Self = Self(0x0007);
    pub const SERVICE_AVAILABILITY: Self = Self(0x0008);
    pub const BLUETOOTH_PROFILE_DESCRIPTOR_LIST: Self = Self(0x0009);
    pub const DOCUMENTATION_URL: Self = Self(0x000A);
    pub const CLIENT_EXECUTABLE_URL: Self = Self(0x000B);
    pub const ICON_URL: Self = Self(0x000C);
    pub const ADDITIONAL_PROTOCOL_DESCRIPTOR_LISTS: Self = Self(0x000D);
}

fn uuid_element(uuid: Uuid) -> DataElement {
    match uuid {
        Uuid::Uuid16(u) => DataElement::Uuid16(u),
        Uuid::Uuid32(u) => DataElement::Uuid32(u),
        Uuid::Uuid128(u) => DataElement::Uuid128(u),
    }
}

fn attribute_range_element(range: ServiceAttributeRange) -> DataElement {
    match range {
        ServiceAttributeRange::Single(item) => DataElement::Uint16(item.0),
        ServiceAttributeRange::Range(start, end) => {
            DataElement::Uint32(((start.0 as u32) << 16) | end.0 as u32)
        }
    }
}

fn get_continuation_state<B: Buf>(buf: &mut B) -> Result<Vec<u8>, Error> {
    if !buf.has_remaining() {
        return Err(Error::InvalidResponse);
    }

    let size = buf.get_u8() as usize;
    if size > MAX_CONTINUATION_STATE || buf.remaining() < size {
        return Err(Error::InvalidResponse);
    }

    let mut state = vec![0u8; size];
    buf.copy_to_slice(&mut state[..]);
    Ok(state)
}

pub(crate) struct ServiceSearchAttributeRequest {
    pub(crate) service_search_pattern: Vec<Uuid>,
    pub(crate) maximum_attribute_byte_count: u16,
    pub(crate) attribute_id_list: Vec<ServiceAttributeRange>,
    pub(crate) continuation_state: Vec<u8>,
}

impl ToBuf for ServiceSearchAttributeRequest {
    fn to_buf<B: BufMut>(&self, buf: &mut B) {
        let service_search_pat = DataElement::Sequence(
            self.service_search_pattern
                .iter()
                .map(|u| uuid_element(*u))
                .collect(),
        );
        service_search_pat.to_buf(buf);

        buf.put_u16(self.maximum_attribute_byte_count);

        let attribute_id_list = DataElement::Sequence(
            self.attribute_id_list
                .iter()
                .map(|range| attribute_range_element(*range))
                .collect(),
        );
        attribute_id_list.to_buf(buf);

        buf.put_u8(self.continuation_state.len() as u8);
        buf.put(self.continuation_state.as_ref());
    }
}

/// One fragment of a service search attribute response. The attribute lists
/// of all fragments are concatenated before they are decoded.
#[derive(Debug, Clone)]
pub(crate) struct ServiceSearchAttributeResponse {
    pub(crate) attribute_lists: Bytes,
    pub(crate) continuation_state: Vec<u8>,
}

impl ServiceSearchAttributeResponse {
    fn from_buf<B: Buf>(buf: &mut B) -> Result<Self, Error> {
        if buf.remaining() < 2 {
            return Err(Error::InvalidResponse);
        }

        let byte_count = buf.get_u16() as usize;
        if buf.remaining() < byte_count {
            return Err(Error::InvalidResponse);
        }

        Ok(Self {
            attribute_lists: buf.copy_to_bytes(byte_count),
            continuation_state: get_continuation_state(buf)?,
        })
    }
}

/// Decodes the complete `AttributeLists` parameter: a sequence holding one
/// sequence of (id, value) pairs per matching record.
pub(crate) fn parse_attribute_lists<B: Buf>(buf: &mut B) -> Result<Vec<ServiceRecord>, Error> {
    let lists = match DataElement::from_buf(buf)? {
        DataElement::Sequence(lists) => lists,
        _ => return Err(Error::InvalidResponse),
    };

    lists
        .into_iter()
        .map(|list| {
            let pairs = match list {
                DataElement::Sequence(pairs) => pairs,
                _ => return Err(Error::InvalidResponse),
            };

            if pairs.len() % 2 != 0 {
                return Err(Error::InvalidResponse);
            }

            let mut attributes = HashMap::new();

            for pair in pairs.chunks_exact(2) {
                let attribute_id = match pair[0] {
                    DataElement::Uint16(attribute_id) => attribute_id,
                    _ => return Err(Error::InvalidResponse),
                };

                attributes.insert(ServiceAttributeId(attribute_id), pair[1].clone());
            }

            Ok(ServiceRecord::from_attributes(attributes))
        })
        .collect()
}

/// Client side of an SDP connection. Works over any byte stream; in
/// production that is an L2CAP connection to [`SDP_PSM`].
#[derive(Debug)]
pub struct ServiceDiscoveryClient<S> {
    stream: BufReader<S>,
    txn: u16,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ServiceDiscoveryClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::with_capacity(RECEIVE_BUFFER, stream),
            txn: 0,
        }
    }

    async fn send(&mut self, req: Pdu) -> Result<(), Error> {
        let mut buf = BytesMut::new();
        req.to_buf(&mut buf);
        self.stream.write_all(buf.as_ref()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Pdu, Error> {
        let mut header = [0u8; PDU_HEADER_SIZE];
        self.stream.read_exact(&mut header).await?;
        let (id, txn, param_size) = Pdu::parse_header(header)?;

        let mut parameter = vec![0u8; param_size];
        self.stream.read_exact(&mut parameter[..]).await?;

        Ok(Pdu {
            id,
            txn,
            parameter: Bytes::from(parameter),
        })
    }

    fn next_txn(&mut self) -> u16 {
        let txn = self.txn;
        self.txn = self.txn.wrapping_add(1);
        txn
    }

    /// Finds every record matching `service_search_pattern` and retrieves the
    /// requested attributes of each, following continuation states until the
    /// server has sent everything.
    pub async fn service_search_attribute(
        &mut self,
        service_search_pattern: Vec<Uuid>,
        maximum_attribute_byte_count: u16,
        attribute_id_list: Vec<ServiceAttributeRange>,
    ) -> Result<Vec<ServiceRecord>, Error> {
        let limit = maximum_attribute_byte_count as usize * MAX_FRAGMENTS;
        let mut attribute_lists = BytesMut::new();
        let mut continuation_state = vec![];

        loop {
            let req = ServiceSearchAttributeRequest {
                service_search_pattern: service_search_pattern.clone(),
                maximum_attribute_byte_count,
                attribute_id_list: attribute_id_list.clone(),
                continuation_state,
            };

            let txn = self.next_txn();
            self.send(Pdu::with_parameter(
                PduId::ServiceSearchAttributeRequest,
                txn,
                req,
            ))
            .await?;

            let mut res_pdu = self.recv().await?;
            if res_pdu.txn != txn {
                return Err(Error::InvalidResponse);
            }

            match res_pdu.id {
                PduId::ErrorResponse => {
                    return Err(Error::Remote(ErrorCode::from_buf(&mut res_pdu.parameter)?))
                }
                PduId::ServiceSearchAttributeResponse => {
                    let res = ServiceSearchAttributeResponse::from_buf(&mut res_pdu.parameter)?;
                    if attribute_lists.len() + res.attribute_lists.len() > limit {
                        return Err(Error::InvalidResponse);
                    }
                    attribute_lists.extend_from_slice(&res.attribute_lists);

                    if res.continuation_state.is_empty() {
                        break;
                    }

                    continuation_state = res.continuation_state;
                }
                other => return Err(Error::UnexpectedPdu(other)),
            }
        }

        parse_attribute_lists(&mut attribute_lists.freeze())
    }

    /// Gives back the underlying stream, dropping anything still buffered.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_traits::FromPrimitive;

use super::error::Error;
use crate::communication::{Uuid, Uuid128, Uuid16, Uuid32};
use crate::util::BufExt;

pub trait ToBuf {
    fn to_buf<B: BufMut>(&self, buf: &mut B);
}

/// Size of the PDU header: id, transaction id and parameter length.
pub(super) const PDU_HEADER_SIZE: usize = 5;

#[derive(Debug)]
pub(super) struct Pdu {
    pub(super) id: PduId,
    pub(super) txn: u16,
    pub(super) parameter: Bytes,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum PduId {
    ErrorResponse = 0x01,
    ServiceSearchRequest,
    ServiceSearchResponse,
    ServiceAttributeRequest,
    ServiceAttributeResponse,
    ServiceSearchAttributeRequest,
    ServiceSearchAttributeResponse,
}

impl Pdu {
    pub fn with_parameter<F: ToBuf>(id: PduId, txn: u16, parameter: F) -> Self {
        let mut buf = BytesMut::new();
        parameter.to_buf(&mut buf);
        Self {
            id,
            txn,
            parameter: buf.freeze(),
        }
    }

    /// Reads the header fields, returning the PDU id, transaction id and the
    /// length of the parameter that follows.
    pub fn parse_header(header: [u8; PDU_HEADER_SIZE]) -> Result<(PduId, u16, usize), Error> {
        let mut buf = &header[..];
        let id = PduId::from_u8(buf.get_u8()).ok_or(Error::InvalidResponse)?;
        let txn = buf.get_u16();
        let param_size = buf.get_u16() as usize;
        Ok((id, txn, param_size))
    }

    pub fn from_buf<B: Buf>(buf: &mut B) -> Result<Self, Error> {
        if buf.remaining() < PDU_HEADER_SIZE {
            return Err(Error::InvalidResponse);
        }

        let mut header = [0u8; PDU_HEADER_SIZE];
        buf.copy_to_slice(&mut header);
        let (id, txn, param_size) = Self::parse_header(header)?;

        if buf.remaining() < param_size {
            return Err(Error::InvalidResponse);
        }

        Ok(Pdu {
            id,
            txn,
            parameter: buf.copy_to_bytes(param_size),
        })
    }
}

impl ToBuf for Pdu {
    fn to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.id as u8);
        buf.put_u16(self.txn);
        let param_size = self.parameter.len() as u16;
        buf.put_u16(param_size);
        buf.put(&self.parameter[..]);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataElement {
    Nil,
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Uint128(u128),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Uuid16(Uuid16),
    Uuid32(Uuid32),
    Uuid128(Uuid128),
    Bool(bool),
    String(OsString),
    Url(OsString),
    // Data element sequence, a data element whose data field is a sequence of
    // data elements
    Sequence(Vec<DataElement>),
    // Data element alternative, data element whose data field is a sequence of
    // data elements from which one data element is to be selected.
    Alternative(Vec<DataElement>),
}

fn ensure<B: Buf>(buf: &B, size: usize) -> Result<(), Error> {
    if buf.remaining() < size {
        Err(Error::InvalidResponse)
    } else {
        Ok(())
    }
}

fn get_size<B: Buf>(buf: &mut B, size_desc: u8) -> Result<usize, Error> {
    match size_desc {
        5 => {
            ensure(buf, 1)?;
            Ok(buf.get_u8() as usize)
        }
        6 => {
            ensure(buf, 2)?;
            Ok(buf.get_u16() as usize)
        }
        7 => {
            ensure(buf, 4)?;
            Ok(buf.get_u32() as usize)
        }
        _ => Err(Error::InvalidResponse),
    }
}

/// Deepest sequence or alternative nesting accepted from a peer.
pub const MAX_NESTING: usize = 32;

fn get_elements<B: Buf>(buf: &mut B, size: usize, depth: usize) -> Result<Vec<DataElement>, Error> {
    if depth > MAX_NESTING {
        return Err(Error::InvalidResponse);
    }

    ensure(buf, size)?;
    let mut seq_buf = buf.copy_to_bytes(size);
    let mut seq = vec![];

    while seq_buf.has_remaining() {
        seq.push(DataElement::decode(&mut seq_buf, depth)?);
    }

    Ok(seq)
}

impl DataElement {
    /// Decodes one data element. Malformed input from the peer, including
    /// nesting deeper than [`MAX_NESTING`], is reported as
    /// [`Error::InvalidResponse`].
    pub fn from_buf<B: Buf>(buf: &mut B) -> Result<Self, Error> {
        Self::decode(buf, 0)
    }

    fn decode<B: Buf>(buf: &mut B, depth: usize) -> Result<Self, Error> {
        ensure(buf, 1)?;
        let desc = buf.get_u8();
        let type_desc = (desc & 0b11111000) >> 3;
        let size_desc = desc & 0b00000111;

        Ok(match (type_desc, size_desc) {
            (0, _) => Self::Nil,
            (1, 0) => {
                ensure(buf, 1)?;
                Self::Uint8(buf.get_u8())
            }
            (1, 1) => {
                ensure(buf, 2)?;
                Self::Uint16(buf.get_u16())
            }
            (1, 2) => {
                ensure(buf, 4)?;
                Self::Uint32(buf.get_u32())
            }
            (1, 3) => {
                ensure(buf, 8)?;
                Self::Uint64(buf.get_u64())
            }
            (1, 4) => {
                ensure(buf, 16)?;
                Self::Uint128(buf.get_u128())
            }
            (2, 0) => {
                ensure(buf, 1)?;
                Self::Int8(buf.get_i8())
            }
            (2, 1) => {
                ensure(buf, 2)?;
                Self::Int16(buf.get_i16())
            }
            (2, 2) => {
                ensure(buf, 4)?;
                Self::Int32(buf.get_i32())
            }
            (2, 3) => {
                ensure(buf, 8)?;
                Self::Int64(buf.get_i64())
            }
            (2, 4) => {
                ensure(buf, 16)?;
                Self::Int128(buf.get_i128())
            }
            (3, 1) => {
                ensure(buf, 2)?;
                Self::Uuid16(Uuid16(buf.get_u16()))
            }
            (3, 2) => {
                ensure(buf, 4)?;
                Self::Uuid32(Uuid32(buf.get_u32()))
            }
            (3, 4) => {
                ensure(buf, 16)?;
                Self::Uuid128(Uuid128(buf.get_u128()))
            }
            (4, _) => {
                let size = get_size(buf, size_desc)?;
                let bytes = buf.get_vec_u8(size).ok_or(Error::InvalidResponse)?;
                Self::String(OsString::from_vec(bytes))
            }
            (5, 0) => {
                ensure(buf, 1)?;
                Self::Bool(buf.get_bool())
            }
            (6, _) => {
                let size = get_size(buf, size_desc)?;
                Self::Sequence(get_elements(buf, size, depth + 1)?)
            }
            (7, _) => {
                let size = get_size(buf, size_desc)?;
                Self::Alternative(get_elements(buf, size, depth + 1)?)
            }
            (8, _) => {
                let size = get_size(buf, size_desc)?;
                let bytes = buf.get_vec_u8(size).ok_or(Error::InvalidResponse)?;
                Self::Url(OsString::from_vec(bytes))
            }
            _ => return Err(Error::InvalidResponse),
        })
    }

    /// Returns the value of any unsigned integer element.
    pub fn as_uint(&self) -> Option<u64> {
        match *self {
            DataElement::Uint8(v) => Some(v as u64),
            DataElement::Uint16(v) => Some(v as u64),
            DataElement::Uint32(v) => Some(v as u64),
            DataElement::Uint64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        self.as_uint().and_then(|v| u16::try_from(v).ok())
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match *self {
            DataElement::Uuid16(u) => Some(u.into()),
            DataElement::Uuid32(u) => Some(u.into()),
            DataElement::Uuid128(u) => Some(u.into()),
            _ => None,
        }
    }

    /// Returns the members of a sequence or an alternative.
    pub fn as_elements(&self) -> Option<&[DataElement]> {
        match self {
            DataElement::Sequence(v) | DataElement::Alternative(v) => Some(&v[..]),
            _ => None,
        }
    }

    fn data_len(&self) -> usize {
        match self {
            DataElement::Nil => 0,
            DataElement::Uint8(_) | DataElement::Int8(_) | DataElement::Bool(_) => 1,
            DataElement::Uint16(_) | DataElement::Int16(_) | DataElement::Uuid16(_) => 2,
            DataElement::Uint32(_) | DataElement::Int32(_) | DataElement::Uuid32(_) => 4,
            DataElement::Uint64(_) | DataElement::Int64(_) => 8,
            DataElement::Uint128(_) | DataElement::Int128(_) | DataElement::Uuid128(_) => 16,
            DataElement::String(s) | DataElement::Url(s) => s.len(),
            DataElement::Sequence(s) | DataElement::Alternative(s) => {
                s.iter().map(|i| i.encoded_len()).sum()
            }
        }
    }

    /// Number of bytes [`to_buf`](ToBuf::to_buf) writes for this element.
    pub fn encoded_len(&self) -> usize {
        let size = self.data_len();
        let size_field = match self {
            DataElement::String(_)
            | DataElement::Url(_)
            | DataElement::Sequence(_)
            | DataElement::Alternative(_) => {
                if size <= u8::MAX as usize {
                    1
                } else if size <= u16::MAX as usize {
                    2
                } else {
                    4
                }
            }
            _ => 0,
        };
        1 + size_field + size
    }
}

impl ToBuf for DataElement {
    fn to_buf<B: BufMut>(&self, buf: &mut B) {
        let (type_desc, size_desc): (u8, Option<u8>) = match self {
            DataElement::Nil => (0, Some(0)),
            DataElement::Uint8(_) => (1, Some(0)),
            DataElement::Uint16(_) => (1, Some(1)),
            DataElement::Uint32(_) => (1, Some(2)),
            DataElement::Uint64(_) => (1, Some(3)),
            DataElement::Uint128(_) => (1, Some(4)),
            DataElement::Int8(_) => (2, Some(0)),
            DataElement::Int16(_) => (2, Some(1)),
            DataElement::Int32(_) => (2, Some(2)),
            DataElement::Int64(_) => (2, Some(3)),
            DataElement::Int128(_) => (2, Some(4)),
            DataElement::Uuid16(_) => (3, Some(1)),
            DataElement::Uuid32(_) => (3, Some(2)),
            DataElement::Uuid128(_) => (3, Some(4)),
            DataElement::String(_) => (4, None),
            DataElement::Bool(_) => (5, Some(0)),
            DataElement::Sequence(_) => (6, None),
            DataElement::Alternative(_) => (7, None),
            DataElement::Url(_) => (8, None),
        };

        let size = self.data_len();
        let size_desc = match size_desc {
            Some(size_desc) => size_desc,
            None => {
                if size <= u8::MAX as usize {
                    5
                } else if size <= u16::MAX as usize {
                    6
                } else {
                    7
                }
            }
        };

        let header = (type_desc << 3) | size_desc;

        buf.put_u8(header);

        match size_desc {
            5 => buf.put_u8(size as u8),
            6 => buf.put_u16(size as u16),
            7 => buf.put_u32(size as u32),
            _ => {}
        };

        match self {
            DataElement::Nil => {}
            DataElement::Uint8(v) => buf.put_u8(*v),
            DataElement::Uint16(v) => buf.put_u16(*v),
            DataElement::Uint32(v) => buf.put_u32(*v),
            DataElement::Uint64(v) => buf.put_u64(*v),
            DataElement::Uint128(v) => buf.put_u128(*v),
            DataElement::Int8(v) => buf.put_i8(*v),
            DataElement::Int16(v) => buf.put_i16(*v),
            DataElement::Int32(v) => buf.put_i32(*v),
            DataElement::Int64(v) => buf.put_i64(*v),
            DataElement::Int128(v) => buf.put_i128(*v),
            DataElement::Uuid16(v) => buf.put_u16(v.0),
            DataElement::Uuid32(v) => buf.put_u32(v.0),
            DataElement::Uuid128(v) => buf.put_u128(v.0),
            DataElement::Bool(v) => buf.put_u8(*v as u8),
            DataElement::String(v) | DataElement::Url(v) => buf.put_slice(v.as_bytes()),
            DataElement::Sequence(v) | DataElement::Alternative(v) => {
                for vi in v {
                    vi.to_buf(buf);
                }
            }
        };
    }
}

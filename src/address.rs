use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bytes::Buf;

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Hash)]
pub struct Address {
    bytes: [u8; 6],
}

impl Address {
    pub const fn new(bytes: [u8; 6]) -> Address {
        Address { bytes }
    }

    pub fn from_buf<B: Buf>(buf: &mut B) -> Option<Address> {
        if buf.remaining() < 6 {
            return None;
        }

        let mut arr = [0u8; 6];
        buf.copy_to_slice(&mut arr[..]);
        Some(Address::new(arr))
    }

    pub const fn zero() -> Address {
        Address { bytes: [0u8; 6] }
    }
}

impl From<[u8; 6]> for Address {
    fn from(bytes: [u8; 6]) -> Self {
        Address { bytes }
    }
}

impl From<Address> for [u8; 6] {
    fn from(val: Address) -> Self {
        val.bytes
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        let bytes = self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            bytes[5], bytes[4], bytes[3], bytes[2], bytes[1], bytes[0]
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{input:?} is not a bluetooth address")]
pub struct AddressParseError {
    input: String,
}

/// Parses the colon-separated form printed by [`Display`], most significant
/// octet first.
impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddressParseError {
            input: s.to_owned(),
        };

        let octets = s
            .trim()
            .split(':')
            .map(|octet| {
                if octet.len() == 2 {
                    u8::from_str_radix(octet, 16).map_err(|_| err())
                } else {
                    Err(err())
                }
            })
            .rev()
            .collect::<Result<Vec<_>, _>>()?;

        if octets.len() != 6 {
            return Err(err());
        }

        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&octets[..]);
        Ok(Address::new(bytes))
    }
}

/// The kind of link a device is reached over; the discriminants are the
/// kernel's `BDADDR_*` values.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum AddressType {
    BREDR = 0,
    LEPublic = 1,
    LERandom = 2,
}

impl Default for AddressType {
    fn default() -> Self {
        AddressType::BREDR
    }
}

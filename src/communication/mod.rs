use std::fmt::Debug;

pub mod discovery;
pub mod stream;
pub mod transport;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid16(pub u16);

impl From<u16> for Uuid16 {
    fn from(u: u16) -> Self {
        Self(u)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid32(pub u32);

impl From<u32> for Uuid32 {
    fn from(u: u32) -> Self {
        Self(u)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid128(pub u128);

impl From<u16> for Uuid128 {
    fn from(u: u16) -> Self {
        Self::from(Uuid16::from(u))
    }
}

impl From<u32> for Uuid128 {
    fn from(u: u32) -> Self {
        Self::from(Uuid32::from(u))
    }
}

impl From<u128> for Uuid128 {
    fn from(u: u128) -> Self {
        Self(u)
    }
}

pub const BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

// short uuids occupy the top 32 bits of the base uuid
const BASE_UUID_SHIFT: u32 = 96;

impl From<Uuid16> for Uuid32 {
    fn from(u: Uuid16) -> Self {
        Self(u.0 as u32)
    }
}

impl From<Uuid16> for Uuid128 {
    fn from(u: Uuid16) -> Self {
        Self(((u.0 as u128) << BASE_UUID_SHIFT) | BASE_UUID)
    }
}

impl From<Uuid32> for Uuid128 {
    fn from(u: Uuid32) -> Self {
        Self(((u.0 as u128) << BASE_UUID_SHIFT) | BASE_UUID)
    }
}

impl Debug for Uuid16 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl Debug for Uuid32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = u32::to_le_bytes(self.0);
        write!(
            f,
            "{:02x}{:02x}-{:02x}{:02x}",
            bytes[3], bytes[2], bytes[1], bytes[0]
        )
    }
}

impl Debug for Uuid128 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = u128::to_le_bytes(self.0);
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            bytes[15], bytes[14], bytes[13], bytes[12], bytes[11], bytes[10], bytes[9], bytes[8],
            bytes[7], bytes[6], bytes[5], bytes[4], bytes[3], bytes[2], bytes[1], bytes[0]
        )
    }
}

/// A UUID in any of the three sizes SDP puts on the wire. Equality is
/// defined on the expanded 128-bit form, so `0x110B` as a 16-bit UUID equals
/// the same class written out in full.
#[derive(Clone, Copy, Debug)]
pub enum Uuid {
    Uuid16(Uuid16),
    Uuid32(Uuid32),
    Uuid128(Uuid128),
}

impl Uuid {
    pub fn to_uuid128(self) -> Uuid128 {
        match self {
            Uuid::Uuid16(u) => u.into(),
            Uuid::Uuid32(u) => u.into(),
            Uuid::Uuid128(u) => u,
        }
    }
}

impl PartialEq for Uuid {
    fn eq(&self, other: &Self) -> bool {
        self.to_uuid128() == other.to_uuid128()
    }
}

impl Eq for Uuid {}

impl From<Uuid16> for Uuid {
    fn from(u: Uuid16) -> Self {
        Uuid::Uuid16(u)
    }
}

impl From<Uuid32> for Uuid {
    fn from(u: Uuid32) -> Self {
        Uuid::Uuid32(u)
    }
}

impl From<Uuid128> for Uuid {
    fn from(u: Uuid128) -> Self {
        Uuid::Uuid128(u)
    }
}

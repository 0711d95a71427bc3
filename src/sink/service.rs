//! What discovery learns about a remote A2DP service.

use std::fmt::{Display, Formatter};

use enumflags2::{bitflags, BitFlags};
use tracing::{debug, warn};

use super::SDP_FLOW;
use crate::communication::discovery::serialization::DataElement;
use crate::communication::discovery::{class, ProtocolDescriptor, ServiceAttributeId, ServiceRecord};

/// A2DP's `SupportedFeatures` attribute.
pub const SUPPORTED_FEATURES: ServiceAttributeId = ServiceAttributeId(0x0311);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Discovery has not run yet.
    Unknown,
    Source,
    Sink,
    /// Discovery ran, but the service is not a usable A2DP endpoint.
    Neither,
}

impl Default for Role {
    fn default() -> Self {
        Role::Unknown
    }
}

/// A protocol or profile version; on the wire the major number is the high
/// byte and the minor number the low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl From<u16> for Version {
    fn from(v: u16) -> Self {
        Version {
            major: (v >> 8) as u8,
            minor: (v & 0xFF) as u8,
        }
    }
}

impl From<Version> for u16 {
    fn from(v: Version) -> Self {
        ((v.major as u16) << 8) | v.minor as u16
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Capabilities a remote audio service advertises. Sinks use the low nibble
/// and sources the high nibble.
#[bitflags]
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum AudioFeature {
    Headphone = 1 << 0,
    Speaker = 1 << 1,
    Recorder = 1 << 2,
    Amplifier = 1 << 3,
    Player = 1 << 4,
    Microphone = 1 << 5,
    Tuner = 1 << 6,
    Mixer = 1 << 7,
}

pub type AudioFeatures = BitFlags<AudioFeature>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioService {
    role: Role,
    psm: u16,
    transport_version: Version,
    profile_version: Version,
    features: AudioFeatures,
}

fn leading_u16(descriptor: Option<&ProtocolDescriptor>) -> Option<u16> {
    descriptor?.parameters.first().and_then(DataElement::as_u16)
}

impl AudioService {
    /// Interprets a record returned by an audio sink search. The result is
    /// [`Role::Neither`] unless the record carries both an L2CAP PSM and an
    /// AVDTP version.
    pub fn from_record(record: &ServiceRecord) -> Self {
        let mut service = AudioService {
            role: Role::Neither,
            ..AudioService::default()
        };

        let profile = record.profile(class::ADVANCED_AUDIO_DISTRIBUTION);
        debug_assert!(profile.is_some(), "audio sink record without an A2DP profile");
        match profile {
            Some(profile) => service.profile_version = profile.version.into(),
            None => {
                warn!(target: SDP_FLOW, "record {:08x?} has no A2DP profile descriptor", record.handle());
                return service;
            }
        }

        let psm = match leading_u16(record.protocol(class::L2CAP)) {
            Some(psm) if psm != 0 => psm,
            _ => {
                debug!(target: SDP_FLOW, "record {:08x?} has no usable L2CAP descriptor", record.handle());
                return service;
            }
        };

        let transport_version = match leading_u16(record.protocol(class::AVDTP)) {
            Some(version) if version != 0 => version,
            _ => {
                debug!(target: SDP_FLOW, "record {:08x?} has no usable AVDTP descriptor", record.handle());
                return service;
            }
        };

        service.psm = psm;
        service.transport_version = transport_version.into();

        service.role = if record.is_class_supported(class::AUDIO_SINK) {
            Role::Sink
        } else if record.is_class_supported(class::AUDIO_SOURCE) {
            Role::Source
        } else {
            Role::Neither
        };

        // optional, and only the low byte carries defined bits
        if let Some(raw) = record.attribute(SUPPORTED_FEATURES).and_then(DataElement::as_u16) {
            let raw = raw as u8;
            service.features = match service.role {
                Role::Source => AudioFeatures::from_bits_truncate(raw << 4),
                _ => AudioFeatures::from_bits_truncate(raw),
            };
        }

        service
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The PSM the AVDTP signalling channel is opened on.
    pub fn psm(&self) -> u16 {
        self.psm
    }

    pub fn transport_version(&self) -> Version {
        self.transport_version
    }

    pub fn profile_version(&self) -> Version {
        self.profile_version
    }

    pub fn features(&self) -> AudioFeatures {
        self.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::Uuid16;
    use crate::testing::{service_record, RecordBuilder};

    #[test]
    pub fn sink_record() {
        let record = service_record(RecordBuilder::sink().psm(25).avdtp(0x0103).build());
        let service = AudioService::from_record(&record);

        assert_eq!(service.role(), Role::Sink);
        assert_eq!(service.psm(), 25);
        assert_eq!(service.transport_version(), Version { major: 1, minor: 3 });
        assert_eq!(service.profile_version(), Version { major: 1, minor: 3 });
        assert!(service.features().is_empty());
    }

    #[test]
    pub fn missing_avdtp_descriptor() {
        let record = service_record(RecordBuilder::sink().psm(25).build());
        let service = AudioService::from_record(&record);

        assert_eq!(service.role(), Role::Neither);
        assert_eq!(service.psm(), 0);
    }

    #[test]
    pub fn missing_l2cap_descriptor() {
        let record = service_record(RecordBuilder::sink().avdtp(0x0103).build());
        assert_eq!(AudioService::from_record(&record).role(), Role::Neither);
    }

    #[test]
    pub fn zero_psm_is_unusable() {
        let record = service_record(RecordBuilder::sink().psm(0).avdtp(0x0103).build());
        assert_eq!(AudioService::from_record(&record).role(), Role::Neither);
    }

    #[test]
    pub fn zero_avdtp_version_is_unusable() {
        let record = service_record(RecordBuilder::sink().psm(25).avdtp(0).build());
        let service = AudioService::from_record(&record);
        assert_eq!(service.role(), Role::Neither);
        assert_eq!(service.psm(), 0);
    }

    #[test]
    pub fn unrelated_class() {
        let record = service_record(
            RecordBuilder::with_classes(&[Uuid16(0x1108)])
                .psm(25)
                .avdtp(0x0103)
                .build(),
        );
        assert_eq!(AudioService::from_record(&record).role(), Role::Neither);
    }

    #[test]
    pub fn source_features_are_shifted() {
        let record = service_record(
            RecordBuilder::with_classes(&[class::AUDIO_SOURCE])
                .psm(25)
                .avdtp(0x0103)
                .features(0b0000_0011)
                .build(),
        );
        let service = AudioService::from_record(&record);

        assert_eq!(service.role(), Role::Source);
        assert_eq!(service.features().bits(), 0b0011_0000);
        assert_eq!(
            service.features(),
            AudioFeature::Player | AudioFeature::Microphone
        );
    }

    #[test]
    pub fn sink_features_are_not_shifted() {
        let record = service_record(
            RecordBuilder::sink()
                .psm(25)
                .avdtp(0x0103)
                .features(0b0000_0011)
                .build(),
        );
        let service = AudioService::from_record(&record);

        assert_eq!(service.features().bits(), 0b0000_0011);
        assert_eq!(
            service.features(),
            AudioFeature::Headphone | AudioFeature::Speaker
        );
    }

    #[test]
    pub fn features_ignored_without_protocols() {
        let record = service_record(RecordBuilder::sink().features(0b0000_0001).build());
        assert!(AudioService::from_record(&record).features().is_empty());
    }

    #[test]
    pub fn versions() {
        let v = Version::from(0x0104);
        assert_eq!(v, Version { major: 1, minor: 4 });
        assert_eq!(u16::from(v), 0x0104);
        assert_eq!(v.to_string(), "1.4");
    }

    #[test]
    pub fn default_is_unknown() {
        let service = AudioService::default();
        assert_eq!(service.role(), Role::Unknown);
        assert_eq!(service.psm(), 0);
    }
}

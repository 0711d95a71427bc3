use std::collections::HashMap;

use super::serialization::DataElement;
use super::ServiceAttributeId;
use crate::communication::Uuid;

/// An entry of the `BluetoothProfileDescriptorList` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDescriptor {
    pub profile: Uuid,
    /// Major version in the high byte, minor in the low byte.
    pub version: u16,
}

/// An entry of the `ProtocolDescriptorList` attribute: the protocol and the
/// protocol-specific parameters that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolDescriptor {
    pub protocol: Uuid,
    pub parameters: Vec<DataElement>,
}

/// A service record returned by a remote SDP server, with the universal
/// attributes already picked apart. Attributes this type does not interpret
/// are still reachable through [`attribute`](ServiceRecord::attribute).
#[derive(Debug, Clone, Default)]
pub struct ServiceRecord {
    handle: Option<u32>,
    classes: Vec<Uuid>,
    protocols: Vec<ProtocolDescriptor>,
    profiles: Vec<ProfileDescriptor>,
    attributes: HashMap<ServiceAttributeId, DataElement>,
}

fn parse_protocol(element: &DataElement) -> Option<ProtocolDescriptor> {
    let (protocol, parameters) = element.as_elements()?.split_first()?;
    Some(ProtocolDescriptor {
        protocol: protocol.as_uuid()?,
        parameters: parameters.to_vec(),
    })
}

fn parse_profile(element: &DataElement) -> Option<ProfileDescriptor> {
    match element.as_elements()? {
        [profile, version, ..] => Some(ProfileDescriptor {
            profile: profile.as_uuid()?,
            version: version.as_u16()?,
        }),
        _ => None,
    }
}

impl ServiceRecord {
    /// Builds the record view. Malformed entries of the universal attributes
    /// are skipped rather than rejected, so that one odd descriptor does not
    /// hide the rest of the record.
    pub fn from_attributes(attributes: HashMap<ServiceAttributeId, DataElement>) -> Self {
        let handle = attributes
            .get(&ServiceAttributeId::SERVICE_RECORD_HANDLE)
            .and_then(|e| e.as_uint())
            .and_then(|h| u32::try_from(h).ok());

        let classes = attributes
            .get(&ServiceAttributeId::SERVICE_CLASS_ID_LIST)
            .and_then(|e| e.as_elements())
            .map(|list| list.iter().filter_map(|e| e.as_uuid()).collect())
            .unwrap_or_default();

        // a plain list is a sequence of protocol stacks; an alternative offers
        // several stacks, of which the first is used
        let protocols = match attributes.get(&ServiceAttributeId::PROTOCOL_DESCRIPTOR_LIST) {
            Some(DataElement::Sequence(list)) => list.iter().filter_map(parse_protocol).collect(),
            Some(DataElement::Alternative(stacks)) => stacks
                .first()
                .and_then(|stack| stack.as_elements())
                .map(|list| list.iter().filter_map(parse_protocol).collect())
                .unwrap_or_default(),
            _ => vec![],
        };

        let profiles = attributes
            .get(&ServiceAttributeId::BLUETOOTH_PROFILE_DESCRIPTOR_LIST)
            .and_then(|e| e.as_elements())
            .map(|list| list.iter().filter_map(parse_profile).collect())
            .unwrap_or_default();

        ServiceRecord {
            handle,
            classes,
            protocols,
            profiles,
            attributes,
        }
    }

    pub fn handle(&self) -> Option<u32> {
        self.handle
    }

    pub fn classes(&self) -> &[Uuid] {
        &self.classes
    }

    pub fn protocols(&self) -> &[ProtocolDescriptor] {
        &self.protocols
    }

    pub fn profiles(&self) -> &[ProfileDescriptor] {
        &self.profiles
    }

    pub fn is_class_supported(&self, class: impl Into<Uuid>) -> bool {
        let class = class.into();
        self.classes.iter().any(|c| *c == class)
    }

    pub fn profile(&self, profile: impl Into<Uuid>) -> Option<&ProfileDescriptor> {
        let profile = profile.into();
        self.profiles.iter().find(|p| p.profile == profile)
    }

    pub fn protocol(&self, protocol: impl Into<Uuid>) -> Option<&ProtocolDescriptor> {
        let protocol = protocol.into();
        self.protocols.iter().find(|p| p.protocol == protocol)
    }

    pub fn attribute(&self, id: ServiceAttributeId) -> Option<&DataElement> {
        self.attributes.get(&id)
    }
}

//! The device collaborator: whatever owns pairing, bonding and the radio
//! link implements these traits for the audio sink to consume.

use std::sync::Arc;

use crate::{Address, AddressType};

/// Invoked by the device whenever any of its state changed. May be called
/// from any thread and must return quickly.
pub type UpdateHandler = Box<dyn Fn() + Send + Sync>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverError {
    #[error("an update handler is already registered")]
    AlreadyRegistered,
    #[error("no update handler is registered")]
    NotRegistered,
}

/// A remote device known to the local Bluetooth stack.
pub trait Device: Send + Sync {
    fn is_bonded(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Address of the local adapter the device is reached through.
    fn local_address(&self) -> Address;

    fn remote_address(&self) -> Address;

    fn address_type(&self) -> AddressType;

    /// Installs the single update handler. Fails if one is already installed.
    fn register_update_callback(&self, handler: UpdateHandler) -> Result<(), ObserverError>;

    /// Removes the installed handler. Once this returns the handler is not
    /// invoked again.
    fn unregister_update_callback(&self) -> Result<(), ObserverError>;
}

/// Looks up devices known to the local stack.
pub trait Controller: Send + Sync {
    fn device(&self, address: &Address) -> Option<Arc<dyn Device>>;
}

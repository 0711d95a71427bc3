//! # Audio sink
//!
//! This crate finds out whether a paired Bluetooth device is an A2DP audio
//! sink and, if it is, opens the AVDTP transport connection used to stream
//! audio to it. The central type is [`sink::AudioSink`], which accepts one
//! device at a time through [`assign`](sink::AudioSink::assign) and
//! [`revoke`](sink::AudioSink::revoke) and reports progress through
//! [`status`](sink::AudioSink::status).
//!
//! # Devices
//!
//! Pairing, bonding and the radio link itself are owned by whatever Bluetooth
//! stack hosts this crate. It is consumed through the [`device::Device`] and
//! [`device::Controller`] traits: the crate only reads a handful of flags and
//! installs a single update handler per device.
//!
//! # Communication
//!
//! Both protocol exchanges run over L2CAP. The socket is reached through the
//! [`communication::transport::Connector`] trait; on Linux the default
//! [`communication::transport::L2capConnector`] opens a
//! [`BluetoothStream`](crate::communication::stream::BluetoothStream).
//!
//! This library also contains the client half of the Service Discovery
//! Protocol (SDP), in the
//! [`communication::discovery`](crate::communication::discovery) module.
//!
//! # Dispatch
//!
//! Device notifications arrive on threads this crate does not control. They
//! are turned into jobs on a [`dispatch::WorkerPool`], which must be started
//! on a tokio runtime before any device is assigned.

#[macro_use]
extern crate num_derive;
#[macro_use]
extern crate thiserror;

pub use address::*;

pub mod communication;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod sink;

mod address;
mod util;

#[cfg(test)]
pub(crate) mod testing;

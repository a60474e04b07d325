//! The bluetooth host as seen by a [`DeviceSession`](crate::device::session::DeviceSession).
//!
//! Enumeration, GATT resolution, connection handling and notification delivery all belong to
//! the host. [`BtleHost`](crate::device::btle::BtleHost) implements this on top of btleplug;
//! tests use an in-memory host.

use async_trait::async_trait;
use uuid::Uuid;

use crate::device::types::PeripheralDescriptor;
use crate::error::DeviceError;

/// Invoked by the host with the value of every notification of one characteristic.
///
/// Called from the host's own delivery context; it must not block.
pub type NotifyCallback = Box<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

#[async_trait]
pub trait BleHost: Send + Sync + 'static {
    type Peripheral: Clone + Send + Sync + 'static;
    type Service: Clone + Send + Sync + 'static;
    type Characteristic: Clone + Send + Sync + 'static;

    /// Peripherals that expose (or advertise) `service`, in whatever order the host yields them.
    async fn find_peripherals(&self, service: Uuid) -> Result<Vec<PeripheralDescriptor<Self::Peripheral>>, DeviceError>;

    /// Establishes the connection and discovers services, so they can be resolved afterwards.
    async fn connect(&self, peripheral: &Self::Peripheral) -> Result<(), DeviceError>;

    async fn disconnect(&self, peripheral: &Self::Peripheral) -> Result<(), DeviceError>;

    fn resolve_service(&self, peripheral: &Self::Peripheral, service: Uuid) -> Option<Self::Service>;

    fn resolve_characteristic(&self, service: &Self::Service, characteristic: Uuid) -> Option<Self::Characteristic>;

    async fn read(&self, characteristic: &Self::Characteristic) -> Result<Vec<u8>, DeviceError>;

    async fn write(&self, characteristic: &Self::Characteristic, data: &[u8]) -> Result<(), DeviceError>;

    /// Enables notifications. A later subscribe of the same characteristic replaces `on_notify`.
    async fn subscribe(&self, characteristic: &Self::Characteristic, on_notify: NotifyCallback) -> Result<(), DeviceError>;

    async fn unsubscribe(&self, characteristic: &Self::Characteristic) -> Result<(), DeviceError>;
}

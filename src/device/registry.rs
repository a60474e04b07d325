use log::{debug, warn};
use uuid::Uuid;

use crate::device::constants::{
    BATTERY_CHARACTERISTIC, BATTERY_SERVICE, BUTTON_CHARACTERISTIC, DEVICE_INFORMATION_SERVICE, FLY_CHARACTERISTIC,
    LED_MATRIX_CHARACTERISTIC, LED_MATRIX_SERVICE, MANUFACTURER_NAME_CHARACTERISTIC, ROTATION_CHARACTERISTIC,
    SENSOR_SERVICE, SWIPE_CHARACTERISTIC,
};
use crate::device::host::BleHost;
use crate::device::types::SensorChannel;
use crate::error::BindError;

/// GATT service and characteristic backing a channel.
pub fn channel_uuids(channel: SensorChannel) -> (Uuid, Uuid) {
    match channel {
        SensorChannel::Battery => (BATTERY_SERVICE, BATTERY_CHARACTERISTIC),
        SensorChannel::Button => (SENSOR_SERVICE, BUTTON_CHARACTERISTIC),
        SensorChannel::Rotation => (SENSOR_SERVICE, ROTATION_CHARACTERISTIC),
        SensorChannel::Swipe => (SENSOR_SERVICE, SWIPE_CHARACTERISTIC),
        SensorChannel::Fly => (SENSOR_SERVICE, FLY_CHARACTERISTIC),
    }
}

fn lookup<H: BleHost>(host: &H, peripheral: &H::Peripheral, service: Uuid, characteristic: Uuid) -> Option<H::Characteristic> {
    let service = host.resolve_service(peripheral, service)?;
    host.resolve_characteristic(&service, characteristic)
}

/// The characteristics of a bound peripheral, indexed by [`SensorChannel::index`].
///
/// Only ever constructed complete by [`ChannelRegistry::resolve`] and never changed afterwards.
pub struct ChannelRegistry<H: BleHost> {
    sensors: [H::Characteristic; 5],
    display: H::Characteristic,
    information: Option<H::Characteristic>,
}

impl<H: BleHost> ChannelRegistry<H> {
    pub fn resolve(host: &H, peripheral: &H::Peripheral) -> Result<Self, BindError> {
        let resolve_channel = |channel: SensorChannel| {
            let (service, characteristic) = channel_uuids(channel);
            lookup(host, peripheral, service, characteristic).ok_or(BindError::MissingCharacteristic(channel))
        };

        let sensors = [
            resolve_channel(SensorChannel::Battery)?,
            resolve_channel(SensorChannel::Button)?,
            resolve_channel(SensorChannel::Rotation)?,
            resolve_channel(SensorChannel::Swipe)?,
            resolve_channel(SensorChannel::Fly)?,
        ];

        let display = lookup(host, peripheral, LED_MATRIX_SERVICE, LED_MATRIX_CHARACTERISTIC)
            .ok_or(BindError::MissingDisplay)?;

        let information = lookup(host, peripheral, DEVICE_INFORMATION_SERVICE, MANUFACTURER_NAME_CHARACTERISTIC);
        if information.is_none() {
            warn!("Device information characteristic is not available");
        }

        debug!("Resolved all channel characteristics");
        Ok(ChannelRegistry { sensors, display, information })
    }

    pub fn characteristic(&self, channel: SensorChannel) -> &H::Characteristic {
        &self.sensors[channel.index()]
    }

    pub fn channels(&self) -> impl Iterator<Item = (SensorChannel, &H::Characteristic)> {
        SensorChannel::ALL.into_iter().map(move |channel| (channel, self.characteristic(channel)))
    }

    pub fn display(&self) -> &H::Characteristic {
        &self.display
    }

    pub fn information(&self) -> Option<&H::Characteristic> {
        self.information.as_ref()
    }
}

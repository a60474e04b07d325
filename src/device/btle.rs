use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use btleplug::api::{Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{SCAN_DURATION, WRITE_DEADLINE};
use crate::device::host::{BleHost, NotifyCallback};
use crate::device::types::PeripheralDescriptor;
use crate::error::DeviceError;

type Callbacks = Arc<Mutex<HashMap<Uuid, NotifyCallback>>>;

#[derive(Clone)]
pub struct BtleService {
    peripheral: Peripheral,
    service: Service,
}

#[derive(Clone)]
pub struct BtleCharacteristic {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

// Reads the notification stream of one peripheral and hands each value to the callback
// registered for its characteristic.
struct NotificationPump {
    cancel: CancellationToken,
    callbacks: Callbacks,
    handle: JoinHandle<Result<(), DeviceError>>,
}

/// [`BleHost`] on top of the platform bluetooth stack.
pub struct BtleHost {
    manager: Manager,
    scan_duration: Duration,
    pumps: Mutex<HashMap<PeripheralId, NotificationPump>>,
}

impl BtleHost {
    pub async fn new() -> Result<Self, DeviceError> {
        Self::with_scan_duration(Duration::from_millis(SCAN_DURATION)).await
    }

    pub async fn with_scan_duration(scan_duration: Duration) -> Result<Self, DeviceError> {
        let manager = Manager::new().await?;

        Ok(BtleHost {
            manager,
            scan_duration,
            pumps: Mutex::new(HashMap::new()),
        })
    }

    fn callbacks_for(&self, peripheral: &Peripheral) -> Callbacks {
        let mut pumps = self.pumps.lock().expect("Failed to lock notification pumps");
        let id = peripheral.id();

        if let Some(pump) = pumps.get(&id) {
            if !pump.handle.is_finished() {
                return pump.callbacks.clone();
            }
            warn!("Notification stream of {:?} ended, starting a new one", id);
        }

        // keep the callbacks of a finished pump, their subscriptions are still wanted
        let callbacks = pumps
            .remove(&id)
            .map(|pump| pump.callbacks)
            .unwrap_or_default();
        let cancel = CancellationToken::new();
        let handle = notification_pump_task(cancel.clone(), peripheral.clone(), callbacks.clone());
        pumps.insert(id, NotificationPump { cancel, callbacks: callbacks.clone(), handle });

        callbacks
    }
}

async fn start_scanning(manager: &Manager, service: Uuid) -> Result<Vec<Adapter>, DeviceError> {
    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        return Err(DeviceError::NoAdapter);
    }

    let filter = ScanFilter {
        services: vec![service],
    };

    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(adapters)
}

// One scanning adapter, as far as discovery is concerned.
#[async_trait]
trait ScanningAdapter: Sync {
    type Handle: Send;

    async fn discovered_peripherals(&self, service: Uuid) -> Result<Vec<PeripheralDescriptor<Self::Handle>>, DeviceError>;

    async fn stop_scanning(&self) -> Result<(), DeviceError>;
}

#[async_trait]
impl ScanningAdapter for Adapter {
    type Handle = Peripheral;

    async fn discovered_peripherals(&self, service: Uuid) -> Result<Vec<PeripheralDescriptor<Peripheral>>, DeviceError> {
        let mut found = Vec::new();

        for peripheral in self.peripherals().await? {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    warn!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    // Some environments ignore the filter, so make sure to check the service uuid again
                    if properties.services.contains(&service) {
                        debug!("Discovered {} {:?}", properties.address, properties.local_name);
                        found.push(PeripheralDescriptor {
                            name: properties.local_name,
                            address: properties.address.to_string(),
                            handle: peripheral,
                        });
                    }
                },
            }
        }

        Ok(found)
    }

    async fn stop_scanning(&self) -> Result<(), DeviceError> {
        Ok(self.stop_scan().await?)
    }
}

// Gathers what every adapter found, then stops all of them, including the ones whose query
// failed.
async fn collect_discovered<A: ScanningAdapter>(adapters: &[A], service: Uuid) -> Vec<PeripheralDescriptor<A::Handle>> {
    let mut found = Vec::new();

    for adapter in adapters {
        match adapter.discovered_peripherals(service).await {
            Ok(mut peripherals) => found.append(&mut peripherals),
            Err(err) => warn!("Failed to query BLE adapter for peripherals: {}", err),
        }
    }

    for adapter in adapters {
        if let Err(err) = adapter.stop_scanning().await {
            warn!("Failed to stop scanning: {}", err);
        }
    }

    found
}

fn notification_pump_task(cancel: CancellationToken, peripheral: Peripheral, callbacks: Callbacks) -> JoinHandle<Result<(), DeviceError>> {
    spawn(async move {
        let mut notification_stream = peripheral.notifications().await?;

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                notification = notification_stream.next() => match notification {
                    Some(data) => {
                        let callbacks = callbacks.lock().expect("Failed to lock notification callbacks");
                        match callbacks.get(&data.uuid) {
                            Some(on_notify) => on_notify(data.value),
                            None => debug!("Notification for unsubscribed characteristic {}", data.uuid),
                        }
                    },
                    None => {
                        warn!("Notification stream ended");
                        break 'mainloop;
                    },
                },
            }
        }

        Ok(())
    })
}

#[async_trait]
impl BleHost for BtleHost {
    type Peripheral = Peripheral;
    type Service = BtleService;
    type Characteristic = BtleCharacteristic;

    async fn find_peripherals(&self, service: Uuid) -> Result<Vec<PeripheralDescriptor<Peripheral>>, DeviceError> {
        let adapters = match start_scanning(&self.manager, service).await {
            Ok(adapters) => adapters,
            Err(err) => {
                if let DeviceError::Btle { source: btleplug::Error::PermissionDenied } = &err {
                    warn!("No permission to use bluetooth");
                }
                return Err(err);
            },
        };

        sleep(self.scan_duration).await;

        Ok(collect_discovered(&adapters, service).await)
    }

    async fn connect(&self, peripheral: &Peripheral) -> Result<(), DeviceError> {
        if !peripheral.is_connected().await? {
            info!("Connecting to peripheral...");
            peripheral.connect().await?;
        }

        info!("Connected; Discovering services...");
        peripheral.discover_services().await?;
        Ok(())
    }

    async fn disconnect(&self, peripheral: &Peripheral) -> Result<(), DeviceError> {
        let pump = self.pumps.lock().expect("Failed to lock notification pumps").remove(&peripheral.id());

        if let Some(pump) = pump {
            pump.cancel.cancel();
            match pump.handle.await {
                Ok(Ok(())) => debug!("Notification pump stopped"),
                Ok(Err(err)) => warn!("Error during notification pump: {}", err),
                Err(err) => warn!("Failed to join notification pump: {}", err),
            }
        }

        if peripheral.is_connected().await? {
            peripheral.disconnect().await?;
        }
        Ok(())
    }

    fn resolve_service(&self, peripheral: &Peripheral, service: Uuid) -> Option<BtleService> {
        peripheral
            .services()
            .into_iter()
            .find(|candidate| candidate.uuid == service)
            .map(|service| BtleService { peripheral: peripheral.clone(), service })
    }

    fn resolve_characteristic(&self, service: &BtleService, characteristic: Uuid) -> Option<BtleCharacteristic> {
        service.service.characteristics
            .iter()
            .find(|candidate| candidate.uuid == characteristic)
            .map(|characteristic| BtleCharacteristic {
                peripheral: service.peripheral.clone(),
                characteristic: characteristic.clone(),
            })
    }

    async fn read(&self, characteristic: &BtleCharacteristic) -> Result<Vec<u8>, DeviceError> {
        Ok(characteristic.peripheral.read(&characteristic.characteristic).await?)
    }

    async fn write(&self, characteristic: &BtleCharacteristic, data: &[u8]) -> Result<(), DeviceError> {
        let write_type = if characteristic.characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        let fut = characteristic.peripheral.write(&characteristic.characteristic, data, write_type);

        tokio::select! {
            _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
                warn!("Sending to characteristic {} took too long", characteristic.characteristic.uuid);
                Err(DeviceError::Timeout(WRITE_DEADLINE))
            }
            result = fut => Ok(result?),
        }
    }

    async fn subscribe(&self, characteristic: &BtleCharacteristic, on_notify: NotifyCallback) -> Result<(), DeviceError> {
        let uuid = characteristic.characteristic.uuid;
        let callbacks = self.callbacks_for(&characteristic.peripheral);
        callbacks.lock().expect("Failed to lock notification callbacks").insert(uuid, on_notify);

        info!("Subscribing to characteristic {}", uuid);
        if let Err(err) = characteristic.peripheral.subscribe(&characteristic.characteristic).await {
            callbacks.lock().expect("Failed to lock notification callbacks").remove(&uuid);
            return Err(err.into());
        }
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &BtleCharacteristic) -> Result<(), DeviceError> {
        let uuid = characteristic.characteristic.uuid;

        {
            let pumps = self.pumps.lock().expect("Failed to lock notification pumps");
            if let Some(pump) = pumps.get(&characteristic.peripheral.id()) {
                pump.callbacks.lock().expect("Failed to lock notification callbacks").remove(&uuid);
            }
        }

        characteristic.peripheral.unsubscribe(&characteristic.characteristic).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FakeAdapter {
        found: Option<Vec<&'static str>>,
        stops: AtomicUsize,
    }

    impl FakeAdapter {
        fn new(found: Option<Vec<&'static str>>) -> Self {
            FakeAdapter { found, stops: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ScanningAdapter for FakeAdapter {
        type Handle = &'static str;

        async fn discovered_peripherals(&self, _service: Uuid) -> Result<Vec<PeripheralDescriptor<&'static str>>, DeviceError> {
            match &self.found {
                Some(addresses) => Ok(addresses
                    .iter()
                    .map(|address| PeripheralDescriptor { name: None, address: address.to_string(), handle: *address })
                    .collect()),
                None => Err(DeviceError::Rejected("adapter went away".to_string())),
            }
        }

        async fn stop_scanning(&self) -> Result<(), DeviceError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_adapter_still_stops_scanning() {
        let adapters = [
            FakeAdapter::new(None),
            FakeAdapter::new(Some(vec!["aa:bb", "cc:dd"])),
            FakeAdapter::new(None),
        ];

        let found = collect_discovered(&adapters, Uuid::nil()).await;

        let handles: Vec<&str> = found.iter().map(|descriptor| descriptor.handle).collect();
        assert_eq!(handles, vec!["aa:bb", "cc:dd"]);
        for adapter in &adapters {
            assert_eq!(adapter.stops.load(Ordering::SeqCst), 1);
        }
    }
}

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::codec::{decode_battery_level, decode_event, encode_display, timeout_from_duration, DisplayFrame};
use crate::device::constants::{BATTERY_SERVICE, DEFAULT_BRIGHTNESS, DEFAULT_TIMEOUT};
use crate::device::dispatch::{notify_observer, EventDispatch, SensorObserver};
use crate::device::host::{BleHost, NotifyCallback};
use crate::device::registry::ChannelRegistry;
use crate::device::types::{DeviceInfo, PeripheralDescriptor, PeripheralIdentity, SensorChannel, SensorEvent, SessionState};
use crate::error::{DeviceError, SessionError};

/// A notification value as posted by a host callback.
#[derive(Debug)]
struct Notification {
    generation: u64,
    channel: SensorChannel,
    payload: Vec<u8>,
}

/// The peripheral a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundPeripheral {
    pub name: Option<String>,
    pub address: String,
    pub device_info: Option<DeviceInfo>,
}

/// Outcome of [`DeviceSession::cleanup`]. Failures are absorbed, the session is always reset.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub failures: Vec<(SensorChannel, DeviceError)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Binding<H: BleHost> {
    peripheral: H::Peripheral,
    registry: ChannelRegistry<H>,
}

// State touched by both the session operations and the dispatch task.
struct Shared {
    state: Mutex<SessionState>,
    battery_level: AtomicU8,
    // bumped on every bind and teardown; notifications of an older generation are stale
    generation: AtomicU64,
    bound: Mutex<Option<BoundPeripheral>>,
    dispatch: Mutex<EventDispatch>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock().expect("Failed to lock session state")
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock().expect("Failed to lock session state");
        if *current != state {
            debug!("Session state {} -> {}", *current, state);
            *current = state;
        }
    }

    fn handle_notification(&self, notification: Notification) {
        let Notification { generation, channel, payload } = notification;

        if generation != self.generation.load(Ordering::SeqCst) {
            debug!("Ignoring stale {} notification", channel);
            return;
        }

        let event = match decode_event(channel, &payload) {
            Ok(event) => event,
            Err(err) => {
                warn!("Failed to decode {} notification {:?}: {}", channel, payload, err);
                return;
            },
        };

        if let SensorEvent::Battery(level) = event {
            self.battery_level.store(level, Ordering::SeqCst);
        }

        // the observer runs unlocked so it may replace or clear itself
        let taken = self.dispatch.lock().expect("Failed to lock event dispatch").take_observer();
        if let Some((revision, mut observer)) = taken {
            notify_observer(observer.as_mut(), event);
            let superseded = self.dispatch.lock().expect("Failed to lock event dispatch").return_observer(revision, observer);
            drop(superseded);
        }
    }
}

// Applies notifications one at a time, in the order the host delivered them.
fn dispatch_task(cancel: CancellationToken, mut receiver: UnboundedReceiver<Notification>, shared: Arc<Shared>) -> JoinHandle<()> {
    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(notification) = receiver.next() => {
                    shared.handle_notification(notification);
                },
            }
        }

        debug!("Dispatch task stopped");
    })
}

/// Drives one peripheral: discovery and bind, notification subscriptions, display writes and
/// teardown.
///
/// Operations that change the state are serialized; a `cleanup` never interleaves with a
/// `connect`. Notifications are queued and handled by a background task, so
/// [`DeviceSession::new`] must be called from within a tokio runtime.
pub struct DeviceSession<H: BleHost> {
    host: Arc<H>,
    identity: PeripheralIdentity,
    shared: Arc<Shared>,
    binding: tokio::sync::Mutex<Option<Binding<H>>>,
    notify_sender: UnboundedSender<Notification>,
    cancel: CancellationToken,
}

impl<H: BleHost> DeviceSession<H> {
    pub fn new(host: Arc<H>, identity: PeripheralIdentity) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Uninitialized),
            battery_level: AtomicU8::new(0),
            generation: AtomicU64::new(0),
            bound: Mutex::new(None),
            dispatch: Mutex::new(EventDispatch::default()),
        });
        let cancel = CancellationToken::new();
        let (notify_sender, notify_receiver) = unbounded::<Notification>();
        dispatch_task(cancel.clone(), notify_receiver, shared.clone());

        DeviceSession {
            host,
            identity,
            shared,
            binding: tokio::sync::Mutex::new(None),
            notify_sender,
            cancel,
        }
    }

    pub fn identity(&self) -> &PeripheralIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_bound(&self) -> bool {
        self.state() == SessionState::Bound
    }

    /// Last known battery percentage. Kept across reconnects.
    pub fn battery_level(&self) -> u8 {
        self.shared.battery_level.load(Ordering::SeqCst)
    }

    pub fn bound_peripheral(&self) -> Option<BoundPeripheral> {
        self.shared.bound.lock().expect("Failed to lock bound peripheral").clone()
    }

    pub fn set_observer(&self, observer: impl SensorObserver) {
        self.shared.dispatch.lock().expect("Failed to lock event dispatch").set_observer(Box::new(observer));
    }

    pub fn clear_observer(&self) {
        self.shared.dispatch.lock().expect("Failed to lock event dispatch").clear_observer();
    }

    pub async fn connect(&self) -> Result<(), SessionError> {
        let mut binding = self.binding.lock().await;
        self.connect_locked(&mut binding).await
    }

    async fn connect_locked(&self, binding: &mut Option<Binding<H>>) -> Result<(), SessionError> {
        {
            let mut state = self.shared.state.lock().expect("Failed to lock session state");
            match *state {
                SessionState::Uninitialized | SessionState::Error => {},
                current => return Err(SessionError::AlreadyBound { state: current }),
            }

            if self.identity.is_empty() {
                return Err(SessionError::MissingIdentity);
            }

            *state = SessionState::Initializing;
        }

        match self.bind().await {
            Ok(new_binding) => {
                *binding = Some(new_binding);
                self.shared.set_state(SessionState::Bound);
                info!("Device ready");
                Ok(())
            },
            Err(err) => {
                warn!("Initialising device failed: {}", err);
                self.shared.set_state(SessionState::Error);
                Err(err)
            },
        }
    }

    async fn bind(&self) -> Result<Binding<H>, SessionError> {
        info!("Looking for device with {}...", self.identity);

        let descriptors = self.host.find_peripherals(BATTERY_SERVICE).await?;
        debug!("Found {} device(s) with battery status", descriptors.len());

        // first match wins, the host decides the order
        let descriptor = descriptors
            .into_iter()
            .find(|descriptor| self.identity.matches(descriptor.name.as_deref(), &descriptor.address))
            .ok_or_else(|| SessionError::PeripheralNotFound { identity: self.identity.to_string() })?;

        info!(
            "Using peripheral {} {}",
            descriptor.address,
            descriptor.name.as_deref().unwrap_or("NONE"),
        );
        self.host.connect(&descriptor.handle).await?;

        match self.attach(&descriptor).await {
            Ok(registry) => Ok(Binding { peripheral: descriptor.handle, registry }),
            Err(err) => {
                if let Err(disconnect_err) = self.host.disconnect(&descriptor.handle).await {
                    warn!("Failed to disconnect after failed bind: {}", disconnect_err);
                }
                Err(err)
            },
        }
    }

    async fn attach(&self, descriptor: &PeripheralDescriptor<H::Peripheral>) -> Result<ChannelRegistry<H>, SessionError> {
        let registry = ChannelRegistry::resolve(self.host.as_ref(), &descriptor.handle)?;
        let device_info = self.read_device_info(&registry).await;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        debug!("Setting up listeners");
        if let Err(err) = self.subscribe_all(&registry, generation).await {
            self.unsubscribe_all(&registry).await;
            return Err(err);
        }

        let payload = match self.host.read(registry.characteristic(SensorChannel::Battery)).await {
            Ok(payload) => payload,
            Err(err) => {
                self.unsubscribe_all(&registry).await;
                return Err(err.into());
            },
        };
        // a bad reading keeps the last known level, the next notification corrects it
        match decode_battery_level(&payload) {
            Ok(level) => {
                self.shared.battery_level.store(level, Ordering::SeqCst);
                info!("Battery level {}%", level);
            },
            Err(err) => warn!("Ignoring initial battery reading {:?}: {}", payload, err),
        }

        *self.shared.bound.lock().expect("Failed to lock bound peripheral") = Some(BoundPeripheral {
            name: descriptor.name.clone(),
            address: descriptor.address.clone(),
            device_info,
        });

        Ok(registry)
    }

    async fn read_device_info(&self, registry: &ChannelRegistry<H>) -> Option<DeviceInfo> {
        let characteristic = registry.information()?;

        match self.host.read(characteristic).await {
            Ok(bytes) => {
                let manufacturer = String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_string();
                info!("Retrieved device information: {}", manufacturer);
                Some(DeviceInfo { manufacturer })
            },
            Err(err) => {
                warn!("Failed to read device information: {}", err);
                None
            },
        }
    }

    fn notify_callback(&self, channel: SensorChannel, generation: u64) -> NotifyCallback {
        let sender = self.notify_sender.clone();

        Box::new(move |payload: Vec<u8>| {
            // only fails once the session is gone; the value is lost either way
            if sender.unbounded_send(Notification { generation, channel, payload }).is_err() {
                debug!("Session closed, dropping {} notification", channel);
            }
        })
    }

    async fn subscribe_all(&self, registry: &ChannelRegistry<H>, generation: u64) -> Result<(), SessionError> {
        for (channel, characteristic) in registry.channels() {
            debug!("Subscribing to the {} channel", channel);

            if let Err(source) = self.host.subscribe(characteristic, self.notify_callback(channel, generation)).await {
                return Err(SessionError::Subscribe { channel, source });
            }
        }

        Ok(())
    }

    async fn unsubscribe_all(&self, registry: &ChannelRegistry<H>) -> Vec<(SensorChannel, DeviceError)> {
        let mut failures = Vec::new();

        for (channel, characteristic) in registry.channels() {
            if let Err(err) = self.host.unsubscribe(characteristic).await {
                warn!("Cleaning up the {} channel failed: {}", channel, err);
                failures.push((channel, err));
            }
        }

        failures
    }

    /// Unsubscribes every channel and releases the peripheral. Ends in
    /// [`SessionState::Uninitialized`] no matter which unsubscriptions fail.
    pub async fn cleanup(&self) -> CleanupReport {
        let mut binding = self.binding.lock().await;

        let current = match (self.state(), binding.take()) {
            (SessionState::Bound, Some(current)) => current,
            (state, _) => {
                debug!("Nothing to clean up, session is {}", state);
                self.shared.set_state(SessionState::Uninitialized);
                return CleanupReport::default();
            },
        };

        info!("Removing bluetooth listeners");
        self.shared.set_state(SessionState::Cleaning);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        let failures = self.unsubscribe_all(&current.registry).await;

        if let Err(err) = self.host.disconnect(&current.peripheral).await {
            warn!("Failed to disconnect: {}", err);
        }

        *self.shared.bound.lock().expect("Failed to lock bound peripheral") = None;
        self.shared.set_state(SessionState::Uninitialized);
        info!("Done cleaning up");

        CleanupReport { failures }
    }

    /// Subscribes every channel again when bound, which recovers from the host silently dropping
    /// notifications. Otherwise the same as [`DeviceSession::connect`].
    pub async fn restart(&self) -> Result<(), SessionError> {
        let mut binding = self.binding.lock().await;

        if self.state() == SessionState::Bound {
            if let Some(current) = binding.as_ref() {
                info!("Setting bluetooth listeners again");
                let generation = self.shared.generation.load(Ordering::SeqCst);
                self.subscribe_all(&current.registry, generation).await?;
                info!("Done restarting");
                return Ok(());
            }
        }

        self.connect_locked(&mut binding).await
    }

    /// Sends a raw display frame.
    pub async fn write_display(&self, frame: &DisplayFrame) -> Result<(), SessionError> {
        let binding = self.binding.lock().await;

        let state = self.state();
        let current = match (state, binding.as_ref()) {
            (SessionState::Bound, Some(current)) => current,
            _ => return Err(SessionError::NotBound { state }),
        };

        self.host.write(current.registry.display(), frame.as_bytes()).await?;
        Ok(())
    }

    /// Shows `pattern` at full brightness for two seconds.
    pub async fn display(&self, pattern: &str) -> Result<(), SessionError> {
        self.display_with(pattern, DEFAULT_BRIGHTNESS, DEFAULT_TIMEOUT).await
    }

    pub async fn display_with(&self, pattern: &str, brightness: u8, timeout: u8) -> Result<(), SessionError> {
        let frame = encode_display(pattern, brightness, timeout)?;
        self.write_display(&frame).await
    }

    pub async fn display_for(&self, pattern: &str, brightness: u8, duration: Duration) -> Result<(), SessionError> {
        self.display_with(pattern, brightness, timeout_from_duration(duration)).await
    }
}

impl<H: BleHost> Drop for DeviceSession<H> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

use std::fmt;

use crate::device::constants::DEFAULT_DEVICE_NAME;

/// The five notification channels of the peripheral. The set is fixed by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    Battery,
    Button,
    Rotation,
    Swipe,
    Fly,
}

impl SensorChannel {
    pub const ALL: [SensorChannel; 5] = [
        SensorChannel::Battery,
        SensorChannel::Button,
        SensorChannel::Rotation,
        SensorChannel::Swipe,
        SensorChannel::Fly,
    ];

    /// Position of this channel in [`SensorChannel::ALL`], used as an arena index.
    pub fn index(self) -> usize {
        match self {
            SensorChannel::Battery => 0,
            SensorChannel::Button => 1,
            SensorChannel::Rotation => 2,
            SensorChannel::Swipe => 3,
            SensorChannel::Fly => 4,
        }
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SensorChannel::Battery => "battery",
            SensorChannel::Button => "button",
            SensorChannel::Rotation => "rotation",
            SensorChannel::Swipe => "swipe",
            SensorChannel::Fly => "fly",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Released,
    Pressed,
}

impl ButtonAction {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ButtonAction::Released),
            1 => Some(ButtonAction::Pressed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
    Up,
    Down,
}

impl SwipeDirection {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(SwipeDirection::Left),
            1 => Some(SwipeDirection::Right),
            2 => Some(SwipeDirection::Up),
            3 => Some(SwipeDirection::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlyDirection {
    Left,
    Right,
    Backwards,
    Towards,
    /// Hand hovering above the sensor; the event distance is meaningful only for this direction.
    UpDown,
}

impl FlyDirection {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FlyDirection::Left),
            1 => Some(FlyDirection::Right),
            2 => Some(FlyDirection::Backwards),
            3 => Some(FlyDirection::Towards),
            4 => Some(FlyDirection::UpDown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorEvent {
    Battery(u8), // [0, 100]
    Button(ButtonAction),
    /// Relative steps; clockwise is positive. Keeping an absolute position is up to the caller.
    Rotation(i16),
    Swipe(SwipeDirection),
    Fly { direction: FlyDirection, distance: u8 },
}

impl SensorEvent {
    pub fn channel(&self) -> SensorChannel {
        match self {
            SensorEvent::Battery(_) => SensorChannel::Battery,
            SensorEvent::Button(_) => SensorChannel::Button,
            SensorEvent::Rotation(_) => SensorChannel::Rotation,
            SensorEvent::Swipe(_) => SensorChannel::Swipe,
            SensorEvent::Fly { .. } => SensorChannel::Fly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Bound,
    Cleaning,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Bound => "bound",
            SessionState::Cleaning => "cleaning",
            SessionState::Error => "in error",
        };

        write!(f, "{}", result)
    }
}

/// Which peripheral a session binds to.
///
/// The address wins when set and is matched as a substring of the discovered address, both
/// normalized. Otherwise the advertised name must be equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralIdentity {
    name: Option<String>,
    address: Option<String>,
}

impl PeripheralIdentity {
    pub fn by_name(name: impl Into<String>) -> Self {
        PeripheralIdentity { name: Some(name.into()), address: None }
    }

    pub fn by_address(address: &str) -> Self {
        PeripheralIdentity { name: None, address: Some(normalize_address(address)) }
    }

    pub fn new(name: Option<String>, address: Option<&str>) -> Self {
        PeripheralIdentity {
            name,
            address: address.map(normalize_address),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref().filter(|address| !address.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.name().is_none() && self.address().is_none()
    }

    pub fn matches(&self, name: Option<&str>, address: &str) -> bool {
        match (self.address(), self.name()) {
            (Some(wanted), _) => normalize_address(address).contains(wanted),
            (None, Some(wanted)) => name == Some(wanted),
            (None, None) => false,
        }
    }
}

impl Default for PeripheralIdentity {
    fn default() -> Self {
        PeripheralIdentity::by_name(DEFAULT_DEVICE_NAME)
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.address(), self.name()) {
            (Some(address), _) => write!(f, "address '{}'", address),
            (None, Some(name)) => write!(f, "name '{}'", name),
            (None, None) => write!(f, "no identity"),
        }
    }
}

// "D3:B4:8A:8B:91:AC" => "d3b48a8b91ac"
pub fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// A peripheral as reported by the bluetooth host during discovery.
#[derive(Debug, Clone)]
pub struct PeripheralDescriptor<P> {
    pub name: Option<String>,
    pub address: String,
    pub handle: P,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: String,
}

use futures::channel::mpsc::Sender;
use log::debug;

use crate::device::types::{ButtonAction, FlyDirection, SensorEvent, SwipeDirection};

/// Receives the decoded events of a session. Every method defaults to doing nothing.
///
/// Methods are called without any session lock held, so an observer may replace or clear
/// itself on the session it observes.
pub trait SensorObserver: Send + 'static {
    /// `level` is a percentage: [0, 100]
    fn on_battery(&mut self, _level: u8) {}

    fn on_button(&mut self, _action: ButtonAction) {}

    /// Relative steps, clockwise > 0.
    fn on_rotation(&mut self, _delta_steps: i16) {}

    fn on_swipe(&mut self, _direction: SwipeDirection) {}

    /// `distance` is only meaningful for [`FlyDirection::UpDown`]: [0, 255]
    fn on_fly(&mut self, _direction: FlyDirection, _distance: u8) {}
}

pub fn notify_observer(observer: &mut dyn SensorObserver, event: SensorEvent) {
    match event {
        SensorEvent::Battery(level) => observer.on_battery(level),
        SensorEvent::Button(action) => observer.on_button(action),
        SensorEvent::Rotation(delta_steps) => observer.on_rotation(delta_steps),
        SensorEvent::Swipe(direction) => observer.on_swipe(direction),
        SensorEvent::Fly { direction, distance } => observer.on_fly(direction, distance),
    }
}

/// Holds at most one observer; registering another replaces it.
#[derive(Default)]
pub struct EventDispatch {
    observer: Option<Box<dyn SensorObserver>>,
    // bumped by every set/clear, so an observer lent out by take_observer is not put back
    // over a newer registration
    revision: u64,
}

impl EventDispatch {
    pub fn set_observer(&mut self, observer: Box<dyn SensorObserver>) {
        self.revision += 1;
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) -> Option<Box<dyn SensorObserver>> {
        self.revision += 1;
        self.observer.take()
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    /// Lends the observer out so it can be called without holding the dispatch.
    pub fn take_observer(&mut self) -> Option<(u64, Box<dyn SensorObserver>)> {
        let revision = self.revision;
        self.observer.take().map(|observer| (revision, observer))
    }

    /// Puts back an observer from [`EventDispatch::take_observer`], unless it was replaced or
    /// cleared in the meantime. Returns it in that case.
    pub fn return_observer(&mut self, revision: u64, observer: Box<dyn SensorObserver>) -> Option<Box<dyn SensorObserver>> {
        if revision == self.revision && self.observer.is_none() {
            self.observer = Some(observer);
            None
        } else {
            Some(observer)
        }
    }

    pub fn dispatch(&mut self, event: SensorEvent) {
        if let Some(observer) = self.observer.as_mut() {
            notify_observer(observer.as_mut(), event);
        }
    }
}

/// Observer that forwards every event into a channel.
///
/// A full or closed channel drops the event; the session never waits on the receiver.
pub struct EventForwarder {
    sender: Sender<SensorEvent>,
}

impl EventForwarder {
    pub fn new(sender: Sender<SensorEvent>) -> Self {
        EventForwarder { sender }
    }

    fn forward(&mut self, event: SensorEvent) {
        if let Err(err) = self.sender.try_send(event) {
            debug!("Dropping {:?}: {}", event, err);
        }
    }
}

impl SensorObserver for EventForwarder {
    fn on_battery(&mut self, level: u8) {
        self.forward(SensorEvent::Battery(level));
    }

    fn on_button(&mut self, action: ButtonAction) {
        self.forward(SensorEvent::Button(action));
    }

    fn on_rotation(&mut self, delta_steps: i16) {
        self.forward(SensorEvent::Rotation(delta_steps));
    }

    fn on_swipe(&mut self, direction: SwipeDirection) {
        self.forward(SensorEvent::Swipe(direction));
    }

    fn on_fly(&mut self, direction: FlyDirection, distance: u8) {
        self.forward(SensorEvent::Fly { direction, distance });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use futures::channel::mpsc::channel;

    use super::*;

    #[derive(Default)]
    struct Counting {
        rotation: Arc<Mutex<i32>>,
    }

    impl SensorObserver for Counting {
        fn on_rotation(&mut self, delta_steps: i16) {
            *self.rotation.lock().unwrap() += i32::from(delta_steps);
        }
    }

    #[test]
    fn test_dispatch_without_observer_is_silent() {
        let mut dispatch = EventDispatch::default();
        assert!(!dispatch.has_observer());
        dispatch.dispatch(SensorEvent::Rotation(3));
    }

    #[test]
    fn test_observer_is_replaced() {
        let first = Counting::default();
        let first_total = first.rotation.clone();
        let second = Counting::default();
        let second_total = second.rotation.clone();

        let mut dispatch = EventDispatch::default();
        dispatch.set_observer(Box::new(first));
        dispatch.dispatch(SensorEvent::Rotation(2));
        dispatch.set_observer(Box::new(second));
        dispatch.dispatch(SensorEvent::Rotation(-5));
        // not a rotation, ignored by the default method
        dispatch.dispatch(SensorEvent::Battery(50));

        assert_eq!(*first_total.lock().unwrap(), 2);
        assert_eq!(*second_total.lock().unwrap(), -5);

        assert!(dispatch.clear_observer().is_some());
        assert!(!dispatch.has_observer());
    }

    #[test]
    fn test_lent_observer_is_returned() {
        let observer = Counting::default();
        let total = observer.rotation.clone();
        let mut dispatch = EventDispatch::default();
        dispatch.set_observer(Box::new(observer));

        let (revision, mut observer) = dispatch.take_observer().unwrap();
        assert!(!dispatch.has_observer());
        notify_observer(observer.as_mut(), SensorEvent::Rotation(4));
        assert!(dispatch.return_observer(revision, observer).is_none());

        dispatch.dispatch(SensorEvent::Rotation(1));
        assert_eq!(*total.lock().unwrap(), 5);
    }

    #[test]
    fn test_lent_observer_does_not_override_newer_registration() {
        let first = Counting::default();
        let first_total = first.rotation.clone();
        let second = Counting::default();
        let second_total = second.rotation.clone();
        let mut dispatch = EventDispatch::default();
        dispatch.set_observer(Box::new(first));

        let (revision, observer) = dispatch.take_observer().unwrap();
        dispatch.set_observer(Box::new(second));
        assert!(dispatch.return_observer(revision, observer).is_some());
        dispatch.dispatch(SensorEvent::Rotation(-2));

        assert_eq!(*first_total.lock().unwrap(), 0);
        assert_eq!(*second_total.lock().unwrap(), -2);

        // cleared while lent out: stays cleared
        let (revision, observer) = dispatch.take_observer().unwrap();
        assert!(dispatch.clear_observer().is_none());
        assert!(dispatch.return_observer(revision, observer).is_some());
        assert!(!dispatch.has_observer());
    }

    #[test]
    fn test_forwarder_drops_when_full() {
        let (sender, mut receiver) = channel::<SensorEvent>(0);
        let mut dispatch = EventDispatch::default();
        dispatch.set_observer(Box::new(EventForwarder::new(sender)));

        let events = [
            SensorEvent::Fly { direction: FlyDirection::Left, distance: 0 },
            SensorEvent::Swipe(SwipeDirection::Up),
        ];
        for event in events {
            dispatch.dispatch(event);
        }

        assert_eq!(receiver.try_next().unwrap(), Some(events[0]));
        assert!(receiver.try_next().is_err());
    }
}

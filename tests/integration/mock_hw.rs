//! Mock hardware adapters for integration tests.
//!
//! Records every output call and pin write so tests can assert on the
//! full command history without touching real GPIO/PWM registers.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use hydroctl::app::events::AppEvent;
use hydroctl::app::ports::{ConfigError, ConfigPort, EventSink, OutputPort};
use hydroctl::error::ActuatorError;
use hydroctl::identity::Key;
use hydroctl::objects::ObjectData;

// ── Output call record ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputCall {
    Drive(f32),
    Disable,
}

/// Output port that records every call.  Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    calls: Rc<RefCell<Vec<OutputCall>>>,
}

#[allow(dead_code)]
impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn OutputPort> {
        Box::new(self.clone())
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Level of the most recent call; `None` if off or never written.
    pub fn level(&self) -> Option<f32> {
        match self.calls.borrow().last() {
            Some(OutputCall::Drive(level)) => Some(*level),
            _ => None,
        }
    }

    pub fn is_on(&self) -> bool {
        self.level().is_some_and(|l| l != 0.0)
    }
}

impl OutputPort for RecordingOutput {
    fn drive(&mut self, intensity: f32) -> Result<(), ActuatorError> {
        self.calls.borrow_mut().push(OutputCall::Drive(intensity));
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ActuatorError> {
        self.calls.borrow_mut().push(OutputCall::Disable);
        Ok(())
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activations(&self, key: Key) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::Activated { key: k, .. } if *k == key))
            .count()
    }

    pub fn deactivations(&self, key: Key) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::Deactivated { key: k } if *k == key))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Config store that always fails ───────────────────────────

#[allow(dead_code)]
pub struct BrokenStore;

impl ConfigPort for BrokenStore {
    fn load(&self) -> Result<Vec<ObjectData>, ConfigError> {
        Err(ConfigError::IoError)
    }

    fn save(&mut self, _objects: &[ObjectData]) -> Result<(), ConfigError> {
        Err(ConfigError::IoError)
    }
}

// ── embedded-hal mocks ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockHalError;

impl digital::Error for MockHalError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl pwm::Error for MockHalError {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

/// GPIO that records levels (`true` = high).
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    pub levels: Rc<RefCell<Vec<bool>>>,
    pub broken: bool,
}

#[allow(dead_code)]
impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<bool> {
        self.levels.borrow().last().copied()
    }
}

impl digital::ErrorType for MockPin {
    type Error = MockHalError;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(MockHalError);
        }
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.broken {
            return Err(MockHalError);
        }
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}

/// 8-bit PWM channel that records duty writes.
#[derive(Debug, Clone, Default)]
pub struct MockPwm {
    pub duties: Rc<RefCell<Vec<u16>>>,
}

#[allow(dead_code)]
impl MockPwm {
    pub const MAX: u16 = 255;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<u16> {
        self.duties.borrow().last().copied()
    }
}

impl pwm::ErrorType for MockPwm {
    type Error = MockHalError;
}

impl SetDutyCycle for MockPwm {
    fn max_duty_cycle(&self) -> u16 {
        Self::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.duties.borrow_mut().push(duty);
        Ok(())
    }
}

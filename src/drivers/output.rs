//! Output drivers: [`OutputPort`] implementations over `embedded-hal`.
//!
//! | Driver         | Hardware                                  |
//! |----------------|-------------------------------------------|
//! | `BinaryOutput` | relay / MOSFET on one GPIO                |
//! | `PwmOutput`    | PWM channel, optional direction pin       |
//! | `NullOutput`   | nothing (unwired actuators)               |
//! | `SimOutput`    | in-memory, for host builds and tests      |
//!
//! ## Dual-target design
//!
//! On hardware the HAL supplies the pin and PWM types.
//! On host/test `SimOutput` tracks state in memory only.
//!
//! These are dumb actuators: gating and arbitration happen upstream,
//! the driver only turns an intensity into pin writes.

use core::convert::Infallible;
use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};
use log::warn;

use crate::app::ports::OutputPort;
use crate::error::ActuatorError;

// ---------------------------------------------------------------------------
// Binary (relay) output
// ---------------------------------------------------------------------------

/// On/off output: any non-zero intensity closes the relay.
pub struct BinaryOutput<P: OutputPin> {
    pin: P,
    active_low: bool,
}

impl<P: OutputPin> BinaryOutput<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    /// For relay boards that energise on a low level.
    pub fn active_low(mut self) -> Self {
        self.active_low = true;
        self
    }

    fn write(&mut self, on: bool) -> Result<(), ActuatorError> {
        let result = if on != self.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|e| {
            warn!("BinaryOutput: pin write failed: {:?}", digital::Error::kind(&e));
            ActuatorError::OutputWriteFailed
        })
    }

    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> OutputPort for BinaryOutput<P> {
    fn drive(&mut self, intensity: f32) -> Result<(), ActuatorError> {
        self.write(intensity != 0.0)
    }

    fn disable(&mut self) -> Result<(), ActuatorError> {
        self.write(false)
    }
}

// ---------------------------------------------------------------------------
// PWM output
// ---------------------------------------------------------------------------

/// Placeholder direction pin for single-direction PWM outputs.
pub struct NoDirection;

impl digital::ErrorType for NoDirection {
    type Error = Infallible;
}

impl OutputPin for NoDirection {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Variable-intensity output.  With a direction pin (H-bridge) negative
/// intensities run in reverse; without one they read as off.
pub struct PwmOutput<P: SetDutyCycle, D: OutputPin = NoDirection> {
    pwm: P,
    direction: Option<D>,
}

impl<P: SetDutyCycle> PwmOutput<P, NoDirection> {
    pub fn new(pwm: P) -> Self {
        Self {
            pwm,
            direction: None,
        }
    }
}

impl<P: SetDutyCycle, D: OutputPin> PwmOutput<P, D> {
    /// Bipolar output; `direction` high means forward.
    pub fn with_direction(pwm: P, direction: D) -> Self {
        Self {
            pwm,
            direction: Some(direction),
        }
    }

    fn set_forward(&mut self, forward: bool) -> Result<(), ActuatorError> {
        let Some(dir) = self.direction.as_mut() else {
            return Ok(());
        };
        let result = if forward { dir.set_high() } else { dir.set_low() };
        result.map_err(|e| {
            warn!("PwmOutput: direction write failed: {:?}", digital::Error::kind(&e));
            ActuatorError::OutputWriteFailed
        })
    }

    fn set_duty(&mut self, magnitude: f32) -> Result<(), ActuatorError> {
        let max = self.pwm.max_duty_cycle();
        let duty = (magnitude.clamp(0.0, 1.0) * f32::from(max)).round() as u16;
        self.pwm.set_duty_cycle(duty.min(max)).map_err(|e| {
            warn!("PwmOutput: duty write failed: {:?}", pwm::Error::kind(&e));
            ActuatorError::OutputWriteFailed
        })
    }
}

impl<P: SetDutyCycle, D: OutputPin> OutputPort for PwmOutput<P, D> {
    fn drive(&mut self, intensity: f32) -> Result<(), ActuatorError> {
        let magnitude = if self.direction.is_some() {
            intensity.abs()
        } else {
            intensity.max(0.0)
        };
        self.set_forward(intensity >= 0.0)?;
        self.set_duty(magnitude)
    }

    fn disable(&mut self) -> Result<(), ActuatorError> {
        self.set_duty(0.0)?;
        self.set_forward(true)
    }
}

// ---------------------------------------------------------------------------
// Null output
// ---------------------------------------------------------------------------

/// Accepts every write.  For actuators with no wiring yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl OutputPort for NullOutput {
    fn drive(&mut self, _intensity: f32) -> Result<(), ActuatorError> {
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ActuatorError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulated output
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SimState {
    level: Option<f32>,
    drives: u32,
    disables: u32,
    fail_writes: u32,
}

/// In-memory output.  Clones share state, so a test keeps one clone as a
/// monitor while the actuator owns the other.
#[derive(Debug, Clone, Default)]
pub struct SimOutput {
    state: Rc<RefCell<SimState>>,
}

impl SimOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current drive level; `None` while disabled.
    pub fn level(&self) -> Option<f32> {
        self.state.borrow().level
    }

    pub fn drive_count(&self) -> u32 {
        self.state.borrow().drives
    }

    pub fn disable_count(&self) -> u32 {
        self.state.borrow().disables
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.state.borrow_mut().fail_writes = n;
    }

    fn take_failure(&self) -> Result<(), ActuatorError> {
        let mut s = self.state.borrow_mut();
        if s.fail_writes > 0 {
            s.fail_writes -= 1;
            return Err(ActuatorError::OutputWriteFailed);
        }
        Ok(())
    }
}

impl OutputPort for SimOutput {
    fn drive(&mut self, intensity: f32) -> Result<(), ActuatorError> {
        self.take_failure()?;
        let mut s = self.state.borrow_mut();
        s.level = Some(intensity);
        s.drives += 1;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ActuatorError> {
        self.take_failure()?;
        let mut s = self.state.borrow_mut();
        s.level = None;
        s.disables += 1;
        Ok(())
    }
}

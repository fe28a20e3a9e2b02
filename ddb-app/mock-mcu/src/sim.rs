//! Console-backed stand-ins for the motor driver pins.

use std::convert::Infallible;

use embedded_hal::{
    digital::{self, OutputPin},
    pwm::{self, SetDutyCycle},
};
use tracing::debug;

/// Direction (phase) output that logs every level change.
pub struct SimPin {
    label: &'static str,
    gpio: u8,
}

impl SimPin {
    pub fn new(
        label: &'static str,
        gpio: u8,
    ) -> Self {
        debug!(pin = label, gpio, "pin configured as output");
        Self { label, gpio }
    }
}

impl digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        debug!(pin = self.label, gpio = self.gpio, "LOW");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        debug!(pin = self.label, gpio = self.gpio, "HIGH");
        Ok(())
    }
}

/// PWM (enable) output that logs every duty write.
pub struct SimPwm {
    label: &'static str,
    gpio: u8,
    max: u16,
    duty: u16,
}

impl SimPwm {
    pub fn new(
        label: &'static str,
        gpio: u8,
        max: u16,
        freq_hz: u32,
    ) -> Self {
        debug!(pin = label, gpio, max, freq_hz, "pwm configured");
        Self {
            label,
            gpio,
            max,
            duty: 0,
        }
    }
}

impl pwm::ErrorType for SimPwm {
    type Error = Infallible;
}

impl SetDutyCycle for SimPwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        if duty != self.duty {
            let percent = if self.max == 0 {
                0.0
            } else {
                duty as f32 * 100.0 / self.max as f32
            };
            debug!(pin = self.label, gpio = self.gpio, duty, percent, "duty");
        }
        self.duty = duty;
        Ok(())
    }
}

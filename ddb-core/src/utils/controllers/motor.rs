//! PH/EN motor actuation for the Diff-Drive Bot.
//!
//! Each motor driver takes one direction (phase) pin and one PWM (enable)
//! output. A normalized velocity in `[-1, 1]` becomes a direction level plus a
//! duty cycle scaled by the configured output ceiling.

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};

use crate::utils::config::DriveConfig;

/// Commands closer to zero than this are treated as an exact stop.
pub const DEAD_ZONE: f32 = 0.001;

/// Errors raised by the underlying pin or PWM peripheral.
#[derive(Debug)]
pub enum ActuatorError<PinE, PwmE> {
    Direction(PinE),
    Duty(PwmE),
}

/// Which side of the drive train a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Clamp a command into `[-1, 1]`, mapping NaN to a stop.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Duty magnitude for a normalized command.
///
/// `round(|value| * max_duty * output_scale)` clamped to `[0, max_duty]`, with
/// the dead-zone mapped to 0.
pub fn duty_for(
    value: f32,
    max_duty: u16,
    output_scale: f32,
) -> u16 {
    let magnitude = libm::fabsf(clamp_unit(value));
    if magnitude < DEAD_ZONE {
        return 0;
    }
    let max = max_duty as f32;
    let duty = libm::roundf(magnitude * max * output_scale);
    duty.clamp(0.0, max) as u16
}

/// One PH/EN motor channel.
pub struct MotorChannel<Dir, Pwm> {
    dir: Dir,
    pwm: Pwm,
}

impl<Dir, Pwm> MotorChannel<Dir, Pwm>
where
    Dir: OutputPin,
    Pwm: SetDutyCycle,
{
    pub fn new(
        dir: Dir,
        pwm: Pwm,
    ) -> Self {
        Self { dir, pwm }
    }

    /// Drive the channel with a normalized command.
    ///
    /// Forward sets the phase pin HIGH, reverse and stop set it LOW. The duty
    /// never exceeds the smaller of `max_duty` and the peripheral's own limit.
    pub fn apply(
        &mut self,
        value: f32,
        max_duty: u16,
        output_scale: f32,
    ) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>> {
        let value = clamp_unit(value);
        let max_duty = max_duty.min(self.pwm.max_duty_cycle());

        if libm::fabsf(value) < DEAD_ZONE {
            self.dir.set_low().map_err(ActuatorError::Direction)?;
            return self.pwm.set_duty_cycle(0).map_err(ActuatorError::Duty);
        }

        if value > 0.0 {
            self.dir.set_high().map_err(ActuatorError::Direction)?;
        } else {
            self.dir.set_low().map_err(ActuatorError::Direction)?;
        }
        self.pwm
            .set_duty_cycle(duty_for(value, max_duty, output_scale))
            .map_err(ActuatorError::Duty)
    }

    /// Cut the duty to zero, leaving the direction pin as it is.
    pub fn stop(&mut self) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>> {
        self.pwm.set_duty_cycle(0).map_err(ActuatorError::Duty)
    }
}

/// Left and right motor channels plus the shared duty settings.
///
/// A channel that was never wired is `None`; every call on it is a no-op.
pub struct DriveTrain<Dir, Pwm> {
    left: Option<MotorChannel<Dir, Pwm>>,
    right: Option<MotorChannel<Dir, Pwm>>,
    max_duty: u16,
    output_scale: f32,
}

impl<Dir, Pwm> DriveTrain<Dir, Pwm>
where
    Dir: OutputPin,
    Pwm: SetDutyCycle,
{
    pub fn new(
        left: Option<MotorChannel<Dir, Pwm>>,
        right: Option<MotorChannel<Dir, Pwm>>,
        config: &DriveConfig,
    ) -> Self {
        let mut train = Self {
            left,
            right,
            max_duty: config.max_duty(),
            output_scale: 0.0,
        };
        train.set_output_scale(config.output_scale);
        train
    }

    /// A drive train with no channels wired.
    pub fn unconfigured(config: &DriveConfig) -> Self {
        Self::new(None, None, config)
    }

    /// True once at least one channel has pins assigned.
    pub fn is_configured(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    pub fn output_scale(&self) -> f32 {
        self.output_scale
    }

    /// Adjust the duty ceiling at runtime, clamped to `[0, 1]`.
    pub fn set_output_scale(
        &mut self,
        scale: f32,
    ) {
        self.output_scale = if scale.is_nan() {
            0.0
        } else {
            scale.clamp(0.0, 1.0)
        };
        tracing::info!(scale = self.output_scale, "motor output scale set");
    }

    /// Put both drivers in a known state: phase LOW, duty 0.
    pub fn init(&mut self) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>> {
        self.apply_motors(0.0, 0.0)
    }

    pub fn set_channel(
        &mut self,
        side: Side,
        value: f32,
    ) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>> {
        let (max_duty, scale) = (self.max_duty, self.output_scale);
        let channel = match side {
            Side::Left => self.left.as_mut(),
            Side::Right => self.right.as_mut(),
        };
        match channel {
            Some(ch) => ch.apply(value, max_duty, scale),
            None => Ok(()),
        }
    }

    /// Apply both channels, left first. A failing left channel does not keep
    /// the right one from being written.
    pub fn apply_motors(
        &mut self,
        left: f32,
        right: f32,
    ) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>> {
        let left = self.set_channel(Side::Left, left);
        let right = self.set_channel(Side::Right, right);
        left.and(right)
    }

    /// Hardware-level kill switch: zero duty on both channels regardless of
    /// any stored command.
    pub fn stop_all(&mut self) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>> {
        // Both channels are attempted even if the first fails.
        let left = self.left.as_mut().map_or(Ok(()), MotorChannel::stop);
        let right = self.right.as_mut().map_or(Ok(()), MotorChannel::stop);
        left.and(right)
    }
}

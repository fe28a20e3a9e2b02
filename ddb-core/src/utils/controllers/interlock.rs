//! Shared drive state and the emergency-stop latch.

use embedded_hal::{delay::DelayNs, digital::OutputPin, pwm::SetDutyCycle};

use super::{
    motor::{clamp_unit, ActuatorError, DriveTrain},
    soft_start::SoftStart,
};

/// Last accepted command and the latch state.
///
/// While `emergency_stop` is set both velocities are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveState {
    pub emergency_stop: bool,
    pub left_velocity: f32,
    pub right_velocity: f32,
}

impl DriveState {
    /// Store a new command, clamped to `[-1, 1]`.
    ///
    /// Returns `false` without touching anything when the latch is engaged.
    pub fn set_velocities(
        &mut self,
        left: f32,
        right: f32,
    ) -> bool {
        if self.emergency_stop {
            return false;
        }
        self.left_velocity = clamp_unit(left);
        self.right_velocity = clamp_unit(right);
        true
    }

    /// Engage or release the latch. Engaging zeroes the stored command and
    /// cuts both PWM outputs immediately.
    pub fn set_estop<Dir, Pwm, D>(
        &mut self,
        on: bool,
        train: &mut DriveTrain<Dir, Pwm>,
        soft_start: &mut SoftStart<D>,
    ) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>>
    where
        Dir: OutputPin,
        Pwm: SetDutyCycle,
        D: DelayNs,
    {
        self.emergency_stop = on;
        if !on {
            return Ok(());
        }
        tracing::warn!("emergency stop engaged");
        self.left_velocity = 0.0;
        self.right_velocity = 0.0;
        soft_start.rearm();
        train.stop_all()
    }

    /// Back to the power-on state: latch released, command zeroed, outputs off.
    pub fn reset<Dir, Pwm, D>(
        &mut self,
        train: &mut DriveTrain<Dir, Pwm>,
        soft_start: &mut SoftStart<D>,
    ) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>>
    where
        Dir: OutputPin,
        Pwm: SetDutyCycle,
        D: DelayNs,
    {
        *self = DriveState::default();
        soft_start.rearm();
        train.stop_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocities_are_clamped() {
        let mut state = DriveState::default();
        assert!(state.set_velocities(1.7, -4.0));
        assert_eq!(state.left_velocity, 1.0);
        assert_eq!(state.right_velocity, -1.0);
    }

    #[test]
    fn latched_state_ignores_commands() {
        let mut state = DriveState {
            emergency_stop: true,
            ..Default::default()
        };
        assert!(!state.set_velocities(0.5, 0.5));
        assert_eq!(state.left_velocity, 0.0);
        assert_eq!(state.right_velocity, 0.0);
    }
}

//! Soft-start sequencing for the drive train.
//!
//! Going from standstill straight to a large duty pulls a current spike from
//! the battery and jerks the chassis. When both wheels were stopped and a new
//! command asks for motion, the sequencer ramps the left motor through
//! 30%/60%/100% of its target, pauses, then does the same for the right motor.
//! The ramp blocks the caller until both motors are at their final value.

use embedded_hal::{delay::DelayNs, digital::OutputPin, pwm::SetDutyCycle};

use super::motor::{ActuatorError, DriveTrain, Side};

/// Both commands below this magnitude count as "stopped".
pub const STOP_THRESHOLD: f32 = 0.02;
/// Fractions of the final command applied on the way up.
pub const RAMP_STEPS: [f32; 3] = [0.3, 0.6, 1.0];
/// Hold between ramp steps of one motor.
pub const STEP_HOLD_MS: u32 = 30;
/// Hold between finishing the left motor and starting the right one.
pub const MOTOR_GAP_MS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPhase {
    /// Stopped and armed, or a ramp failed; the next motion command ramps.
    Idle,
    /// Ramp in progress.
    Ramping,
    /// Ramp done, commands pass straight through.
    Running,
}

pub struct SoftStart<D> {
    delay: D,
    phase: RampPhase,
}

fn is_stopped(
    left: f32,
    right: f32,
) -> bool {
    libm::fabsf(left) < STOP_THRESHOLD && libm::fabsf(right) < STOP_THRESHOLD
}

impl<D: DelayNs> SoftStart<D> {
    pub fn new(delay: D) -> Self {
        Self {
            delay,
            phase: RampPhase::Idle,
        }
    }

    pub fn phase(&self) -> RampPhase {
        self.phase
    }

    /// True while a ramp is being sequenced.
    pub fn startup_in_progress(&self) -> bool {
        self.phase == RampPhase::Ramping
    }

    /// Forget any completed ramp so the next motion command ramps again.
    pub fn rearm(&mut self) {
        self.phase = RampPhase::Idle;
    }

    /// Apply a command to the drive train, ramping on a stop-to-drive edge.
    pub fn apply<Dir, Pwm>(
        &mut self,
        train: &mut DriveTrain<Dir, Pwm>,
        left: f32,
        right: f32,
    ) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>>
    where
        Dir: OutputPin,
        Pwm: SetDutyCycle,
    {
        let stopped = is_stopped(left, right);
        match self.phase {
            RampPhase::Idle if !stopped => {
                if !train.is_configured() {
                    tracing::warn!("motor pins not configured, skipping soft start");
                    self.phase = RampPhase::Running;
                    return train.apply_motors(left, right);
                }
                self.phase = RampPhase::Ramping;
                let result = self.ramp(train, left, right);
                // An aborted ramp stays armed so the next command retries it.
                self.phase = match result {
                    Ok(()) => RampPhase::Running,
                    Err(_) => RampPhase::Idle,
                };
                result
            }
            RampPhase::Running if stopped => {
                self.phase = RampPhase::Idle;
                train.apply_motors(left, right)
            }
            _ => train.apply_motors(left, right),
        }
    }

    fn ramp<Dir, Pwm>(
        &mut self,
        train: &mut DriveTrain<Dir, Pwm>,
        left: f32,
        right: f32,
    ) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>>
    where
        Dir: OutputPin,
        Pwm: SetDutyCycle,
    {
        tracing::debug!(left, right, "soft start ramp");
        train.set_channel(Side::Right, 0.0)?;
        self.ramp_channel(train, Side::Left, left)?;
        self.delay.delay_ms(MOTOR_GAP_MS);
        self.ramp_channel(train, Side::Right, right)
    }

    fn ramp_channel<Dir, Pwm>(
        &mut self,
        train: &mut DriveTrain<Dir, Pwm>,
        side: Side,
        target: f32,
    ) -> Result<(), ActuatorError<Dir::Error, Pwm::Error>>
    where
        Dir: OutputPin,
        Pwm: SetDutyCycle,
    {
        for (i, fraction) in RAMP_STEPS.iter().enumerate() {
            if i > 0 {
                self.delay.delay_ms(STEP_HOLD_MS);
            }
            train.set_channel(side, target * fraction)?;
        }
        Ok(())
    }
}

//! Drive control for the Diff-Drive Bot.
//!
//! - `motor`: PH/EN actuation of the two wheel motors.
//! - `soft_start`: stop-to-drive ramp sequencing.
//! - `interlock`: shared drive state and the emergency-stop latch.
//!
//! `DriveController` owns all of these and is the single place where inbound
//! commands mutate state. The server and heartbeat tasks share it through a
//! `SharedController` mutex, so every event is handled to completion before
//! the next one starts.

pub mod interlock;
pub mod motor;
pub mod soft_start;

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embedded_hal::{delay::DelayNs, digital::OutputPin, pwm::SetDutyCycle};

pub use interlock::DriveState;
pub use motor::{ActuatorError, DriveTrain, MotorChannel, Side};
pub use soft_start::{RampPhase, SoftStart};

use crate::utils::{
    config::DriveConfig,
    connection::{
        channel::{ClientId, MessageChannel},
        heartbeat::Heartbeat,
        messages::{self, Command, Reply, Status},
    },
};

/// Controller shared between the connection and heartbeat tasks.
pub type SharedController<Dir, Pwm, D> =
    Mutex<CriticalSectionRawMutex, DriveController<Dir, Pwm, D>>;

/// Command processor owning the drive state and hardware.
pub struct DriveController<Dir, Pwm, D> {
    state: DriveState,
    train: DriveTrain<Dir, Pwm>,
    soft_start: SoftStart<D>,
    heartbeat: Heartbeat,
}

impl<Dir, Pwm, D> DriveController<Dir, Pwm, D>
where
    Dir: OutputPin,
    Pwm: SetDutyCycle,
    D: DelayNs,
{
    /// Build the controller and put both motor drivers in a stopped state.
    pub fn new(
        train: DriveTrain<Dir, Pwm>,
        delay: D,
        config: &DriveConfig,
    ) -> Self {
        let mut ctrl = Self {
            state: DriveState::default(),
            train,
            soft_start: SoftStart::new(delay),
            heartbeat: Heartbeat::new(config.heartbeat_interval_ms),
        };
        if !ctrl.train.is_configured() {
            tracing::warn!("no motor channels configured, actuation disabled");
        }
        let init = ctrl.train.init();
        ctrl.log_hw(init);
        ctrl
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    pub fn ramp_phase(&self) -> RampPhase {
        self.soft_start.phase()
    }

    pub fn output_scale(&self) -> f32 {
        self.train.output_scale()
    }

    /// Change the duty ceiling; takes effect on the next actuation.
    pub fn set_output_scale(
        &mut self,
        scale: f32,
    ) {
        self.train.set_output_scale(scale);
    }

    /// Status snapshot stamped with `now_ms`.
    pub fn status(
        &self,
        now_ms: u64,
    ) -> Status {
        Status {
            ok: true,
            ts: now_ms,
            left: self.state.left_velocity,
            right: self.state.right_velocity,
            estop: self.state.emergency_stop,
        }
    }

    /// Greet a freshly connected client.
    pub fn on_connect<C: MessageChannel>(
        &mut self,
        client: ClientId,
        now_ms: u64,
        channel: &mut C,
    ) {
        tracing::info!(%client, "client connected");
        let hello = Reply::hello(now_ms, self.state.emergency_stop);
        send(channel, client, &hello);
    }

    /// Decode and execute one inbound frame, replying to its sender.
    pub fn on_message<C: MessageChannel>(
        &mut self,
        client: ClientId,
        payload: &[u8],
        now_ms: u64,
        channel: &mut C,
    ) {
        let reply = match messages::decode(payload) {
            Ok(cmd) => {
                self.execute(cmd);
                Reply::Status(self.status(now_ms))
            }
            Err(_) => Reply::bad_json(),
        };
        send(channel, client, &reply);
    }

    /// Reject a frame too large to be read, leaving state untouched.
    pub fn on_oversized<C: MessageChannel>(
        &mut self,
        client: ClientId,
        channel: &mut C,
    ) {
        send(channel, client, &Reply::bad_json());
    }

    /// Periodic hook; broadcasts the status when a heartbeat is due.
    pub fn tick<C: MessageChannel>(
        &mut self,
        now_ms: u64,
        channel: &mut C,
    ) {
        if !self.heartbeat.due(now_ms) {
            return;
        }
        match Reply::Status(self.status(now_ms)).encode() {
            Ok(body) => channel.broadcast(&body),
            Err(error) => tracing::error!(?error, "failed to encode heartbeat"),
        }
    }

    /// Apply a decoded command to the state and hardware.
    pub fn execute(
        &mut self,
        cmd: Command,
    ) {
        tracing::debug!(?cmd, "executing command");
        match cmd {
            Command::Drive { left, right } => {
                if !self.state.set_velocities(left, right) {
                    tracing::debug!("drive ignored while emergency stop is engaged");
                    return;
                }
                let (l, r) = (self.state.left_velocity, self.state.right_velocity);
                let res = self.soft_start.apply(&mut self.train, l, r);
                self.log_hw(res);
            }
            Command::Estop { on } => {
                let res = self
                    .state
                    .set_estop(on, &mut self.train, &mut self.soft_start);
                self.log_hw(res);
            }
            Command::Reset => {
                tracing::info!("drive state reset");
                let res = self.state.reset(&mut self.train, &mut self.soft_start);
                self.log_hw(res);
            }
            Command::Ping | Command::Unknown => {}
        }
    }

    fn log_hw(
        &self,
        result: Result<(), ActuatorError<Dir::Error, Pwm::Error>>,
    ) {
        if let Err(error) = result {
            tracing::error!(?error, "motor write failed");
        }
    }
}

fn send<C: MessageChannel>(
    channel: &mut C,
    client: ClientId,
    reply: &Reply,
) {
    match reply.encode() {
        Ok(body) => channel.send_to(client, &body),
        Err(error) => tracing::error!(?error, %client, "failed to encode reply"),
    }
}

//! Recording hardware and transport doubles shared by the integration tests.
#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    convert::Infallible,
    rc::Rc,
};

use ddb_core::utils::{
    config::DriveConfig,
    connection::channel::{ClientId, MessageChannel},
    controllers::{DriveController, DriveTrain, MotorChannel, Side},
};
use embedded_hal::{
    delay::DelayNs,
    digital::{self, OutputPin},
    pwm::{self, SetDutyCycle},
};
use serde_json::Value;

/// One observable hardware action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HwEvent {
    Dir(Side, bool),
    Duty(Side, u16),
    Delay(u32),
}

pub type HwLog = Rc<RefCell<Vec<HwEvent>>>;

pub struct FakePin {
    side: Side,
    log: HwLog,
}

impl FakePin {
    pub fn new(
        side: Side,
        log: &HwLog,
    ) -> Self {
        Self {
            side,
            log: log.clone(),
        }
    }
}

impl digital::ErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(HwEvent::Dir(self.side, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(HwEvent::Dir(self.side, true));
        Ok(())
    }
}

/// Error returned by a `FakePwm` whose fault has tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwFault;

impl pwm::Error for HwFault {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

/// Shared switch that makes a `FakePwm` start failing.
///
/// Writes succeed until `fail_after(n)` has let `n` more through; every write
/// after that fails without reaching the log.
#[derive(Debug, Clone, Default)]
pub struct PwmFault(Rc<Cell<Option<u32>>>);

impl PwmFault {
    pub fn fail_after(
        &self,
        writes: u32,
    ) {
        self.0.set(Some(writes));
    }

    pub fn heal(&self) {
        self.0.set(None);
    }

    fn check(&self) -> Result<(), HwFault> {
        match self.0.get() {
            None => Ok(()),
            Some(0) => Err(HwFault),
            Some(n) => {
                self.0.set(Some(n - 1));
                Ok(())
            }
        }
    }
}

pub struct FakePwm {
    side: Side,
    max: u16,
    log: HwLog,
    fault: PwmFault,
}

impl FakePwm {
    pub fn new(
        side: Side,
        max: u16,
        log: &HwLog,
    ) -> Self {
        Self {
            side,
            max,
            log: log.clone(),
            fault: PwmFault::default(),
        }
    }

    pub fn with_fault(
        mut self,
        fault: &PwmFault,
    ) -> Self {
        self.fault = fault.clone();
        self
    }
}

impl pwm::ErrorType for FakePwm {
    type Error = HwFault;
}

impl SetDutyCycle for FakePwm {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        self.fault.check()?;
        self.log.borrow_mut().push(HwEvent::Duty(self.side, duty));
        Ok(())
    }
}

pub struct FakeDelay {
    log: HwLog,
}

impl FakeDelay {
    pub fn new(log: &HwLog) -> Self {
        Self { log: log.clone() }
    }
}

impl DelayNs for FakeDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.log.borrow_mut().push(HwEvent::Delay(ns / 1_000_000));
    }

    fn delay_ms(
        &mut self,
        ms: u32,
    ) {
        self.log.borrow_mut().push(HwEvent::Delay(ms));
    }
}

pub type TestController = DriveController<FakePin, FakePwm, FakeDelay>;

pub fn channel(
    side: Side,
    max: u16,
    log: &HwLog,
) -> MotorChannel<FakePin, FakePwm> {
    MotorChannel::new(FakePin::new(side, log), FakePwm::new(side, max, log))
}

/// Controller with both channels wired to recording doubles. The log is
/// cleared after the power-on init writes.
pub fn rig() -> (TestController, HwLog) {
    let log = HwLog::default();
    let config = DriveConfig::default();
    let train = DriveTrain::new(
        Some(channel(Side::Left, 1023, &log)),
        Some(channel(Side::Right, 1023, &log)),
        &config,
    );
    let ctrl = DriveController::new(train, FakeDelay::new(&log), &config);
    log.borrow_mut().clear();
    (ctrl, log)
}

/// Like `rig`, with a fault switch on each PWM output (left, right).
pub fn faulty_rig() -> (TestController, HwLog, PwmFault, PwmFault) {
    let log = HwLog::default();
    let (left_fault, right_fault) = (PwmFault::default(), PwmFault::default());
    let config = DriveConfig::default();
    let train = DriveTrain::new(
        Some(faulty_channel(Side::Left, &log, &left_fault)),
        Some(faulty_channel(Side::Right, &log, &right_fault)),
        &config,
    );
    let ctrl = DriveController::new(train, FakeDelay::new(&log), &config);
    log.borrow_mut().clear();
    (ctrl, log, left_fault, right_fault)
}

pub fn faulty_channel(
    side: Side,
    log: &HwLog,
    fault: &PwmFault,
) -> MotorChannel<FakePin, FakePwm> {
    MotorChannel::new(
        FakePin::new(side, log),
        FakePwm::new(side, 1023, log).with_fault(fault),
    )
}

/// Controller with no motor channels configured.
pub fn unwired_rig() -> (TestController, HwLog) {
    let log = HwLog::default();
    let config = DriveConfig::default();
    let ctrl = DriveController::new(
        DriveTrain::unconfigured(&config),
        FakeDelay::new(&log),
        &config,
    );
    (ctrl, log)
}

pub fn duties(
    log: &HwLog,
    side: Side,
) -> Vec<u16> {
    log.borrow()
        .iter()
        .filter_map(|e| match *e {
            HwEvent::Duty(s, d) if s == side => Some(d),
            _ => None,
        })
        .collect()
}

pub fn delays(log: &HwLog) -> Vec<u32> {
    log.borrow()
        .iter()
        .filter_map(|e| match *e {
            HwEvent::Delay(ms) => Some(ms),
            _ => None,
        })
        .collect()
}

/// `MessageChannel` that keeps everything it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub sent: Vec<(ClientId, String)>,
    pub broadcasts: Vec<String>,
}

impl MessageChannel for RecordingChannel {
    fn send_to(
        &mut self,
        client: ClientId,
        body: &str,
    ) {
        self.sent.push((client, body.to_string()));
    }

    fn broadcast(
        &mut self,
        body: &str,
    ) {
        self.broadcasts.push(body.to_string());
    }
}

impl RecordingChannel {
    /// Last reply sent to anyone, parsed.
    pub fn last_reply(&self) -> Value {
        let (_, body) = self.sent.last().expect("no reply sent");
        serde_json::from_str(body).expect("reply is valid JSON")
    }

    pub fn last_broadcast(&self) -> Value {
        let body = self.broadcasts.last().expect("no broadcast sent");
        serde_json::from_str(body).expect("broadcast is valid JSON")
    }
}

/// Send one text frame from `client` at `now_ms` and return the parsed reply.
pub fn send(
    ctrl: &mut TestController,
    out: &mut RecordingChannel,
    client: ClientId,
    now_ms: u64,
    frame: &str,
) -> Value {
    ctrl.on_message(client, frame.as_bytes(), now_ms, out);
    out.last_reply()
}

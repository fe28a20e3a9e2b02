//! Startup configuration for the drive controller.
//!
//! Pin numbers, PWM resolution/frequency and network defaults for the
//! supported boards. Everything here is fixed at startup except the output
//! scale, which can be changed at runtime through the drive train.

/// PWM resolution in bits (0..=1023).
pub const PWM_RES_BITS: u8 = 10;
/// PWM switching frequency in Hz.
pub const PWM_FREQ_HZ: u32 = 480;
/// Default duty-cycle ceiling applied to both directions.
pub const DEFAULT_OUTPUT_SCALE: f32 = 0.5;
/// WebSocket listening port.
pub const WS_PORT: u16 = 81;
/// Interval between unsolicited status broadcasts.
pub const HEARTBEAT_MS: u64 = 5000;

/// GPIO assignment for the two PH/EN motor drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    /// Left direction (phase) pin.
    pub left_phase: u8,
    /// Left PWM (enable) pin.
    pub left_enable: u8,
    /// Right direction (phase) pin.
    pub right_phase: u8,
    /// Right PWM (enable) pin.
    pub right_enable: u8,
}

impl PinMap {
    /// M5 Atom LITE (ESP32) default wiring.
    pub const ATOM_LITE: PinMap = PinMap {
        left_phase: 22,
        left_enable: 19,
        right_phase: 23,
        right_enable: 33,
    };

    /// M5 Atom S3 LITE, grove port GPIOs 5..=8.
    pub const ATOM_S3: PinMap = PinMap {
        left_phase: 5,
        left_enable: 6,
        right_phase: 7,
        right_enable: 8,
    };
}

impl Default for PinMap {
    fn default() -> Self {
        Self::ATOM_LITE
    }
}

/// Complete startup configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveConfig {
    pub pins: PinMap,
    pub pwm_resolution_bits: u8,
    pub pwm_frequency_hz: u32,
    pub output_scale: f32,
    pub port: u16,
    pub heartbeat_interval_ms: u64,
}

impl DriveConfig {
    /// Largest duty value for the configured resolution, `2^bits - 1`.
    ///
    /// Resolutions above 16 bits saturate at `u16::MAX`.
    pub fn max_duty(&self) -> u16 {
        match self.pwm_resolution_bits {
            0 => 0,
            bits if bits >= 16 => u16::MAX,
            bits => (1u16 << bits) - 1,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            pwm_resolution_bits: PWM_RES_BITS,
            pwm_frequency_hz: PWM_FREQ_HZ,
            output_scale: DEFAULT_OUTPUT_SCALE,
            port: WS_PORT,
            heartbeat_interval_ms: HEARTBEAT_MS,
        }
    }
}

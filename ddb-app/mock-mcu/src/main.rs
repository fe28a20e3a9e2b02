mod sim;

use clap::{Parser, ValueEnum};
use ddb_core::mk_static;
use ddb_core::utils::config::{
    DEFAULT_OUTPUT_SCALE, DriveConfig, PWM_FREQ_HZ, PWM_RES_BITS, PinMap, WS_PORT,
};
use ddb_core::utils::connection::channel::{MAX_CLIENTS, OUTBOUND};
use ddb_core::utils::controllers::{DriveController, DriveTrain, MotorChannel};
use ddb_core::utils::{SharedController, heartbeat, wss};
use embassy_executor::{Executor, Spawner};
use embassy_net::{Config, Ipv4Address, Ipv4Cidr, Runner, Stack, StackResources};
use embassy_net_tuntap::TunTapDevice;
use embassy_sync::mutex::Mutex;
use embassy_time::Delay;
use heapless::Vec;
use rand_core::{OsRng, TryRngCore};
use sim::{SimPin, SimPwm};
use static_cell::StaticCell;
use tracing::{error, info, warn};

type Controller = SharedController<SimPin, SimPwm, Delay>;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Board {
    AtomLite,
    AtomS3,
}

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// TAP device name
    #[clap(long, default_value = "tap0")]
    tap: String,
    /// use a static IP instead of DHCP
    #[clap(long)]
    static_ip: bool,
    /// pin layout to simulate
    #[clap(long, value_enum, default_value_t = Board::AtomLite)]
    board: Board,
    /// WebSocket port
    #[clap(long, default_value_t = WS_PORT)]
    port: u16,
    /// duty-cycle ceiling, 0.0..=1.0
    #[clap(long, default_value_t = DEFAULT_OUTPUT_SCALE)]
    output_scale: f32,
    /// PWM resolution in bits
    #[clap(long, default_value_t = PWM_RES_BITS)]
    pwm_bits: u8,
    /// PWM frequency in Hz
    #[clap(long, default_value_t = PWM_FREQ_HZ)]
    pwm_freq: u32,
}

impl Opts {
    fn drive_config(&self) -> DriveConfig {
        let pins = match self.board {
            Board::AtomLite => PinMap::ATOM_LITE,
            Board::AtomS3 => PinMap::ATOM_S3,
        };
        DriveConfig {
            pins,
            pwm_resolution_bits: self.pwm_bits,
            pwm_frequency_hz: self.pwm_freq,
            output_scale: self.output_scale,
            port: self.port,
            ..DriveConfig::default()
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, TunTapDevice>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn heartbeat_task(controller: &'static Controller) -> ! {
    heartbeat(controller, &OUTBOUND).await
}

#[embassy_executor::task(pool_size = 4)]
async fn web_task(
    id: usize,
    port: u16,
    stack: Stack<'static>,
    controller: &'static Controller,
) -> ! {
    wss(id, port, stack, None, controller, &OUTBOUND).await
}

#[embassy_executor::task]
async fn main_task(
    spawner: Spawner,
    opts: Opts,
) {
    let config = opts.drive_config();
    info!(?config, "drive configuration");

    // Motor drivers, logged to console
    let pins = config.pins;
    let max_duty = config.max_duty();
    let left = MotorChannel::new(
        SimPin::new("L_PHASE", pins.left_phase),
        SimPwm::new("L_EN", pins.left_enable, max_duty, config.pwm_frequency_hz),
    );
    let right = MotorChannel::new(
        SimPin::new("R_PHASE", pins.right_phase),
        SimPwm::new("R_EN", pins.right_enable, max_duty, config.pwm_frequency_hz),
    );
    let train = DriveTrain::new(Some(left), Some(right), &config);
    let controller = DriveController::new(train, Delay, &config);
    let controller: &'static Controller = mk_static!(Controller, Mutex::new(controller));

    spawner.spawn(heartbeat_task(controller)).unwrap();

    // Initialize network
    let device = match TunTapDevice::new(&opts.tap) {
        Ok(device) => device,
        Err(e) => {
            error!("failed to open TAP device {}: {}", opts.tap, e);
            return;
        }
    };
    let net_config = if opts.static_ip {
        Config::ipv4_static(embassy_net::StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 69, 2), 24),
            dns_servers: Vec::new(),
            gateway: Some(Ipv4Address::new(192, 168, 69, 1)),
        })
    } else {
        Config::dhcpv4(Default::default())
    };
    let mut seed_buf = [0; 8];
    if let Err(e) = OsRng.try_fill_bytes(&mut seed_buf) {
        warn!("no OS randomness ({}), using a fixed network seed", e);
    }
    let seed = u64::from_le_bytes(seed_buf);

    let (stack, runner) = embassy_net::new(
        device,
        net_config,
        mk_static!(StackResources<8>, StackResources::<8>::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).unwrap();

    info!("Waiting for network link...");
    stack.wait_config_up().await;
    if let Some(ip_cfg) = stack.config_v4() {
        info!("Network up: {}", ip_cfg.address);
    }

    info!("Starting drive server on port {}", config.port);
    for id in 0..MAX_CLIENTS {
        spawner.spawn(web_task(id, config.port, stack, controller)).unwrap();
    }
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts: Opts = Opts::parse();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts)).unwrap();
    });
}

use chargepoint::charger::connector::ConnectorPort;
use chargepoint::charger::sim::SimPort;
use chargepoint::charger::ChargePoint;
use chargepoint::error::Error;
use chargepoint::message::core::BootNotification;
use chargepoint::message::Message;
use chargepoint::platform::{frame_json, Platform};

use clap::Parser;
use log::info;
use rand::Rng;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Milliseconds between scheduling ticks.
    #[arg(long, default_value_t = 100)]
    step_interval_ms: u64,

    /// Number of physical connectors to simulate.
    #[arg(long, default_value_t = 1)]
    connectors: usize,

    /// Charge point model reported at boot.
    #[arg(long, env = "CP_MODEL", default_value = "SimCharger")]
    model: String,

    /// Charge point vendor reported at boot.
    #[arg(long, env = "CP_VENDOR", default_value = "OpenBench")]
    vendor: String,

    /// Serial number reported at boot.
    #[arg(long, env = "CP_SERIAL", default_value = "")]
    serial: String,

    /// Central System endpoint stored in the configuration for the
    /// transport layer to dial.
    #[arg(long, env = "CS_URL", default_value = "")]
    central_system_url: String,
}

/// Stand-in transport: frames go to the log, nothing ever arrives.
/// Correlation ids use the classic alphanumeric generator.
struct DemoPlatform;

const ID_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

impl Platform for DemoPlatform {
    fn send(&mut self, msg: &Message) -> Result<(), Error> {
        info!("tx {}", frame_json(msg));
        Ok(())
    }

    fn recv(&mut self) -> Result<Message, Error> {
        Err(Error::NoMessage)
    }

    fn generate_message_id(&mut self) -> String {
        let mut rng = rand::thread_rng();
        (0..16)
            .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
            .collect()
    }

    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("INFO"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();

    let mut ports: Vec<Box<dyn ConnectorPort>> = Vec::new();
    for _ in 0..args.connectors {
        let (port, _state) = SimPort::new();
        ports.push(Box::new(port));
    }

    let mut cp = ChargePoint::new(Box::new(DemoPlatform), ports);

    if !args.central_system_url.is_empty() {
        cp.ocpp()
            .config_mut()
            .set_str("CentralSystemURL", &args.central_system_url)?;
    }

    cp.ocpp().send_boot_notification(BootNotification {
        charge_point_model: args.model.clone(),
        charge_point_vendor: args.vendor.clone(),
        charge_point_serial_number: args.serial.clone(),
        ..Default::default()
    })?;

    info!(
        "{} {} up with {} connector(s), stepping every {}ms",
        args.vendor, args.model, args.connectors, args.step_interval_ms
    );

    loop {
        cp.step();
        thread::sleep(Duration::from_millis(args.step_interval_ms));
    }
}

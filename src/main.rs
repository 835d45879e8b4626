//! CLI entry point.
//!
//! Connects to the power supply, starts the polling session and logs
//! measurement and mode events until interrupted. This is operational
//! chrome around the library; anything graphical lives elsewhere.

use anyhow::Result;
use clap::Parser;
use psu_control::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "psu_control")]
#[command(about = "Rigol DP832 monitor and control daemon", long_about = None)]
struct Cli {
    /// Configuration profile under config/ (defaults to "default")
    #[arg(long)]
    config: Option<String>,

    /// Override the instrument address from the configuration file
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::new(cli.config.as_deref())?;
    if let Some(address) = cli.address {
        settings.instrument.address = address;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run(settings).await
}

#[cfg(feature = "instrument_serial")]
async fn run(settings: Settings) -> Result<()> {
    use psu_control::link::{self, serial::SerialLink};
    use psu_control::{Channel, PowerSupply, SupplyEvent};
    use tokio::sync::broadcast;
    use tracing::{info, warn};

    let instrument = &settings.instrument;
    info!(address = %instrument.address, "connecting");
    let link = link::connect_with_retry(
        || SerialLink::open(&instrument.address, instrument.baud_rate, instrument.read_timeout),
        instrument.connect_timeout,
        instrument.reconnect_delay,
    )
    .await?;

    let supply = PowerSupply::start(link, &settings).await?;
    let snapshot = supply.snapshot();
    let mut events = supply.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SupplyEvent::ValuesUpdated) => {
                    for channel in Channel::ALL {
                        let state = snapshot.channel(channel);
                        info!(
                            %channel,
                            voltage = state.measurement.voltage,
                            current = state.measurement.current,
                            power = state.measurement.power,
                            elapsed = snapshot.elapsed_seconds(),
                            "measurement"
                        );
                    }
                }
                Ok(SupplyEvent::ModeChanged(channel)) => {
                    info!(%channel, mode = %snapshot.mode(channel), "mode changed");
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    supply.shutdown().await;
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
async fn run(_settings: Settings) -> Result<()> {
    anyhow::bail!("Serial support not enabled. Rebuild with --features instrument_serial")
}

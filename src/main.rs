use anyhow::{Context, Result};
use solarmap::config::Config;
use solarmap::logging::{get_logger, init_logging};
use solarmap::modbus::ModbusClient;
use solarmap::registers::RegisterMap;
use solarmap::transport::Transport;
use solarmap::{InverterController, ReadSnapshot};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::load().context("loading configuration")?,
    };
    config.validate()?;
    init_logging(&config.logging)?;

    let logger = get_logger("main");
    logger.info(&format!(
        "solarmap {} starting for {} at {}:{}",
        env!("APP_VERSION"),
        config.inverter.model,
        config.modbus.ip,
        config.modbus.port
    ));

    let map = match &config.inverter.register_file {
        Some(path) => RegisterMap::from_file(path)
            .with_context(|| format!("loading register map {}", path.display()))?,
        None => RegisterMap::builtin()?,
    };

    let mut client = ModbusClient::new(&config.modbus);
    if let Err(e) = client.connect().await {
        logger.warn(&format!("Initial connection failed: {}", e));
    }
    let controller = InverterController::from_config(&config.inverter, &map, client)?;

    let mut ticker = interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                logger.info("Shutdown requested");
                break;
            }
        }

        {
            let transport = controller.transport();
            let mut transport = transport.lock().await;
            if transport.is_connected() == Some(false)
                && let Err(e) = transport.connect().await
            {
                logger.warn(&format!("Reconnect failed: {}", e));
                continue;
            }
        }

        let results = controller.read_all().await;
        let snapshot = ReadSnapshot::from_results(&results);
        if !snapshot.unavailable.is_empty() {
            logger.debug(&format!(
                "{} of {} values unavailable",
                snapshot.unavailable.len(),
                results.len()
            ));
        }
        println!("{}", serde_json::to_string(&snapshot)?);
    }

    logger.info("solarmap stopped");
    Ok(())
}

//! Draws an X and returns home, printing every coordinate update.
//!
//! ```text
//! cargo run --example draw_x                 # line-us.local
//! cargo run --example draw_x -- my-robot.local
//! cargo run --example draw_x -- mock         # in-process mock device
//! ```

use anyhow::Result;
use rs_lineus::config::{Config, DeviceConfig};
use rs_lineus::hal::MockDevice;
use rs_lineus::{Coordinate, LineUs, SessionEvent};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rs_lineus=info".into()),
        )
        .init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "line-us.local".into());
    let config = Config::default().with_device(DeviceConfig::default().with_host(&host));
    let bot = if host == "mock" {
        LineUs::spawn(MockDevice::new(), config.session.clone())
    } else {
        LineUs::from_config(&config)
    };

    let mut events = bot.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::Coordinates(p) = event {
                println!("current coordinates: x={} y={} z={}", p.x, p.y, p.z);
            }
        }
    });

    bot.connect().await?;

    let (a, b, c, d, e) = tokio::join!(
        bot.move_to(Coordinate::xy(0.0, 0.0)),
        bot.line_to(Coordinate::xy(500.0, 500.0)),
        bot.move_to(Coordinate::xy(500.0, 0.0)),
        bot.line_to(Coordinate::xy(0.0, 500.0)),
        bot.home(),
    );
    for result in [a, b, c, d, e] {
        result?;
    }

    println!("done!");
    bot.disconnect().await?;
    Ok(())
}

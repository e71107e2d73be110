//! Draws random zig-zags across the canvas, then goes home.
//!
//! ```text
//! cargo run --example random_vees -- [host|mock] [count]
//! ```

use anyhow::{Context, Result};
use rand::Rng;
use rs_lineus::config::{Config, DeviceConfig};
use rs_lineus::coordinates::{CANVAS_HEIGHT, CANVAS_WIDTH};
use rs_lineus::hal::MockDevice;
use rs_lineus::{Coordinate, LineUs};

fn random_point(rng: &mut impl Rng) -> Coordinate {
    Coordinate::xy(
        rng.gen_range(0.0..CANVAS_WIDTH),
        rng.gen_range(0.0..CANVAS_HEIGHT),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rs_lineus=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "line-us.local".into());
    let count: usize = match args.next() {
        Some(n) => n.parse().context("count must be a number")?,
        None => 10,
    };

    let config = Config::default().with_device(DeviceConfig::default().with_host(&host));
    let bot = if host == "mock" {
        LineUs::spawn(MockDevice::new(), config.session.clone())
    } else {
        LineUs::from_config(&config)
    };
    bot.connect().await?;

    let mut rng = rand::thread_rng();
    for i in 0..count {
        bot.move_to(random_point(&mut rng)).await?;
        bot.line_to(random_point(&mut rng)).await?;
        bot.line_to(random_point(&mut rng)).await?;
        tracing::info!(vee = i + 1, count, "vee drawn");
    }
    bot.home().await?;

    println!("done!");
    Ok(())
}

//! Interactive console.
//!
//! ```text
//! cargo run --example repl -- [host|mock]
//! ```
//!
//! Type `help` for the command list. Anything that is not a known
//! command is sent to the device verbatim, e.g. `G01 X900 Y300`.

use anyhow::{anyhow, bail, Result};
use rs_lineus::config::{Config, DeviceConfig};
use rs_lineus::hal::MockDevice;
use rs_lineus::{Command, Coordinate, LineUs, Reply, SessionEvent, SessionState};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "\
move X Y        travel to X,Y with the pen up
line X Y        draw a line to X,Y
to X Y [Z]      move without pen handling
up | down       lift or lower the pen
home            go home
pos | caps | diag
name NAME       rename the device
pause [lift]    pause, optionally lifting the pen
resume | stop | clear
state           print session state
quit            disconnect and exit
<anything else> sent as a raw command";

fn number(token: Option<&str>, what: &str) -> Result<f64> {
    let token = token.ok_or_else(|| anyhow!("missing {}", what))?;
    token
        .parse()
        .map_err(|_| anyhow!("{} must be a number, got {:?}", what, token))
}

fn print_reply(reply: &Reply) {
    match reply.position {
        Some(p) => println!("{} x={} y={} z={}", reply.tag, p.x, p.y, p.z),
        None => {
            let fields: Vec<String> = reply
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            println!("{} {}", reply.tag, fields.join(" "));
        }
    }
}

/// Runs one console line. Returns false to exit.
async fn run_line(bot: &LineUs, line: &str) -> Result<bool> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(true);
    };

    let reply = match word {
        "quit" | "exit" => return Ok(false),
        "help" => {
            println!("{}", HELP);
            return Ok(true);
        }
        "state" => {
            let snap = bot.snapshot();
            println!(
                "{} pen={} at={:?}",
                snap.state,
                snap.queued_pen.as_str(),
                snap.coordinates
            );
            return Ok(true);
        }
        "pause" => {
            bot.pause(words.next() == Some("lift")).await?;
            return Ok(true);
        }
        "resume" => {
            bot.resume().await?;
            return Ok(true);
        }
        "stop" | "clear" => {
            let n = if word == "stop" {
                bot.stop().await?
            } else {
                bot.clear().await?
            };
            println!("discarded {}", n);
            return Ok(true);
        }
        "move" | "line" => {
            let target = Coordinate::xy(number(words.next(), "x")?, number(words.next(), "y")?);
            if word == "move" {
                bot.move_to(target).await?
            } else {
                bot.line_to(target).await?
            }
        }
        "to" => {
            let mut target = Coordinate::xy(number(words.next(), "x")?, number(words.next(), "y")?);
            if let Some(z) = words.next() {
                target = target.with_z(number(Some(z), "z")?);
            }
            bot.to(target).await?
        }
        "up" => bot.pen_up().await?,
        "down" => bot.pen_down().await?,
        "home" => bot.home().await?,
        "pos" => bot.get_position().await?,
        "caps" => bot.get_capabilities().await?,
        "diag" => bot.get_diagnostics().await?,
        "name" => {
            let name: Vec<&str> = words.collect();
            if name.is_empty() {
                bail!("missing name");
            }
            bot.set_name(&name.join(" ")).await?
        }
        _ => {
            let cmd: Command = line.parse()?;
            bot.send(cmd).await?
        }
    };

    print_reply(&reply);
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rs_lineus=warn".into()),
        )
        .init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "line-us.local".into());
    let config = Config::default().with_device(DeviceConfig::default().with_host(&host));
    let bot = if host == "mock" {
        LineUs::spawn(MockDevice::new(), config.session.clone())
    } else {
        LineUs::from_config(&config)
    };

    println!("Line-us REPL");
    print!("Connecting... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    bot.connect().await?;
    println!("done");

    let mut events = bot.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::State(SessionState::Disconnected) => {
                    println!("\nConnection closed");
                    std::process::exit(0);
                }
                SessionEvent::Error(message) => println!("\nerror: {}", message),
                _ => {}
            }
        }
    });

    let prompt = format!("{}> ", host);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        // Ctrl-D exits too
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match run_line(&bot, line.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("Error: {}", e),
        }
    }

    bot.disconnect().await?;
    Ok(())
}

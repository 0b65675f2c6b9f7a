//! Robot Serial Console
//!
//! Forwards typed keys to the robot and prints what it sends back.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use robot_serial::backend::{SerialSession, SystemPortDriver};
use robot_serial::config::AppConfig;
use robot_serial::console::{Console, ConsoleStep, HELP_TEXT};
use robot_serial::logging;
use robot_serial::oplog::OperationLog;

/// How long the main loop waits for a key before polling the port
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "robot-console")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send robot arm commands over a serial port", long_about = None)]
struct Cli {
    /// Serial port (lists available ports when omitted)
    port: Option<String>,

    /// Baud rate (defaults to the configured rate)
    baud: Option<u32>,

    /// Connect to the preferred or first available port
    #[arg(short, long)]
    auto: bool,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref());
    let _log_guard = logging::init(&config.logging);

    let baud_rate = cli.baud.unwrap_or(config.serial.baud_rate);
    let mut session = SerialSession::new(Box::new(SystemPortDriver), config.serial.clone())
        .with_operation_log(OperationLog::from_config(&config.operation_log));

    let connection = match (cli.port.as_deref(), cli.auto) {
        (Some(port), _) => session
            .connect(port, baud_rate)
            .with_context(|| format!("Could not connect to {}", port))?,
        (None, true) => session
            .connect_auto(baud_rate)
            .context("Could not auto-connect")?,
        (None, false) => {
            let ports = session.list_ports().context("Could not list serial ports")?;
            if ports.is_empty() {
                println!("No serial ports found");
            } else {
                println!("Available ports:");
                for port in ports {
                    println!("  {}", port);
                }
            }
            return Ok(());
        }
    };
    println!("Connected to {} @ {} baud", connection.port, connection.baud_rate);
    println!("{}", HELP_TEXT);

    let mut console = Console::new(
        session.into_shared(),
        config.recording.default_path.clone(),
        config.recording.loop_playback,
    );

    // Stdin is read on its own thread so the port keeps being polled
    let (key_tx, key_rx) = bounded::<char>(256);
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let mut buf = [0u8; 64];
            let mut stdin = std::io::stdin().lock();
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for ch in String::from_utf8_lossy(&buf[..n]).chars() {
                            if key_tx.send(ch).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        })
        .context("Could not start input thread")?;

    let mut stdout = std::io::stdout();
    let result = loop {
        match key_rx.recv_timeout(KEY_POLL_INTERVAL) {
            Ok(ch) => match console.handle_char(ch) {
                ConsoleStep::Quiet => {}
                ConsoleStep::Line(line) => println!("{}", line),
                ConsoleStep::Quit => break Ok(()),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break Ok(()),
        }

        match console.read_incoming() {
            Ok(Some(text)) => {
                print!("{}", text);
                let _ = stdout.flush();
            }
            Ok(None) => {}
            Err(e) => break Err(e).context("Connection lost"),
        }

        for line in console.playback_updates() {
            println!("{}", line);
        }

        if !console.is_connected() {
            break Err(anyhow::anyhow!("Connection lost"));
        }
    };

    console.shutdown();
    if result.is_ok() {
        println!("Bye");
    }
    result
}

//! Robot Serial - Main Entry Point
//!
//! Desktop window for driving the robot arm over a serial port, with
//! command recording and playback.

use robot_serial::{backend::SerialBackend, config::AppConfig, frontend::RobotControlApp, logging};
use std::sync::atomic::Ordering;

fn main() -> eframe::Result<()> {
    let config = AppConfig::load_or_default(None);
    let _log_guard = logging::init(&config.logging);

    tracing::info!("Starting Robot Serial");

    // Create the serial backend and spawn its worker thread
    let (backend, frontend) = SerialBackend::new(config.clone());
    let running = backend.stop_handle();
    let backend_handle = std::thread::Builder::new()
        .name("serial-backend".to_string())
        .spawn(move || backend.run());
    let backend_handle = match backend_handle {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!("Failed to start backend thread: {}", e);
            None
        }
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 640.0])
            .with_min_inner_size([720.0, 480.0])
            .with_title("Robot Serial"),
        ..Default::default()
    };

    let result = eframe::run_native(
        "Robot Serial",
        native_options,
        Box::new(|cc| Ok(Box::new(RobotControlApp::new(cc, frontend, config)))),
    );

    // Signal backend to stop and wait for it
    tracing::info!("Shutting down...");
    running.store(false, Ordering::SeqCst);
    if let Some(handle) = backend_handle {
        if handle.join().is_err() {
            tracing::error!("Backend thread panicked");
        }
    }

    result
}

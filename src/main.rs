//! Lens daemon
//!
//! Wires the window manager to real (or replayed) input devices and logs the
//! notifications it produces.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use lens::config::Config;
use lens::events::{ChannelSink, Notification};
use lens::input::{discovery, test_input, EventLoop, InputSettings};
use lens::shared::Bounds;
use lens::wm::{BoundsUpdate, CreationFlags, WindowManager};

/// Command line switches
struct Args {
    /// Print notifications as JSON lines on stdout
    json: bool,
    /// Create a fullscreen window so input has a target
    window: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = Self { json: false, window: false };
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--json" | "-j" => args.json = true,
                "--window" | "-w" => args.window = true,
                other => warn!("Ignoring unknown argument {}", other),
            }
        }
        args
    }
}

/// Visible, screen-sized window with a view attached.
fn create_root_window(wm: &WindowManager) -> lens::Result<()> {
    let (width, height) = wm.screen_size();
    let window = wm.create_window(None, CreationFlags::empty())?;
    let view = wm.create_view()?;
    wm.attach_view(window, view)?;
    wm.set_bounds(window, Bounds::new(0, 0, width, height), BoundsUpdate::POSITION | BoundsUpdate::SIZE)?;
    wm.set_visible(window, true)?;
    info!("Created window {} ({}x{})", window, width, height);
    Ok(())
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Notification>, json: bool) {
    while let Some(notification) = rx.recv().await {
        if json {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to serialize notification: {}", e),
            }
        } else {
            info!("{:?}", notification);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; the config filter applies once the config is loaded
    let (filter, filter_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    if std::env::var_os("RUST_LOG").is_none() {
        match EnvFilter::try_new(&config.logging.filter) {
            Ok(configured) => {
                if let Err(e) = filter_handle.reload(configured) {
                    warn!("Failed to apply log filter: {}", e);
                }
            }
            Err(e) => warn!("Invalid log filter {:?}: {}", config.logging.filter, e),
        }
    }

    info!("Starting Lens");
    let args = Args::parse();

    let platform = lens::platform::create(&config.screen).context("Failed to create platform")?;
    let (sink, rx) = ChannelSink::new();
    let wm = Arc::new(
        WindowManager::initialize(platform, Arc::new(sink)).context("Failed to initialize window manager")?,
    );
    let dispatcher = tokio::spawn(dispatch(rx, args.json));

    if args.window {
        create_root_window(&wm).context("Failed to create window")?;
    }

    let event_loop = EventLoop::new(wm.clone(), InputSettings::from(&config.input))
        .context("Failed to initialize input loop")?;
    let registrar = event_loop.registrar();
    let input = event_loop.handle();

    match &config.input.test_input {
        Some(path) => {
            test_input::spawn_monitor(path, registrar.clone()).context("Failed to start test input monitor")?;
        }
        None => {
            for device in discovery::discover(Path::new(discovery::INPUT_DIR), config.input.grab_devices)? {
                if let Err(e) = registrar.attach(device) {
                    warn!("Failed to add input device: {}", e);
                }
            }
            info!("{} input devices open", registrar.device_count());
        }
    }

    let mut input_task = tokio::task::spawn_blocking(move || event_loop.run());

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                }
            }
            let _ = tx.send(()).await;
        });
    }

    tokio::select! {
        result = &mut input_task => {
            match result {
                Ok(Ok(())) => info!("Input loop finished"),
                Ok(Err(e)) => error!("Input loop failed: {:#}", e),
                Err(e) => error!("Input task panicked: {}", e),
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received, cleaning up...");
            input.shutdown();
            match input_task.await {
                Ok(Err(e)) => error!("Input loop failed: {:#}", e),
                Err(e) => error!("Input task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    wm.shutdown();
    // Test input monitors may still hold the sink; give the queue a moment to drain
    if tokio::time::timeout(Duration::from_millis(100), dispatcher).await.is_err() {
        warn!("Notification queue still open at exit");
    }
    info!("Lens stopped");
    Ok(())
}

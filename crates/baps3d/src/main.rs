//! baps3d daemon: hub, TCP server and console wired together.

use anyhow::Result;
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use baps3d::transport::console;
use baps3d::{BAPS3D_VERSION, Hub, List, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "baps3d")]
#[command(version = BAPS3D_VERSION)]
#[command(about = "Playout list daemon speaking the Bifrost protocol")]
struct Cli {
    /// Host to listen on for Bifrost clients
    #[arg(long, default_value_t = ServerConfig::default().host)]
    host: String,

    /// Port to listen on for Bifrost clients
    #[arg(long, default_value_t = ServerConfig::default().port)]
    port: u16,

    /// Don't run a Bifrost console on stdin/stdout
    #[arg(long)]
    no_console: bool,
}

/// Log filtering: `RUST_LOG` wins, otherwise `BAPS3D_LOG` picks the level
/// (default info). `LOG_FORMAT=json` switches to JSON lines. Logs go to stderr
/// so they never mix with console output.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("BAPS3D_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("baps3d={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(cli));

    // A pending stdin read holds a blocking thread that a normal drop would wait on.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
    };
    let server = Server::bind(&config).await?;
    let cancel = CancellationToken::new();

    let (mut hub, mut root) = Hub::new(List::new());
    let server_task = tokio::spawn(server.run(hub.attach(), cancel.clone()));
    let mut console_task: Option<JoinHandle<()>> = if cli.no_console {
        None
    } else {
        Some(tokio::spawn(console::run(hub.attach(), cancel.clone())))
    };
    let hub_task = tokio::spawn(hub.run());

    tracing::info!(version = BAPS3D_VERSION, "baps3d started");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => tracing::info!("Interrupted, shutting down"),
                    Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
                }
                break;
            }

            joined = async {
                match console_task.as_mut() {
                    Some(task) => task.await,
                    None => std::future::pending().await,
                }
            } => {
                console_task = None;
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Console task failed");
                }
                tracing::info!("Console closed, shutting down");
                break;
            }

            // The root client only listens; drain it so the hub never blocks.
            response = root.recv() => {
                if response.is_none() {
                    tracing::warn!("Hub stopped unexpectedly");
                    break;
                }
            }
        }
    }

    cancel.cancel();
    drop(root);

    if let Some(task) = console_task
        && let Err(e) = task.await
    {
        tracing::error!(error = %e, "Console task failed");
    }
    server_task.await?;
    hub_task.await?;

    tracing::info!("It's now safe to turn off your baps3d.");
    Ok(())
}

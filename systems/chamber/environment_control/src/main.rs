//! Chamber environment control binary
use anyhow::{anyhow, Context};
use aviary::{
    components::prelude::*,
    devices::{
        hardware::controller::SerialController,
        software::{slack::SlackNotifier, solar::Observer},
    },
    utils::time::SystemClock,
};
use clap::Parser;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the Environment Component.
    #[arg(short, long)]
    filepath: String,
}

/// Wait for either the shutdown signal or the end of the control loop. Before
/// a shutdown the loop only ends by panicking, which drops `done`.
///
/// * `shutdown`: resolves once a shutdown was requested.
/// * `done`: fired by the control thread when its loop returned.
/// * `stop`: stop flag of the control loop.
async fn supervise<F>(
    shutdown: F,
    done: oneshot::Receiver<()>,
    stop: &AtomicBool,
) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        signal = shutdown => {
            signal.context("Failed waiting for the shutdown signal")?;
            info!("Shutdown requested, finishing the current minute");
            stop.store(true, Ordering::Relaxed);
            Ok(())
        }
        _ = done => {
            error!("The control loop stopped without a shutdown request");
            Err(anyhow!("The control loop stopped unexpectedly"))
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let config = EnvironmentConfig::from_file(&args.filepath)
        .with_context(|| format!("Failed to load config {}", args.filepath))?;
    let device = SerialController::open(&config.device).context("No microcontroller found")?;
    info!("Connected to the microcontroller on {}", device.path());
    let notifier = SlackNotifier::new(config.notification.clone())
        .context("Notification channel is not configured")?;
    let observer = Observer::new(config.location);
    let mut environment = Environment::new(config, device, notifier, observer, &SystemClock)?;

    let stop = Arc::new(AtomicBool::new(false));
    let loop_stop = stop.clone();
    let (done_tx, done_rx) = oneshot::channel();
    // The blocking http client cannot live inside the runtime, the loop
    // gets its own thread and the runtime only waits for the signal.
    let control = thread::Builder::new()
        .name(String::from("environment_control"))
        .spawn(move || {
            EnvironmentController::run(&mut environment, &SystemClock, &loop_stop);
            let _ = done_tx.send(());
        })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let supervised = runtime.block_on(supervise(tokio::signal::ctrl_c(), done_rx, &stop));
    stop.store(true, Ordering::Relaxed);

    control
        .join()
        .map_err(|_| anyhow!("The control loop panicked"))?;
    supervised
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{pending, ready};

    #[tokio::test]
    async fn test_loop_ending_on_its_own_is_an_error() {
        let stop = AtomicBool::new(false);
        let (done_tx, done_rx) = oneshot::channel();
        done_tx.send(()).unwrap();
        let result = supervise(pending(), done_rx, &stop).await;
        assert!(result.is_err());
        assert!(!stop.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_panicked_loop_is_an_error() {
        let stop = AtomicBool::new(false);
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let panicked = thread::spawn(move || {
            let _done_tx = done_tx;
            panic!("serial port vanished");
        });
        assert!(panicked.join().is_err());
        let result = supervise(pending(), done_rx, &stop).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_sets_stop_flag() {
        let stop = AtomicBool::new(false);
        let (_done_tx, done_rx) = oneshot::channel();
        let result = supervise(ready(Ok(())), done_rx, &stop).await;
        assert!(result.is_ok());
        assert!(stop.load(Ordering::Relaxed));
    }
}

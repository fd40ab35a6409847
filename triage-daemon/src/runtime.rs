use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

use triage_core::Config;
use triage_sort::Triage;

use crate::error::{io_err, DaemonError};
use crate::paths::{logs_dir, DEBOUNCE_WINDOW};

/// Extra wait after the quiescence window before a nudged cycle runs.
const NUDGE_SLACK: Duration = Duration::from_secs(1);

const ROTATION_INTERVAL: Duration = Duration::from_secs(30);

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: Config) -> Result<(), DaemonError> {
    init_tracing("info");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon until ctrl-c. The in-flight cycle always completes first.
pub async fn run(home: PathBuf, config: Config) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let triage = Arc::new(Triage::from_config(&config, &home)?);
    let staging = triage.staging_dir().to_path_buf();
    tracing::info!(
        staging = %staging.display(),
        interval_secs = config.interval_secs,
        rules = triage.table().rules().len(),
        "triage daemon started",
    );

    let (nudge_tx, nudge_rx) = mpsc::channel::<()>(1);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let cycle_handle = {
        let shutdown = shutdown_tx.clone();
        let interval = config.interval();
        let quiescence = config.quiescence();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = cycle_task(triage, interval, quiescence, nudge_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let watch = config.watch;
        tokio::spawn(async move {
            let result = if watch {
                watcher_task(staging, nudge_tx, shutdown_rx).await
            } else {
                idle_until_shutdown(shutdown_rx).await
            };
            if result.is_err() {
                let _ = shutdown.send(());
            }
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move { log_rotation_task(home, shutdown_rx).await })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, finishing current cycle");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Signal(err.to_string())),
                    }
                }
            }
        })
    };

    let (cycle_result, watcher_result, rotation_result, signal_result) = tokio::join!(
        cycle_handle,
        watcher_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("cycle", cycle_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("triage daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Cycle scheduling
// ---------------------------------------------------------------------------

/// Run a cycle on every interval tick, and once more after a nudge once the
/// nudged file has had time to settle.
///
/// Shutdown is only observed between cycles.
async fn cycle_task(
    triage: Arc<Triage>,
    interval: Duration,
    quiescence: Duration,
    mut nudge_rx: mpsc::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: Option<Instant> = None;

    loop {
        let trigger = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => "interval",
            _ = sleep_until_opt(pending) => "nudge",
            Some(()) = nudge_rx.recv() => {
                let at = schedule_nudge(&mut pending, Instant::now(), quiescence);
                tracing::debug!(in_ms = at.saturating_duration_since(Instant::now()).as_millis() as u64, "cycle nudged");
                continue;
            }
        };
        pending = None;
        run_cycle(triage.clone(), trigger).await;
    }

    Ok(())
}

async fn run_cycle(triage: Arc<Triage>, trigger: &'static str) {
    let result = tokio::task::spawn_blocking(move || triage.run_cycle(false)).await;
    match result {
        Ok(Ok(report)) => {
            tracing::debug!(trigger, duration_ms = report.duration_ms, "cycle finished");
        }
        Ok(Err(err)) => tracing::error!(trigger, error = %err, "cycle failed"),
        Err(err) => tracing::error!(trigger, error = %err, "cycle task join failure"),
    }
}

/// Earliest pending nudge wins; later nudges never postpone it.
fn schedule_nudge(pending: &mut Option<Instant>, now: Instant, quiescence: Duration) -> Instant {
    *pending.get_or_insert(now + quiescence + NUDGE_SLACK)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

async fn watcher_task(
    staging: PathBuf,
    nudge_tx: mpsc::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // FSEvents reports real paths (e.g. /private/var/... on macOS).
    let staging = fs::canonicalize(&staging).unwrap_or(staging);

    // Keep the watcher alive for as long as events are read.
    let (_watcher, mut event_rx) = match watch_staging(&staging) {
        Ok(watch) => watch,
        Err(err) => {
            tracing::warn!(
                path = %staging.display(),
                error = %err,
                "cannot watch staging directory, relying on the interval tick",
            );
            return idle_until_shutdown(shutdown_rx).await;
        }
    };
    tracing::debug!(path = %staging.display(), "watching staging directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    if !is_staged_entry(&path, &staging) {
                        continue;
                    }
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }
                    tracing::debug!(path = %path.display(), "staging change detected");
                    // A full channel already holds a nudge.
                    let _ = nudge_tx.try_send(());
                }
            }
        }
    }

    Ok(())
}

type EventReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

fn watch_staging(staging: &Path) -> notify::Result<(RecommendedWatcher, EventReceiver)> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut watcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(staging, RecursiveMode::NonRecursive)?;
    Ok((watcher, event_rx))
}

async fn idle_until_shutdown(mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), DaemonError> {
    let _ = shutdown_rx.recv().await;
    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// A direct, non-hidden child of the staging directory.
fn is_staged_entry(path: &Path, staging: &Path) -> bool {
    path.parent() == Some(staging)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| !name.starts_with('.'))
            .unwrap_or(false)
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Housekeeping
// ---------------------------------------------------------------------------

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok();
            }
        }
    }
    Ok(())
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let logs = logs_dir(home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    Ok(())
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            message: err.to_string(),
        }),
    }
}

/// Install the fmt subscriber. `RUST_LOG` overrides `default_level`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

//! # Station Runner
//!
//! Wires the components together and owns every long-running task.
//!
//! Startup binds the listener and the registration socket and, when enabled,
//! opens the capture device. Any failure there aborts before a task is
//! spawned. After startup the station runs until the cancellation token fires
//! or a task fails fatally, which cancels the rest.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::StationConfig;
use crate::detector::{forward_frames, report_stats, CaptureSource, Detector};
use crate::error::{Result, StationError};
use crate::protocol::{ConnectionDispatcher, LivenessProbe, RegistrationIngest};
use crate::registration::{RegistrationLookup, RegistrationManager};
use crate::transport::RegistrationSubscriber;
use crate::utils::metrics::StationMetrics;

/// Remove expired registrations every `interval` until cancelled.
pub async fn sweep_expired(manager: Arc<RegistrationManager>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = manager.expire(Instant::now());
                let stats = manager.stats();
                debug!(
                    removed,
                    entries = stats.entries,
                    max_entries = stats.max_entries,
                    admitted_total = stats.admitted_total,
                    "Expiry sweep finished"
                );
            }
        }
    }
}

/// Run the station until `cancel` fires.
///
/// # Errors
/// Configuration, bind and capture-open errors are returned before anything
/// starts. A task that fails later cancels the others and its error is
/// returned once they have stopped.
pub async fn run(config: StationConfig, cancel: CancellationToken) -> Result<()> {
    config.validate_strict()?;

    let metrics = Arc::new(StationMetrics::new());
    let manager = Arc::new(RegistrationManager::from_config(&config.registrations));
    let lookup: Arc<dyn RegistrationLookup> = manager.clone();

    let listener = ConnectionDispatcher::bind(&config.dispatcher.listen_address).await?;
    let subscriber = RegistrationSubscriber::bind(&config.ingest.endpoint).await?;
    let capture = if config.detector.enabled {
        Some(CaptureSource::open(&config.detector)?)
    } else {
        None
    };

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    let messages = subscriber.into_stream(config.ingest.channel_capacity, cancel.clone());
    let ingest = RegistrationIngest::new(Arc::clone(&manager), Arc::clone(&metrics))
        .with_probe(LivenessProbe::from_config(&config.liveness));
    let token = cancel.clone();
    tasks.spawn(async move {
        ingest.run(messages, token).await;
        Ok(())
    });

    let dispatcher = Arc::new(
        ConnectionDispatcher::new(Arc::clone(&lookup), Arc::clone(&metrics))
            .with_config(&config.dispatcher),
    );
    tasks.spawn(dispatcher.serve(listener, cancel.clone()));

    let sweep = sweep_expired(
        Arc::clone(&manager),
        config.registrations.sweep_interval,
        cancel.clone(),
    );
    tasks.spawn(async move {
        sweep.await;
        Ok(())
    });

    let reporter_metrics = Arc::clone(&metrics);
    let metrics_interval = config.logging.metrics_interval;
    let token = cancel.clone();
    tasks.spawn(async move {
        reporter_metrics.report_every(metrics_interval, token).await;
        Ok(())
    });

    if let Some(capture) = capture {
        let (tx, rx) = mpsc::channel(config.detector.forward_capacity);
        let detector = Arc::new(Detector::new(
            Arc::clone(&lookup),
            &config.detector.tags,
            tx,
            Arc::clone(&metrics),
        ));

        let forward = forward_frames(rx, cancel.clone());
        tasks.spawn(async move {
            forward.await;
            Ok(())
        });

        let stats = report_stats(detector.stats(), config.detector.stats_interval, cancel.clone());
        tasks.spawn(async move {
            stats.await;
            Ok(())
        });

        let token = cancel.clone();
        tasks.spawn(async move {
            tokio::task::spawn_blocking(move || capture.run(detector, token))
                .await
                .map_err(|e| StationError::Capture(format!("capture thread failed: {e}")))?
        });
    }

    info!(
        listen = %config.dispatcher.listen_address,
        ingest = %config.ingest.endpoint,
        detector = config.detector.enabled,
        "Station running"
    );

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(|e| StationError::Io(std::io::Error::other(e)));
        if let Err(e) = result.and_then(|r| r) {
            error!(error = %e, "Station task failed, shutting down");
            cancel.cancel();
            first_error.get_or_insert(e);
        }
    }

    metrics.log_metrics();
    info!("Station stopped");
    first_error.map_or(Ok(()), Err)
}

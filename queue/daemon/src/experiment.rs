//! Experiment scheduling
//!
//! Runs the synthetic workload alongside the kernel monitors:
//!
//! - a receive task bound to the target address, reporting latencies
//! - a send task pacing datagrams at the receiver
//! - a sampling task firing both monitors once per interval
//!
//! Monitors read procfs with blocking calls, so each tick runs them on the
//! blocking pool rather than on a runtime worker.
//!
//! On completion every task is signalled to stop and given a grace period;
//! tasks still running afterwards are aborted and the timeout is reported.

use crate::{
    buffer_depth::KernelBufferDepthMonitor,
    collector::SampleCollector,
    config::ExperimentConfig,
    report::KernelMonitor,
    softnet::SoftIrqTimeSqueezeMonitor,
    types::{ExperimentReport, TickStats},
    workload::{receive_loop, send_loop, MessageCodec, SendDelay},
};
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::{
    future::{self, Future},
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};
use tokio::{
    net::UdpSocket,
    signal,
    sync::watch,
    task::{self, AbortHandle},
    time::{interval_at, sleep, timeout, Instant, MissedTickBehavior},
};

/// How the workers ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every task exited within the grace period
    Clean,
    /// The grace period elapsed and `aborted` tasks were cancelled
    TimedOut { aborted: usize },
}

/// Result of a finished experiment
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    pub report: ExperimentReport,
    pub shutdown: ShutdownOutcome,
}

/// One run of the workload with kernel sampling
pub struct Experiment<D> {
    config: ExperimentConfig,
    delay: D,
    collector: SampleCollector,
}

impl<D: SendDelay + 'static> Experiment<D> {
    pub fn new(config: ExperimentConfig, delay: D) -> Self {
        Self {
            config,
            delay,
            collector: SampleCollector::new(),
        }
    }

    /// Run until the configured duration elapses or Ctrl-C
    pub async fn execute(self) -> Result<ExperimentOutcome> {
        let Self {
            config,
            delay,
            collector,
        } = self;
        let start = Instant::now();

        let receiver = UdpSocket::bind(config.address)
            .await
            .with_context(|| format!("Failed to bind receiver to {}", config.address))?;
        let target = receiver.local_addr().context("Failed to read receiver address")?;
        let sender = UdpSocket::bind(unspecified_for(&target))
            .await
            .context("Failed to bind sender")?;
        sender
            .connect(target)
            .await
            .with_context(|| format!("Failed to connect sender to {}", target))?;
        info!("Workload running against {}", target);

        let monitors: Vec<Box<dyn KernelMonitor + Send>> = vec![
            Box::new(
                KernelBufferDepthMonitor::new(&config.proc_root, config.udp_table, collector.clone())
                    .with_target(target),
            ),
            Box::new(SoftIrqTimeSqueezeMonitor::new(
                &config.proc_root,
                config.softnet,
                collector.clone(),
            )),
        ];

        let codec = MessageCodec::new(start, config.message_size);
        let (stop, shutdown) = watch::channel(false);

        let mut receive = tokio::spawn(receive_loop(receiver, codec, collector.clone(), shutdown.clone()));
        let mut send = tokio::spawn(send_loop(sender, codec, delay, shutdown.clone()));
        let mut sampling = tokio::spawn(sample_loop(monitors, config.sample_interval(), shutdown));

        match wait_for_stop(config.duration(), signal::ctrl_c()).await {
            StopReason::Elapsed => info!("Duration reached, shutting down..."),
            StopReason::Interrupted => info!("Interrupted, shutting down..."),
            StopReason::SignalUnavailable => warn!("No duration set and Ctrl-C unavailable, shutting down..."),
        }

        let _ = stop.send(true);
        let aborts = [receive.abort_handle(), send.abort_handle(), sampling.abort_handle()];
        let workers = async { tokio::join!(&mut receive, &mut send, &mut sampling) };
        let (joined, shutdown) = await_workers(config.shutdown_grace(), workers, &aborts).await;

        let mut report = collector.generate_report(start.elapsed().as_secs());
        if let Some((received, sent, ticks)) = joined {
            let received = received.context("Receive task failed")?;
            let sent = sent.context("Send task failed")?;
            report.workload = received.merge(sent);
            report.ticks = ticks.context("Sampling task failed")?;
        }

        Ok(ExperimentOutcome { report, shutdown })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Elapsed,
    Interrupted,
    SignalUnavailable,
}

/// Wait for the run duration or `interrupt`, whichever comes first
///
/// If the interrupt cannot be listened for, the run continues to its
/// duration; with no duration there is nothing left to wait on.
async fn wait_for_stop<F>(duration: Option<Duration>, interrupt: F) -> StopReason
where
    F: Future<Output = io::Result<()>>,
{
    let elapsed = async move {
        match duration {
            Some(duration) => sleep(duration).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(elapsed);

    tokio::select! {
        _ = &mut elapsed => StopReason::Elapsed,
        result = interrupt => match result {
            Ok(()) => StopReason::Interrupted,
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                if duration.is_none() {
                    return StopReason::SignalUnavailable;
                }
                (&mut elapsed).await;
                StopReason::Elapsed
            }
        },
    }
}

/// Fire every monitor once per `period` until shutdown
///
/// A tick in progress is not interrupted by shutdown.
pub async fn sample_loop(
    mut monitors: Vec<Box<dyn KernelMonitor + Send>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> TickStats {
    let mut stats = TickStats::default();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        stats.ticks += 1;
        let tick = task::spawn_blocking(move || {
            let failed = sample_monitors(&mut monitors);
            (monitors, failed)
        });
        match tick.await {
            Ok((returned, failed)) => {
                monitors = returned;
                stats.failed_samples += failed;
            }
            Err(e) => {
                error!("Sampling tick did not complete: {}", e);
                break;
            }
        }
    }

    info!("Sampling stopped after {} ticks", stats.ticks);
    stats
}

fn sample_monitors(monitors: &mut [Box<dyn KernelMonitor + Send>]) -> u64 {
    let mut failed = 0;
    for monitor in monitors.iter_mut() {
        if let Err(e) = monitor.report() {
            failed += 1;
            warn!("{} sample failed: {:#}", monitor.name(), e);
        }
    }
    failed
}

/// Wait up to `grace` for `workers`, aborting every task on timeout
async fn await_workers<F: Future>(
    grace: Duration,
    workers: F,
    aborts: &[AbortHandle],
) -> (Option<F::Output>, ShutdownOutcome) {
    match timeout(grace, workers).await {
        Ok(output) => (Some(output), ShutdownOutcome::Clean),
        Err(_) => {
            let aborted = aborts.iter().filter(|task| !task.is_finished()).count();
            for task in aborts {
                task.abort();
            }
            error!(
                "Failed to shut down workers within {:?}, {} task(s) did not exit",
                grace, aborted
            );
            (None, ShutdownOutcome::TimedOut { aborted })
        }
    }
}

fn unspecified_for(target: &SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

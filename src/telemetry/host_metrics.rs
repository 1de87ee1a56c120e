//! Host and runtime metric collectors.
//!
//! Samples process memory/CPU, system memory, Tokio worker and task counts,
//! and process uptime on a fixed tick, recording them as gauges.

use std::time::Duration;

use opentelemetry::metrics::{Gauge, Meter};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::lifecycle::shutdown::BoxError;

struct Instruments {
    process_memory: Gauge<u64>,
    process_cpu: Gauge<f64>,
    system_memory_used: Gauge<u64>,
    runtime_workers: Gauge<u64>,
    runtime_alive_tasks: Gauge<u64>,
    uptime: Gauge<f64>,
}

impl Instruments {
    fn new(meter: &Meter) -> Self {
        Self {
            process_memory: meter
                .u64_gauge("process.memory.usage")
                .with_description("Resident memory of this process")
                .with_unit("By")
                .build(),
            process_cpu: meter
                .f64_gauge("process.cpu.utilization")
                .with_description("CPU usage of this process, percent of one core")
                .with_unit("%")
                .build(),
            system_memory_used: meter
                .u64_gauge("system.memory.usage")
                .with_description("Memory in use across the host")
                .with_unit("By")
                .build(),
            runtime_workers: meter
                .u64_gauge("runtime.tokio.workers")
                .with_description("Tokio worker threads")
                .build(),
            runtime_alive_tasks: meter
                .u64_gauge("runtime.tokio.alive_tasks")
                .with_description("Tokio tasks currently alive")
                .build(),
            uptime: meter
                .f64_gauge("process.uptime")
                .with_description("Seconds since the collector started")
                .with_unit("s")
                .build(),
        }
    }
}

/// Running collector; stop it with [`HostMetrics::stop`].
pub struct HostMetrics {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HostMetrics {
    /// Spawn the sampling loop. Must be called inside a Tokio runtime.
    pub fn start(meter: &Meter, interval: Duration) -> Result<Self, BoxError> {
        let pid = sysinfo::get_current_pid().map_err(BoxError::from)?;
        let runtime = tokio::runtime::Handle::try_current()?;
        let instruments = Instruments::new(meter);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = runtime.spawn(async move {
            let mut system = System::new_with_specifics(RefreshKind::nothing());
            let started = Instant::now();
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => sample(&mut system, pid, &instruments, started),
                    _ = &mut stop_rx => break,
                }
            }
            tracing::debug!("Host metrics collector stopped");
        });

        tracing::debug!(interval = ?interval, "Host metrics collector started");
        Ok(Self { stop_tx, task })
    }

    /// Stop sampling and wait for the loop to exit.
    pub async fn stop(self) -> Result<(), BoxError> {
        // The loop only ends through this channel, so a failed send means it already panicked.
        let _ = self.stop_tx.send(());
        self.task.await.map_err(BoxError::from)
    }
}

fn sample(system: &mut System, pid: Pid, instruments: &Instruments, started: Instant) {
    system.refresh_memory();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory().with_cpu(),
    );

    if let Some(process) = system.process(pid) {
        instruments.process_memory.record(process.memory(), &[]);
        instruments
            .process_cpu
            .record(f64::from(process.cpu_usage()), &[]);
    }
    instruments
        .system_memory_used
        .record(system.used_memory(), &[]);

    let runtime = tokio::runtime::Handle::current().metrics();
    instruments
        .runtime_workers
        .record(runtime.num_workers() as u64, &[]);
    instruments
        .runtime_alive_tasks
        .record(runtime.num_alive_tasks() as u64, &[]);
    instruments
        .uptime
        .record(started.elapsed().as_secs_f64(), &[]);
}

// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Independent periodic refresh per device.
//!
//! Every scheduled device gets its own tokio task driving an interval. The
//! task awaits each refresh before waiting for the next tick, so a device
//! is never refreshed twice at once; ticks that fall due while a refresh is
//! still running are skipped. A shared semaphore bounds how many refreshes
//! run at the same time across all devices.
//!
//! Driver calls are synchronous and run on tokio's blocking pool.
//!
//! [`Scheduler::shutdown`] stops scheduling new refreshes and waits for
//! the ones in flight to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::bridge::Bridge;
use crate::config::{BridgeConfig, DeviceConfig, MAX_FETCH_INTERVAL_SECONDS};
use crate::driver::DeviceDriver;
use crate::error::{Error, Result};
use crate::registry::DeviceHandle;

/// Runs one refresh job per device on a bounded worker pool.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use homie_bridge::{Bridge, Scheduler};
/// use homie_bridge::config::{BridgeConfig, DeviceConfig};
/// use homie_bridge::driver::{DeviceDriver, DeviceStatus};
/// use homie_bridge::error::DriverError;
/// use homie_bridge::protocol::MemoryTransport;
///
/// struct Printer;
/// impl DeviceDriver for Printer {
///     fn status(&self) -> Result<DeviceStatus, DriverError> {
///         Ok(DeviceStatus::new())
///     }
/// }
///
/// # async fn example() -> homie_bridge::Result<()> {
/// let config = BridgeConfig::default();
/// let bridge = Arc::new(Bridge::new(Arc::new(MemoryTransport::new()), &config));
/// let mut scheduler = Scheduler::new(Arc::clone(&bridge), &config)?;
///
/// let device = DeviceConfig::new("printer", "printer").with_fetch_interval_seconds(300);
/// scheduler.add(&device, Arc::new(Printer))?;
///
/// // ... run until asked to stop ...
/// scheduler.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Scheduler {
    bridge: Arc<Bridge>,
    workers: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    jobs: Vec<(String, JoinHandle<()>)>,
}

impl Scheduler {
    /// Creates a scheduler with `config.workers` concurrent refreshes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `workers` is zero.
    pub fn new(bridge: Arc<Bridge>, config: &BridgeConfig) -> Result<Self> {
        let workers = config.worker_count()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            bridge,
            workers: Arc::new(Semaphore::new(workers)),
            shutdown,
            jobs: Vec::new(),
        })
    }

    /// Registers a device from its configuration and schedules it.
    ///
    /// # Errors
    ///
    /// Fails for a zero interval, a duplicate id or an id that is not
    /// topic-safe.
    pub fn add(&mut self, config: &DeviceConfig, driver: Arc<dyn DeviceDriver>) -> Result<DeviceHandle> {
        let interval = config.fetch_interval()?;
        let device = self
            .bridge
            .register_device(&config.id, config.display_name())?;
        self.schedule(device, driver, interval, config.refresh_on_start)?;
        Ok(device)
    }

    /// Schedules an already registered device.
    ///
    /// With `refresh_on_start` the first refresh runs immediately, otherwise
    /// after one `interval`. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a registry error for a foreign handle and a configuration
    /// error for a zero interval or one above
    /// [`MAX_FETCH_INTERVAL_SECONDS`].
    pub fn schedule(
        &mut self,
        device: DeviceHandle,
        driver: Arc<dyn DeviceDriver>,
        interval: Duration,
        refresh_on_start: bool,
    ) -> Result<()> {
        let device_id = self.bridge.registry().device_id(device)?;
        if interval.is_zero() || interval > Duration::from_secs(MAX_FETCH_INTERVAL_SECONDS) {
            return Err(Error::Config(format!(
                "device '{device_id}': refresh interval {interval:?} out of range"
            )));
        }
        let start = if refresh_on_start {
            Instant::now()
        } else {
            Instant::now() + interval
        };
        tracing::info!(
            device = %device_id,
            interval_secs = interval.as_secs_f64(),
            refresh_on_start,
            "Scheduling device refresh"
        );

        let job = RefreshJob {
            bridge: Arc::clone(&self.bridge),
            workers: Arc::clone(&self.workers),
            device,
            device_id: device_id.clone(),
            driver,
        };
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(job.run(start, interval, shutdown));
        self.jobs.push((device_id, handle));
        Ok(())
    }

    /// Number of scheduled devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no device is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Stops all jobs, letting in-flight refreshes complete.
    pub async fn shutdown(self) {
        tracing::info!(jobs = self.jobs.len(), "Stopping refresh scheduler");
        let _ = self.shutdown.send(true);
        for (device, handle) in self.jobs {
            if let Err(e) = handle.await {
                tracing::error!(device = %device, error = %e, "Refresh job ended abnormally");
            }
        }
        tracing::info!("Refresh scheduler stopped");
    }
}

struct RefreshJob {
    bridge: Arc<Bridge>,
    workers: Arc<Semaphore>,
    device: DeviceHandle,
    device_id: String,
    driver: Arc<dyn DeviceDriver>,
}

impl RefreshJob {
    async fn run(self, start: Instant, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                permit = Arc::clone(&self.workers).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                break;
            };

            let bridge = Arc::clone(&self.bridge);
            let driver = Arc::clone(&self.driver);
            let device = self.device;
            // Awaited outside of any select so shutdown never cuts a refresh short.
            let result = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                bridge.refresh(device, driver.as_ref())
            })
            .await;

            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::error!(device = %self.device_id, error = %e, "Refresh aborted");
                }
                Err(e) => {
                    tracing::error!(device = %self.device_id, error = %e, "Refresh panicked");
                }
            }
        }
        tracing::debug!(device = %self.device_id, "Refresh job stopped");
    }
}

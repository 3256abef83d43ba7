//! Feeder ownership and status polling

use super::driver::SharedDriver;
use super::feeder::{Feeder, FeederOptions, StatusChanged};
use super::JoystickStatus;
use crate::events::{Observers, SubscriptionId};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of virtual devices the driver exposes
pub const MAX_DEVICES: u8 = 16;

/// Interval between status polls of one device
#[derive(Debug, Clone)]
pub struct PollSchedule {
    pub base: Duration,
    /// Uniform random extra delay, drawn per poll
    pub jitter: Duration,
    /// Added while the device is held by another process
    pub occupied_extra: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            jitter: Duration::from_millis(1000),
            occupied_extra: Duration::from_millis(1000),
        }
    }
}

impl PollSchedule {
    pub fn delay(&self, status: JoystickStatus, rng: &mut impl Rng) -> Duration {
        let jitter_ms = rng.gen_range(0..=self.jitter.as_millis() as u64);
        let mut delay = self.base + Duration::from_millis(jitter_ms);
        if status == JoystickStatus::Occupied {
            delay += self.occupied_extra;
        }
        delay
    }
}

/// Driver version report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverVersions {
    /// Library and driver versions agree
    pub matched: bool,
    pub library: u32,
    pub driver: u32,
}

pub struct JoyManager {
    driver: SharedDriver,
    feeders: Vec<Arc<Feeder>>,
    observers: Arc<Observers<StatusChanged>>,
    schedule: PollSchedule,
    cancel: CancellationToken,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl JoyManager {
    /// Create feeders for devices `1..=count`, clamped to [`MAX_DEVICES`]
    pub fn new(
        driver: SharedDriver,
        count: u8,
        options: FeederOptions,
        schedule: PollSchedule,
    ) -> Self {
        let count = count.clamp(1, MAX_DEVICES);
        let observers = Arc::new(Observers::new());
        let feeders = (1..=count)
            .map(|id| {
                Arc::new(Feeder::new(
                    id,
                    driver.clone(),
                    options.clone(),
                    Arc::clone(&observers),
                ))
            })
            .collect();

        Self {
            driver,
            feeders,
            observers,
            schedule,
            cancel: CancellationToken::new(),
            pollers: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.feeders.len()
    }

    /// Feeder for a 1-based device id
    pub fn joystick(&self, device_id: u8) -> Option<Arc<Feeder>> {
        let index = usize::from(device_id).checked_sub(1)?;
        self.feeders.get(index).cloned()
    }

    pub fn joysticks(&self) -> &[Arc<Feeder>] {
        &self.feeders
    }

    pub fn versions(&self) -> DriverVersions {
        let (library, driver) = self.driver.call(|driver| driver.versions());
        DriverVersions {
            matched: library == driver,
            library,
            driver,
        }
    }

    pub fn subscribe_status<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StatusChanged) + Send + Sync + 'static,
    {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe_status(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Acquire a device; false if it does not exist or the driver refused
    pub async fn acquire(&self, device_id: u8) -> bool {
        match self.joystick(device_id) {
            Some(feeder) => feeder.acquire().await,
            None => {
                warn!("No joystick {} to acquire", device_id);
                false
            }
        }
    }

    pub async fn release(&self, device_id: u8) {
        if let Some(feeder) = self.joystick(device_id) {
            feeder.release().await;
        }
    }

    /// Spawn one status-poll loop per device; no-op if already running
    pub fn start_polling(&self) {
        let mut pollers = self.pollers.lock();
        if !pollers.is_empty() {
            return;
        }

        for feeder in &self.feeders {
            let feeder = Arc::clone(feeder);
            let schedule = self.schedule.clone();
            let cancel = self.cancel.clone();
            pollers.push(tokio::spawn(poll_loop(feeder, schedule, cancel)));
        }
        info!("Polling status of {} joysticks", self.feeders.len());
    }

    /// Stop polling and release every device this process holds
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let pollers: Vec<_> = self.pollers.lock().drain(..).collect();
        for poller in pollers {
            if let Err(e) = poller.await {
                warn!("Status poller ended abnormally: {}", e);
            }
        }

        for feeder in &self.feeders {
            if feeder.is_acquired() {
                feeder.release().await;
            }
        }
        debug!("Joystick manager shut down");
    }
}

async fn poll_loop(feeder: Arc<Feeder>, schedule: PollSchedule, cancel: CancellationToken) {
    // Per-device seed keeps the sixteen loops out of phase
    let mut rng = StdRng::seed_from_u64(u64::from(feeder.id()));

    loop {
        let polled = Arc::clone(&feeder);
        let status = match tokio::task::spawn_blocking(move || polled.update_status()).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Status poll of joystick {} failed: {}", feeder.id(), e);
                feeder.status()
            }
        };

        let delay = schedule.delay(status, &mut rng);
        select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!("Status poller for joystick {} stopped", feeder.id());
}

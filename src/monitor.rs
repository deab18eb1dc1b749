//! Supervisor for the monitored systems and their probers.
//!
//! The monitor owns the authoritative list of systems. Structural operations
//! (load, add, update, remove, snapshot) serialise on one async mutex.
//! Observations only take the lock of the row they belong to, and listeners
//! run on the prober task that produced the observation while that lock is
//! held. Listeners must not call back into the monitor.
//!
//! Lock order is structural lock first, then row locks in ascending index.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    errors::MonitorError,
    otel::metrics::Metrics,
    probe::{
        model::{FailureEvent, LastStatus, Observation, System},
        schedule::{Prober, ProberHandle, ProberState, REQUEST_TIMEOUT_CAP},
    },
};

// Limits the failures we keep per system. Once we go over this amount we drop the earliest.
pub const MAX_FAILURES: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub max_failures: usize,
    pub request_timeout_cap: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            max_failures: MAX_FAILURES,
            request_timeout_cap: REQUEST_TIMEOUT_CAP,
        }
    }
}

/// Display-relevant state of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    pub name: String,
    pub interval: String,
    pub status: LastStatus,
    pub failure_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The whole list was replaced.
    Loaded { rows: Vec<RowView> },
    Added { index: usize, row: RowView },
    Updated { index: usize, row: RowView },
    /// Rows after `index` have shifted down by one.
    Removed { index: usize },
    Observed {
        index: usize,
        status: LastStatus,
        failure_count: usize,
    },
}

pub type Listener = Arc<dyn Fn(&MonitorEvent) + Send + Sync>;

struct RowState {
    index: usize,
    system: System,
    last_status: LastStatus,
}

impl RowState {
    fn view(&self) -> RowView {
        RowView {
            name: self.system.name.clone(),
            interval: self.system.check_interval.clone(),
            status: self.last_status.clone(),
            failure_count: self.system.failed_checks.len(),
        }
    }

    fn record(&mut self, observation: Observation, max_failures: usize) {
        if let Some(kind) = observation.failure_type() {
            self.system.failed_checks.push(FailureEvent {
                kind,
                time: Utc::now(),
            });
            let excess = self.system.failed_checks.len().saturating_sub(max_failures);
            if excess > 0 {
                self.system.failed_checks.drain(..excess);
            }
        }
        self.last_status = observation.into();
    }
}

struct Row {
    state: Mutex<RowState>,
}

impl Row {
    fn new(index: usize, system: System) -> Arc<Row> {
        Arc::new(Row {
            state: Mutex::new(RowState {
                index,
                system,
                last_status: LastStatus::Unknown,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Slot {
    row: Arc<Row>,
    prober: ProberHandle,
}

pub struct Monitor {
    slots: tokio::sync::Mutex<Vec<Slot>>,
    listeners: RwLock<Vec<Listener>>,
    shutdown: CancellationToken,
    settings: MonitorSettings,
    pub metrics: Metrics,
}

impl Monitor {
    pub fn new(settings: MonitorSettings) -> Arc<Monitor> {
        Arc::new(Monitor {
            slots: tokio::sync::Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
            settings,
            metrics: Metrics::new(),
        })
    }

    /// Registers a listener for every observation and structural change.
    pub fn subscribe(&self, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Replaces all systems, restarting one prober per entry.
    ///
    /// Entries are not validated; a misconfigured one gets a prober that
    /// reports a single configuration failure.
    pub async fn load(self: &Arc<Self>, systems: Vec<System>) -> Result<(), MonitorError> {
        let mut slots = self.slots.lock().await;
        self.ensure_running()?;
        let mut previous: Vec<Slot> = slots.drain(..).collect();
        futures::future::join_all(previous.iter_mut().map(|slot| slot.prober.stop())).await;

        let rows: Vec<Arc<Row>> = systems
            .into_iter()
            .enumerate()
            .map(|(index, system)| Row::new(index, system))
            .collect();
        let views = rows.iter().map(|row| row.lock().view()).collect();
        self.dispatch(&MonitorEvent::Loaded { rows: views });

        for row in rows {
            let prober = self.start_prober(&row);
            slots.push(Slot { row, prober });
        }
        info!(systems = slots.len(), "systems loaded");
        Ok(())
    }

    /// Appends a validated system and returns its index.
    pub async fn add(self: &Arc<Self>, system: System) -> Result<usize, MonitorError> {
        system.validate()?;
        let mut slots = self.slots.lock().await;
        self.ensure_running()?;
        let index = slots.len();
        let row = Row::new(index, system);
        let view = row.lock().view();
        self.dispatch(&MonitorEvent::Added { index, row: view });

        let prober = self.start_prober(&row);
        slots.push(Slot { row, prober });
        info!(index, "system added");
        Ok(index)
    }

    /// Replaces the system at `index`, keeping its recorded failures.
    ///
    /// The previous prober has exited before this returns.
    pub async fn update(self: &Arc<Self>, index: usize, system: System) -> Result<(), MonitorError> {
        system.validate()?;
        let mut slots = self.slots.lock().await;
        self.ensure_running()?;
        let slot = slots.get_mut(index).ok_or(MonitorError::NotFound(index))?;

        slot.prober.stop().await;

        let view = {
            let mut state = slot.row.lock();
            let failed_checks = std::mem::take(&mut state.system.failed_checks);
            state.system = System {
                failed_checks,
                ..system
            };
            state.last_status = LastStatus::Unknown;
            let view = state.view();
            self.dispatch(&MonitorEvent::Updated {
                index,
                row: view.clone(),
            });
            view
        };

        slot.prober = self.start_prober(&slot.row);
        info!(index, system = %view.name, "system updated");
        Ok(())
    }

    /// Stops the prober at `index` and drops the row.
    pub async fn remove(&self, index: usize) -> Result<(), MonitorError> {
        let mut slots = self.slots.lock().await;
        self.ensure_running()?;
        if index >= slots.len() {
            return Err(MonitorError::NotFound(index));
        }
        let mut removed = slots.remove(index);
        let name = removed.row.lock().system.name.clone();
        removed.prober.stop().await;

        self.reindex_after_removal(&slots[index..], index);
        info!(index, system = %name, "system removed");
        Ok(())
    }

    // Trailing row locks are held until listeners have seen `Removed`, so an
    // observation for a shifted row is delivered either before the event
    // under its old index or after it under its new one.
    fn reindex_after_removal(&self, trailing: &[Slot], removed: usize) {
        let mut guards: Vec<MutexGuard<'_, RowState>> =
            trailing.iter().map(|slot| slot.row.lock()).collect();
        for guard in guards.iter_mut() {
            guard.index -= 1;
        }
        self.dispatch(&MonitorEvent::Removed { index: removed });
        drop(guards);
    }

    /// Deep copy of the current systems.
    pub async fn snapshot(&self) -> Vec<System> {
        let slots = self.slots.lock().await;
        slots
            .iter()
            .map(|slot| slot.row.lock().system.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    pub async fn status(&self, index: usize) -> Option<LastStatus> {
        let slots = self.slots.lock().await;
        slots.get(index).map(|slot| slot.row.lock().last_status.clone())
    }

    pub async fn prober_state(&self, index: usize) -> Option<ProberState> {
        let slots = self.slots.lock().await;
        slots.get(index).map(|slot| slot.prober.state())
    }

    /// Number of prober tasks that have not exited.
    pub async fn live_probers(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.iter().filter(|slot| slot.prober.is_live()).count()
    }

    /// Cancels every prober, waits for all of them, and drops the listeners.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut slots = self.slots.lock().await;
        let mut probers: Vec<ProberHandle> = slots.drain(..).map(|slot| slot.prober).collect();
        futures::future::join_all(probers.iter_mut().map(ProberHandle::stop)).await;
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("monitor shut down");
    }

    fn ensure_running(&self) -> Result<(), MonitorError> {
        if self.shutdown.is_cancelled() {
            return Err(MonitorError::Shutdown);
        }
        Ok(())
    }

    fn start_prober(self: &Arc<Self>, row: &Arc<Row>) -> ProberHandle {
        let system = row.lock().system.clone();
        let prober = Prober::new(&system, self.settings.request_timeout_cap);
        debug!(system = %system.name, timeout = ?prober.request_timeout(), "starting prober");
        let token = self.shutdown.child_token();

        let monitor = Arc::downgrade(self);
        let row = row.clone();
        let prober_token = token.clone();
        prober.spawn(token, move |observation, elapsed| {
            if let Some(monitor) = monitor.upgrade() {
                monitor.apply(&row, &prober_token, observation, elapsed);
            }
        })
    }

    fn apply(&self, row: &Row, token: &CancellationToken, observation: Observation, elapsed: Duration) {
        let mut state = row.lock();
        if token.is_cancelled() {
            debug!(index = state.index, ?observation, "dropping observation from cancelled prober");
            return;
        }
        self.metrics.record(&state.system.name, &observation, elapsed);
        state.record(observation, self.settings.max_failures);
        self.dispatch(&MonitorEvent::Observed {
            index: state.index,
            status: state.last_status.clone(),
            failure_count: state.system.failed_checks.len(),
        });
    }

    fn dispatch(&self, event: &MonitorEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(event);
        }
    }

    #[cfg(test)]
    async fn inject(&self, index: usize, observation: Observation) {
        let slots = self.slots.lock().await;
        let slot = &slots[index];
        self.apply(&slot.row, slot.prober.token(), observation, Duration::ZERO);
    }
}

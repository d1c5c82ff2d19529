use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use courtwatch_core::{AppConfig, CheckError, MonitorConfig};
use courtwatch_session::SessionManager;

use crate::check::{CheckOrchestrator, CheckReport};
use crate::notify::Dispatcher;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error(transparent)]
    InvalidConfig(#[from] CheckError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Session and orchestrator together; one check at a time goes through this.
pub struct Engine {
    pub session: SessionManager,
    pub orchestrator: CheckOrchestrator,
}

impl Engine {
    pub fn new(session: SessionManager, orchestrator: CheckOrchestrator) -> Self {
        Self { session, orchestrator }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, CheckError> {
        Ok(Self::new(
            SessionManager::from_config(config)?,
            CheckOrchestrator::from_config(&config.parser),
        ))
    }

    pub async fn check(&mut self, config: &MonitorConfig) -> CheckReport {
        self.orchestrator.run_check(&mut self.session, config).await
    }
}

#[derive(Clone)]
struct Shared {
    engine: Arc<Mutex<Engine>>,
    dispatcher: Arc<Dispatcher>,
    last_report: Arc<RwLock<Option<CheckReport>>>,
}

impl Shared {
    /// One check plus its notification. `None` when another check holds the engine.
    async fn run_cycle(&self, config: &MonitorConfig) -> Option<CheckReport> {
        let Ok(mut engine) = self.engine.try_lock() else {
            warn!("check already in flight, skipping");
            return None;
        };
        let report = engine.check(config).await;
        drop(engine);

        let available = report.available_records();
        if !available.is_empty() {
            self.dispatcher.notify(&available, report.checked_at).await;
        }

        *self.last_report.write().await = Some(report.clone());
        Some(report)
    }
}

struct RunningTask {
    config: MonitorConfig,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct PollScheduler {
    shared: Shared,
    task: Option<RunningTask>,
}

impl PollScheduler {
    pub fn new(engine: Engine, dispatcher: Dispatcher) -> Self {
        Self {
            shared: Shared {
                engine: Arc::new(Mutex::new(engine)),
                dispatcher: Arc::new(dispatcher),
                last_report: Arc::new(RwLock::new(None)),
            },
            task: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        match &self.task {
            Some(task) if !task.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Check immediately, then every `interval_minutes`.
    pub fn start(&mut self, config: MonitorConfig) -> Result<(), ScheduleError> {
        if self.state() == SchedulerState::Running {
            return Err(ScheduleError::AlreadyRunning);
        }
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let shared = self.shared.clone();
        let loop_config = config.clone();
        let handle = tokio::spawn(async move { poll_loop(shared, loop_config, shutdown_rx).await });

        info!(
            interval_minutes = config.interval_minutes,
            locations = config.locations.len(),
            time_slots = config.time_slots.len(),
            "scheduler started"
        );
        self.task = Some(RunningTask {
            config,
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// No further ticks start after this; a check already running is waited for.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.shutdown_tx.send(());
        if let Err(e) = task.handle.await {
            warn!("poll loop ended abnormally: {}", e);
        }
        info!("scheduler stopped");
    }

    /// Follow `config.active`. A running schedule whose selection or interval
    /// changed is restarted with the new config.
    pub async fn apply(&mut self, config: MonitorConfig) -> Result<SchedulerState, ScheduleError> {
        let running = self.state() == SchedulerState::Running;
        match (config.active, running) {
            (false, true) => self.stop().await,
            (true, false) => self.start(config)?,
            (true, true) => {
                let unchanged = self.task.as_ref().is_some_and(|t| t.config == config);
                if !unchanged {
                    config.validate()?;
                    self.stop().await;
                    self.start(config)?;
                }
            }
            (false, false) => {}
        }
        Ok(self.state())
    }

    /// One check outside the schedule. `None` when a check is already in flight.
    pub async fn check_now(&self, config: &MonitorConfig) -> Option<CheckReport> {
        self.shared.run_cycle(config).await
    }

    pub async fn last_report(&self) -> Option<CheckReport> {
        self.shared.last_report.read().await.clone()
    }
}

async fn poll_loop(shared: Shared, config: MonitorConfig, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("poll loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Some(report) = shared.run_cycle(&config).await {
                    debug!(
                        records = report.records.len(),
                        degraded = report.error.is_some(),
                        "scheduled check finished"
                    );
                }
            }
        }
    }
}

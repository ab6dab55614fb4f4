//! The poll/publish/write loop.
//!
//! A single task owns the register bus and the point state store.
//! Each tick drains queued write commands, performs due reads in
//! registry order, and flushes state publishes. The MQTT side only
//! ever talks to this loop through channels, which keeps the
//! half-duplex serial link free of concurrent transactions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use registry::codec::{self, EncodedWrite, ScaleContext};
use registry::{PointSource, RefreshPolicy, Registry, WriteSpec};
use types::topics;
use types::{Publication, RegisterBus, Value, WriteCommand};

mod resolver;
mod state;

pub use state::{PointState, StateStore};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Idle delay between ticks.
    pub tick_interval: Duration,
    /// Bus settle delay after a drained write batch touched the device.
    pub write_settle: Duration,
    /// Delay after a tick-level failure, to avoid hammering a wedged
    /// link.
    pub error_backoff: Duration,
    /// How soon after a full-refresh write the written point is re-read
    /// on its own timer.
    pub refresh_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            write_settle: Duration::from_millis(200),
            error_backoff: Duration::from_millis(2_000),
            refresh_grace: Duration::from_millis(1_000),
        }
    }
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("outbound publish channel closed")]
    OutboundClosed,
}

/// Per-tick accounting, logged and returned for tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub writes_applied: usize,
    pub writes_discarded: usize,
    pub points_read: usize,
    pub read_failures: usize,
    pub published: usize,
}

pub struct Scheduler<B> {
    registry: Arc<Registry>,
    bus: B,
    scale: ScaleContext,
    root_topic: String,
    states: StateStore,
    commands: mpsc::Receiver<WriteCommand>,
    outbound: mpsc::Sender<Publication>,
    shutdown: watch::Receiver<bool>,
    config: SchedulerConfig,
}

impl<B: RegisterBus> Scheduler<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<Registry>,
        bus: B,
        scale: ScaleContext,
        root_topic: impl Into<String>,
        commands: mpsc::Receiver<WriteCommand>,
        outbound: mpsc::Sender<Publication>,
        shutdown: watch::Receiver<bool>,
        config: SchedulerConfig,
    ) -> Self {
        let states = StateStore::new(&registry);
        Self {
            registry,
            bus,
            scale,
            root_topic: root_topic.into(),
            states,
            commands,
            outbound,
            shutdown,
            config,
        }
    }

    /// Runs until the shutdown signal flips. Individual read/write
    /// failures never stop the loop; a tick-level failure only inserts
    /// a longer backoff before the next attempt.
    pub async fn run(mut self) {
        info!(points = self.registry.len(), "scheduler started");
        loop {
            if *self.shutdown.borrow() {
                info!("scheduler shutdown requested");
                break;
            }

            let delay = match self.run_tick(Instant::now()).await {
                Ok(summary) => {
                    debug!(
                        writes = summary.writes_applied,
                        discarded = summary.writes_discarded,
                        reads = summary.points_read,
                        failures = summary.read_failures,
                        published = summary.published,
                        "tick complete"
                    );
                    self.config.tick_interval
                }
                Err(err) => {
                    warn!(error = %err, "tick failed");
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!("scheduler shutdown requested");
                        break;
                    }
                }
            }
        }
    }

    /// One drain-read-publish cycle. Public so tests can drive the
    /// loop with a synthetic clock.
    pub async fn run_tick(&mut self, now: Instant) -> Result<TickSummary, TickError> {
        let mut summary = TickSummary::default();
        let mut pending: Vec<Publication> = Vec::new();
        let mut backdate: Vec<usize> = Vec::new();

        let drained = self.drain_commands();
        let mut touched_bus = false;
        for command in drained {
            self.apply_write(command, now, &mut summary, &mut pending, &mut backdate, &mut touched_bus)
                .await;
        }
        if touched_bus {
            sleep(self.config.write_settle).await;
        }

        self.read_pass(now, &mut summary, &mut pending).await;
        self.states.clear_refresh_flags();

        for position in backdate {
            let point = self.registry.point(position);
            if let RefreshPolicy::Every(interval) = point.refresh {
                let state = self.states.get_mut(position);
                state.last_update = now
                    .checked_sub(interval)
                    .map(|base| base + self.config.refresh_grace);
            }
        }

        summary.published = pending.len();
        for publication in pending {
            if self.outbound.send(publication).await.is_err() {
                return Err(TickError::OutboundClosed);
            }
        }

        Ok(summary)
    }

    pub fn point_state(&self, name: &str) -> Option<&PointState> {
        let position = self.registry.position(name)?;
        Some(self.states.get(position))
    }

    /// Non-blocking snapshot: commands arriving after this returns are
    /// deferred to the next tick.
    fn drain_commands(&mut self) -> Vec<WriteCommand> {
        let mut drained = Vec::new();
        loop {
            match self.commands.try_recv() {
                Ok(command) => drained.push(command),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("command channel closed");
                    break;
                }
            }
        }
        drained
    }

    async fn apply_write(
        &mut self,
        command: WriteCommand,
        now: Instant,
        summary: &mut TickSummary,
        pending: &mut Vec<Publication>,
        backdate: &mut Vec<usize>,
        touched_bus: &mut bool,
    ) {
        let Some((position, point)) = self.registry.get(&command.point) else {
            warn!(point = %command.point, "write for unknown point discarded");
            summary.writes_discarded += 1;
            return;
        };
        let point = point.clone();

        if !point.enabled {
            warn!(point = %point.name, "write for disabled point discarded");
            summary.writes_discarded += 1;
            return;
        }

        let Some(WriteSpec { op, full_refresh }) = point.write.clone() else {
            warn!(point = %point.name, "write for read-only point discarded");
            summary.writes_discarded += 1;
            return;
        };

        if point.dangerous && !self.interlock_armed() {
            warn!(point = %point.name, "dangerous write discarded, guard not armed");
            summary.writes_discarded += 1;
            return;
        }

        let encoded = match codec::encode(&op, &command.payload, &self.scale) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(point = %point.name, error = %err, "write payload rejected");
                summary.writes_discarded += 1;
                return;
            }
        };

        match encoded {
            EncodedWrite::Local { value } => {
                let state = self.states.get_mut(position);
                state.last_value = Some(value.clone());
                state.last_update = Some(now);
                pending.push(Publication {
                    topic: topics::state_topic(
                        &self.root_topic,
                        point.category.component(),
                        &point.name,
                    ),
                    payload: value.to_string(),
                });
                info!(point = %point.name, value = %value, "guard updated");
                summary.writes_applied += 1;
            }
            EncodedWrite::Register { register, value, applied } => {
                *touched_bus = true;
                match self.bus.write_register(register, value).await {
                    Ok(()) => {
                        info!(point = %point.name, register, value, "setting written");
                        summary.writes_applied += 1;
                        match applied {
                            // Never read back from the device; the
                            // accepted write is the only source of state.
                            Some(applied) if point.is_command_only() => {
                                let state = self.states.get_mut(position);
                                state.last_value = Some(applied.clone());
                                state.last_update = Some(now);
                                pending.push(Publication {
                                    topic: topics::state_topic(
                                        &self.root_topic,
                                        point.category.component(),
                                        &point.name,
                                    ),
                                    payload: applied.to_string(),
                                });
                            }
                            // Optimistic value until the forced re-read
                            // lands.
                            Some(applied) if full_refresh => {
                                let state = self.states.get_mut(position);
                                state.last_value = Some(applied);
                            }
                            _ => {}
                        }
                        if full_refresh {
                            self.states.mark_all_for_refresh();
                            backdate.push(position);
                        }
                    }
                    Err(err) => {
                        warn!(point = %point.name, error = %err, "register write failed");
                        summary.writes_discarded += 1;
                    }
                }
            }
        }
    }

    async fn read_pass(
        &mut self,
        now: Instant,
        summary: &mut TickSummary,
        pending: &mut Vec<Publication>,
    ) {
        let registry = Arc::clone(&self.registry);
        for position in 0..registry.len() {
            let point = registry.point(position);
            if !point.enabled || point.is_button() || point.is_command_only() {
                continue;
            }
            if !self.is_due(position, point.refresh, now) {
                continue;
            }

            let value = match &point.source {
                PointSource::Register(op) => {
                    match self.bus.read_registers(op.register, op.count).await {
                        Ok(registers) => match codec::decode(op, &registers, &self.scale) {
                            Ok(value) => value,
                            Err(err) => {
                                warn!(point = %point.name, error = %err, "decode failed");
                                summary.read_failures += 1;
                                continue;
                            }
                        },
                        Err(err) => {
                            warn!(point = %point.name, error = %err, "register read failed");
                            summary.read_failures += 1;
                            continue;
                        }
                    }
                }
                PointSource::Derived(expr) => resolver::resolve(expr, &registry, &self.states),
                PointSource::Command { .. } => continue,
            };

            let state = self.states.get_mut(position);
            state.last_value = Some(value.clone());
            state.last_update = Some(now);
            summary.points_read += 1;
            pending.push(Publication {
                topic: topics::state_topic(
                    &self.root_topic,
                    point.category.component(),
                    &point.name,
                ),
                payload: value.to_string(),
            });
        }
    }

    fn is_due(&self, position: usize, refresh: RefreshPolicy, now: Instant) -> bool {
        let state = self.states.get(position);
        if state.force_refresh {
            return true;
        }
        match refresh {
            RefreshPolicy::Never => false,
            RefreshPolicy::Once => state.last_update.is_none(),
            RefreshPolicy::Every(interval) => match state.last_update {
                None => true,
                Some(last) => now.duration_since(last) > interval,
            },
        }
    }

    fn interlock_armed(&self) -> bool {
        let Some(interlock) = self.registry.interlock() else {
            return false;
        };
        let Some(position) = self.registry.position(&interlock.name) else {
            return false;
        };
        matches!(
            self.states.value(position),
            Some(Value::Text(current)) if *current == interlock.armed
        )
    }
}

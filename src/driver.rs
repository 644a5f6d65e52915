//! Runs a [`ManipulatorMonitor`] as a tokio task.
//!
//! Broad-phase notifications arrive over an `mpsc` channel, a fixed-rate
//! interval advances the monitor's timers, and every event it reports is
//! handed to an [`EpisodeLogger`]. Flipping the shutdown `watch` to `true`
//! (or dropping its sender, or closing the signal channel) finishes the
//! monitor and delivers its final events before the task returns.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::DriverError;
use crate::facts::{EntityId, ManipulatorEvent, ShapeId};
use crate::monitor::ManipulatorMonitor;
use crate::world::World;

/// Raw input from the physics front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsSignal {
    OverlapBegin { shape: ShapeId, other: EntityId },
    OverlapEnd { shape: ShapeId, other: EntityId },
    PauseGrasp(bool),
}

/// Consumer of reported events, usually the episode recorder.
#[async_trait]
pub trait EpisodeLogger: Send + Sync {
    async fn log(&self, event: ManipulatorEvent) -> Result<(), DriverError>;
}

#[async_trait]
impl EpisodeLogger for mpsc::Sender<ManipulatorEvent> {
    async fn log(&self, event: ManipulatorEvent) -> Result<(), DriverError> {
        self.send(event)
            .await
            .map_err(|_| DriverError::LoggerClosed)
    }
}

pub struct EpisodeDriver<W: World, L: EpisodeLogger> {
    monitor: ManipulatorMonitor<W>,
    logger: L,
    signals: mpsc::Receiver<PhysicsSignal>,
    shutdown: watch::Receiver<bool>,
}

impl<W: World, L: EpisodeLogger> EpisodeDriver<W, L> {
    pub fn new(
        monitor: ManipulatorMonitor<W>,
        logger: L,
        signals: mpsc::Receiver<PhysicsSignal>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            monitor,
            logger,
            signals,
            shutdown,
        }
    }

    /// Initializes and starts the monitor, then serves it until shutdown.
    pub async fn run(mut self) -> Result<(), DriverError> {
        self.monitor.init()?;
        self.monitor.start();
        self.forward().await?;

        let period = Duration::from_secs_f64(self.monitor.config().pick_and_place.update_rate);
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(owner = %self.monitor.owner(), ?period, "episode driver running");

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!("shutdown requested");
                        break;
                    }
                }
                signal = self.signals.recv() => match signal {
                    Some(signal) => self.apply(signal),
                    None => {
                        debug!("physics signal channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.monitor.advance(),
            }
            self.forward().await?;
        }

        self.monitor.finish(true);
        self.forward().await?;
        info!(owner = %self.monitor.owner(), "episode driver stopped");
        Ok(())
    }

    fn apply(&mut self, signal: PhysicsSignal) {
        match signal {
            PhysicsSignal::OverlapBegin { shape, other } => {
                self.monitor.on_overlap_begin(shape, other)
            }
            PhysicsSignal::OverlapEnd { shape, other } => self.monitor.on_overlap_end(shape, other),
            PhysicsSignal::PauseGrasp(pause) => self.monitor.pause_grasp(pause),
        }
    }

    async fn forward(&mut self) -> Result<(), DriverError> {
        for event in self.monitor.drain_events() {
            self.logger.log(event).await?;
        }
        Ok(())
    }
}

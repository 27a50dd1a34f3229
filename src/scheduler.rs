//! The 20 ms audio pacer.
//!
//! The scheduler owns no encoder: the caller supplies pre-encoded Opus
//! frames through a [`FrameSource`], and the scheduler's only jobs are
//! cadence, fan-out to subscribed supervisors, and polite silence tails.

use std::sync::Arc;

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, EmptyBehavior};
use crate::constants::*;
use crate::supervisor::Supervisor;

/// Producer of pre-encoded Opus frames, pulled once per 20 ms tick.
///
/// Returning `None` counts as a missed frame; enough consecutive misses
/// pause playback.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<Vec<u8>>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<Vec<u8>> + Send,
{
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        (self)()
    }
}

/// Playback status of the pacer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    /// Nothing playing; no ticking.
    Idle,
    /// Started, waiting (up to 100 ms) for the producer's first frame.
    Buffering,
    /// One frame per tick is being fanned out.
    Playing,
    /// Suspended by the caller or by producer starvation.
    Paused,
    /// Suspended because the subscriber set emptied out.
    AutoPaused,
}

enum SchedulerMessage {
    Subscribe(Supervisor),
    Unsubscribe(u64),
    Play,
    Pause,
    Stop,
    Poison,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
}

/// Handle to a running pacer task.
///
/// Dropping the handle stops the pacer.
pub struct Scheduler {
    tx: Sender<SchedulerMessage>,
    shared: Arc<SchedulerShared>,
}

impl Scheduler {
    /// Creates an idle scheduler around a frame producer.
    ///
    /// Must be created from within a Tokio runtime. Call [`play`] to start
    /// the cadence.
    ///
    /// [`play`]: Scheduler::play
    pub fn new(source: Box<dyn FrameSource>, config: &Config) -> Self {
        let (tx, rx) = flume::unbounded();
        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState::Idle),
        });

        let pacer = Pacer {
            source,
            subscribers: Vec::new(),
            behavior_on_empty: config.behavior_on_empty,
            max_missed_frames: config.max_missed_frames,
            state: SchedulerState::Idle,
            shared: shared.clone(),
            rx,
            deadline: Instant::now(),
            buffered_ticks: 0,
            missed: 0,
            silence_remaining: 0,
        };

        tokio::spawn(async move {
            info!("Audio scheduler started.");
            pacer.run().await;
            info!("Audio scheduler finished.");
        });

        Self { tx, shared }
    }

    /// Adds a supervisor to the fan-out set.
    ///
    /// Wakes an auto-paused scheduler.
    pub fn subscribe(&self, conn: &Supervisor) {
        let _ = self.tx.send(SchedulerMessage::Subscribe(conn.clone()));
    }

    /// Removes a supervisor from the fan-out set.
    pub fn unsubscribe(&self, conn: &Supervisor) {
        let _ = self.tx.send(SchedulerMessage::Unsubscribe(conn.id()));
    }

    /// Starts or resumes playback.
    pub fn play(&self) {
        let _ = self.tx.send(SchedulerMessage::Play);
    }

    /// Pauses playback, with a silence tail if frames were flowing.
    pub fn pause(&self) {
        let _ = self.tx.send(SchedulerMessage::Pause);
    }

    /// Stops playback and returns to idle, with a silence tail if frames
    /// were flowing.
    pub fn stop(&self) {
        let _ = self.tx.send(SchedulerMessage::Stop);
    }

    /// Current pacer status.
    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(SchedulerMessage::Poison);
    }
}

struct Pacer {
    source: Box<dyn FrameSource>,
    subscribers: Vec<Supervisor>,
    behavior_on_empty: EmptyBehavior,
    max_missed_frames: u8,
    state: SchedulerState,
    shared: Arc<SchedulerShared>,
    rx: Receiver<SchedulerMessage>,
    deadline: Instant,
    buffered_ticks: u8,
    missed: u8,
    silence_remaining: u8,
}

impl Pacer {
    #[instrument(skip(self))]
    async fn run(mut self) {
        loop {
            let ticking = matches!(
                self.state,
                SchedulerState::Buffering | SchedulerState::Playing
            ) || self.silence_remaining > 0;

            tokio::select! {
                msg = self.rx.recv_async() => {
                    match msg {
                        Ok(SchedulerMessage::Subscribe(conn)) => self.add_subscriber(conn),
                        Ok(SchedulerMessage::Unsubscribe(id)) => {
                            self.subscribers.retain(|s| s.id() != id);
                        },
                        Ok(SchedulerMessage::Play) => self.play(),
                        Ok(SchedulerMessage::Pause) => self.pause(),
                        Ok(SchedulerMessage::Stop) => self.stop(),
                        Ok(SchedulerMessage::Poison) | Err(_) => break,
                    }
                }
                _ = time::sleep_until(self.deadline), if ticking => {
                    self.tick();
                }
            }
        }
    }

    fn add_subscriber(&mut self, conn: Supervisor) {
        if self.subscribers.iter().any(|s| s.id() == conn.id()) {
            return;
        }

        self.subscribers.push(conn);

        if self.state == SchedulerState::AutoPaused {
            debug!("Subscriber returned; resuming playback.");
            self.resume_ticking(SchedulerState::Playing);
        }
    }

    fn play(&mut self) {
        self.silence_remaining = 0;

        match self.state {
            SchedulerState::Idle => {
                self.buffered_ticks = 0;
                self.missed = 0;
                self.resume_ticking(SchedulerState::Buffering);
            },
            SchedulerState::Paused | SchedulerState::AutoPaused => {
                self.missed = 0;
                self.resume_ticking(SchedulerState::Playing);
            },
            _ => {},
        }
    }

    fn pause(&mut self) {
        match self.state {
            SchedulerState::Playing => {
                self.set_state(SchedulerState::Paused);
                self.silence_remaining = SILENT_FRAME_COUNT;
            },
            SchedulerState::Buffering => {
                // Nothing has been sent yet; no tail owed.
                self.set_state(SchedulerState::Paused);
            },
            _ => {},
        }
    }

    fn stop(&mut self) {
        match self.state {
            SchedulerState::Playing => {
                self.set_state(SchedulerState::Idle);
                self.silence_remaining = SILENT_FRAME_COUNT;
            },
            SchedulerState::Idle => {},
            _ => {
                self.set_state(SchedulerState::Idle);
            },
        }

        self.buffered_ticks = 0;
        self.missed = 0;
    }

    /// Re-arms the deadline when ticking restarts, so a long suspension does
    /// not burst a backlog of stale ticks.
    fn resume_ticking(&mut self, state: SchedulerState) {
        self.deadline = Instant::now();
        self.set_state(state);
    }

    fn tick(&mut self) {
        self.deadline += TIMESTEP_LENGTH;

        if self.silence_remaining > 0 {
            self.silence_remaining -= 1;
            self.dispatch(SILENT_FRAME.to_vec());
            return;
        }

        match self.state {
            SchedulerState::Buffering => match self.source.next_frame() {
                Some(frame) => {
                    self.missed = 0;
                    self.set_state(SchedulerState::Playing);
                    self.dispatch(frame);
                },
                None => {
                    self.buffered_ticks += 1;
                    if self.buffered_ticks >= SCHEDULER_BUFFER_TICKS {
                        self.set_state(SchedulerState::Playing);
                    }
                },
            },
            SchedulerState::Playing => {
                if self.subscribers.is_empty() {
                    match self.behavior_on_empty {
                        EmptyBehavior::Pause => {
                            debug!("Subscriber set empty; auto-pausing.");
                            self.set_state(SchedulerState::AutoPaused);
                            return;
                        },
                        EmptyBehavior::Stop => {
                            debug!("Subscriber set empty; stopping.");
                            self.set_state(SchedulerState::Idle);
                            self.silence_remaining = SILENT_FRAME_COUNT;
                            return;
                        },
                        // Keep the producer's clock running for whoever else
                        // consumes it.
                        EmptyBehavior::Play => {},
                    }
                }

                match self.source.next_frame() {
                    Some(frame) => {
                        self.missed = 0;
                        self.dispatch(frame);
                    },
                    None => {
                        self.missed += 1;
                        if self.missed >= self.max_missed_frames {
                            warn!(
                                "Producer missed {} consecutive frames; pausing.",
                                self.missed
                            );
                            self.set_state(SchedulerState::Paused);
                            self.silence_remaining = SILENT_FRAME_COUNT;
                        }
                    },
                }
            },
            _ => {},
        }
    }

    fn dispatch(&self, frame: Vec<u8>) {
        for conn in &self.subscribers {
            let _ = conn.send_audio(frame.clone());
        }
    }

    fn set_state(&mut self, new: SchedulerState) {
        if self.state == new {
            return;
        }

        debug!("Scheduler state {:?} -> {:?}.", self.state, new);
        self.state = new;
        *self.shared.state.lock() = new;
    }
}

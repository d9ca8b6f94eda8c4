use std::time::Duration;

use label_scan_common::config::Config;
use label_scan_common::frame::{CaptureTrigger, FrameError, StillImage};
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::filter::{StabilityDetector, StabilityReport};
use crate::source::VideoSource;

use super::cancel::CancelToken;
use super::controller::{AutoCaptureController, CaptureAction, CaptureState};
use super::sampler::FrameSampler;

/// Operator requests delivered to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Capture the current frame now, bypassing the countdown.
    Capture,
}

#[derive(Debug)]
pub enum SessionOutcome {
    Captured(StillImage),
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to encode captured frame: {0}")]
    Encode(#[from] FrameError),
    /// The camera went away mid-session. Any countdown was abandoned.
    #[error("camera stream lost during scanning")]
    SourceLost,
}

/// One scanning session: sampling timer, stability window and countdown.
///
/// Everything runs on the task that calls [`run`](Self::run). The sampling
/// interval and the countdown interval are separate timers; dropping the
/// countdown never disturbs sampling.
pub struct ScanSession<S> {
    sampler: FrameSampler<S>,
    detector: StabilityDetector,
    controller: AutoCaptureController,
    sample_interval: Duration,
    countdown_tick: Duration,
    jpeg_quality: u8,
    last_report: StabilityReport,
}

impl<S: VideoSource> ScanSession<S> {
    pub fn new(source: S, config: &Config) -> Self {
        Self {
            sampler: FrameSampler::new(source),
            detector: StabilityDetector::from_config(&config.stability),
            controller: AutoCaptureController::new(config.capture.countdown_start),
            sample_interval: config.sampler.interval(),
            countdown_tick: config.capture.countdown_tick(),
            jpeg_quality: config.capture.jpeg_quality,
            last_report: StabilityReport::UNSTABLE,
        }
    }

    /// Begin a fresh session on a newly acquired source.
    ///
    /// The stability window and countdown start empty; nothing carries over
    /// from the previous capture.
    pub fn restart(&mut self, source: S) {
        self.sampler.stop();
        self.sampler = FrameSampler::new(source);
        self.detector.reset();
        self.controller.reset();
        self.last_report = StabilityReport::UNSTABLE;
    }

    /// Drive the session until a capture happens or `cancel` fires.
    ///
    /// The source is stopped on every exit path, exactly once.
    pub async fn run(
        &mut self,
        cancel: &CancelToken,
        commands: &mut mpsc::Receiver<SessionCommand>,
    ) -> Result<SessionOutcome, SessionError> {
        let outcome = self.drive(cancel, commands).await;
        self.sampler.stop();
        info!(
            observed = self.sampler.observed(),
            skipped = self.sampler.skipped(),
            similarity = format!("{:.3}", self.last_report.similarity),
            "scanning session ended"
        );
        outcome
    }

    async fn drive(
        &mut self,
        cancel: &CancelToken,
        commands: &mut mpsc::Receiver<SessionCommand>,
    ) -> Result<SessionOutcome, SessionError> {
        let mut sampling = interval(self.sample_interval);
        sampling.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut countdown: Option<Interval> = None;
        let mut commands_open = true;

        info!(
            interval_ms = self.sample_interval.as_millis() as u64,
            window = self.detector.window(),
            threshold = self.detector.threshold(),
            "scanning session started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("scanning session cancelled");
                    return Ok(SessionOutcome::Cancelled);
                }

                cmd = commands.recv(), if commands_open => match cmd {
                    Some(SessionCommand::Capture) => {
                        if let CaptureState::Counting { remaining } = self.controller.state() {
                            info!(remaining, "manual capture preempts countdown");
                        }
                        countdown = None;
                        self.controller.reset();
                        if let Some(still) = self.capture(CaptureTrigger::Manual)? {
                            return Ok(SessionOutcome::Captured(still));
                        }
                    }
                    None => commands_open = false,
                },

                _ = sampling.tick() => {
                    if !self.sampler.is_live() {
                        return Err(self.source_lost(countdown.take()));
                    }
                    let Some(frame) = self.sampler.sample() else {
                        continue;
                    };
                    let report = self.detector.observe(frame);
                    self.last_report = report;
                    match self.controller.on_report(report.is_stable) {
                        CaptureAction::StartCountdown => {
                            let mut tick = interval_at(Instant::now() + self.countdown_tick, self.countdown_tick);
                            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            countdown = Some(tick);
                        }
                        CaptureAction::CancelCountdown => countdown = None,
                        CaptureAction::None | CaptureAction::Capture => {}
                    }
                }

                _ = next_tick(&mut countdown) => {
                    if !self.sampler.is_live() {
                        return Err(self.source_lost(countdown.take()));
                    }
                    if self.controller.on_second() == CaptureAction::Capture {
                        countdown = None;
                        if let Some(still) = self.capture(CaptureTrigger::Auto)? {
                            return Ok(SessionOutcome::Captured(still));
                        }
                    } else {
                        info!(remaining = self.controller.remaining(), "auto-capture countdown");
                    }
                }
            }
        }
    }

    /// Abandon the countdown after the source died under us.
    fn source_lost(&mut self, countdown: Option<Interval>) -> SessionError {
        warn!(
            counting = countdown.is_some(),
            remaining = self.controller.remaining(),
            "camera stream lost, abandoning session"
        );
        drop(countdown);
        self.controller.reset();
        SessionError::SourceLost
    }

    /// Encode the last frame and stop the source.
    ///
    /// A trigger that arrives after the source has stopped, or before any
    /// frame was sampled, is ignored.
    fn capture(&mut self, trigger: CaptureTrigger) -> Result<Option<StillImage>, SessionError> {
        if !self.sampler.is_live() {
            debug!(trigger = trigger.as_str(), "capture trigger after source stopped, ignoring");
            return Ok(None);
        }
        if self.sampler.frame().is_empty() {
            warn!(trigger = trigger.as_str(), "capture requested before any frame arrived");
            return Ok(None);
        }

        let still = self.sampler.snapshot(self.jpeg_quality, trigger)?;
        self.sampler.stop();
        info!(
            trigger = trigger.as_str(),
            width = still.width,
            height = still.height,
            bytes = still.jpeg.len(),
            similarity = format!("{:.3}", self.last_report.similarity),
            "frame captured"
        );
        Ok(Some(still))
    }
}

/// Next countdown tick, or never when no countdown is armed.
async fn next_tick(countdown: &mut Option<Interval>) {
    match countdown {
        Some(tick) => {
            tick.tick().await;
        }
        None => std::future::pending().await,
    }
}

use tracing::{debug, info};

/// Countdown state of the auto-capture controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Waiting for the image to settle.
    Idle,
    /// Image is stable; capture fires when `remaining` reaches zero.
    Counting { remaining: u32 },
}

/// What the session must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureAction {
    None,
    /// Arm the one-second countdown timer.
    StartCountdown,
    /// Drop the countdown timer; the countdown is abandoned, not paused.
    CancelCountdown,
    /// Fire the capture trigger. Emitted at most once per countdown.
    Capture,
}

/// Stability-gated countdown.
///
/// Two inputs drive it: [`on_report`](Self::on_report) once per sampling
/// tick and [`on_second`](Self::on_second) once per countdown tick. The two
/// cadences are independent; only one countdown is ever active and a new one
/// can only start from `Idle`.
#[derive(Debug, Clone)]
pub struct AutoCaptureController {
    state: CaptureState,
    countdown_start: u32,
}

impl AutoCaptureController {
    pub fn new(countdown_start: u32) -> Self {
        Self {
            state: CaptureState::Idle,
            countdown_start: countdown_start.max(1),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Seconds left on the active countdown, 0 when idle.
    pub fn remaining(&self) -> u32 {
        match self.state {
            CaptureState::Idle => 0,
            CaptureState::Counting { remaining } => remaining,
        }
    }

    /// Feed the latest stability decision.
    pub fn on_report(&mut self, is_stable: bool) -> CaptureAction {
        match (self.state, is_stable) {
            (CaptureState::Idle, true) => {
                info!(countdown = self.countdown_start, "IDLE→COUNTING: image stable");
                self.state = CaptureState::Counting {
                    remaining: self.countdown_start,
                };
                CaptureAction::StartCountdown
            }
            (CaptureState::Counting { remaining }, false) => {
                info!(remaining, "COUNTING→IDLE: image moved, countdown cancelled");
                self.state = CaptureState::Idle;
                CaptureAction::CancelCountdown
            }
            _ => CaptureAction::None,
        }
    }

    /// Advance the countdown by one tick.
    ///
    /// A tick that arrives while idle is stale (its timer was cancelled after
    /// it was already due) and is ignored.
    pub fn on_second(&mut self) -> CaptureAction {
        match self.state {
            CaptureState::Idle => {
                debug!("countdown tick while idle, ignoring");
                CaptureAction::None
            }
            CaptureState::Counting { remaining } => {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    info!("COUNTING→IDLE: countdown finished, capturing");
                    self.state = CaptureState::Idle;
                    CaptureAction::Capture
                } else {
                    debug!(remaining, "COUNTING: tick");
                    self.state = CaptureState::Counting { remaining };
                    CaptureAction::None
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
    }
}

impl Default for AutoCaptureController {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let ctl = AutoCaptureController::default();
        assert_eq!(ctl.state(), CaptureState::Idle);
        assert_eq!(ctl.remaining(), 0);
    }

    #[test]
    fn three_stable_seconds_capture_exactly_once() {
        let mut ctl = AutoCaptureController::default();
        assert_eq!(ctl.on_report(true), CaptureAction::StartCountdown);
        assert_eq!(ctl.remaining(), 3);

        let mut captures = 0;
        for _ in 0..3 {
            // Sampling keeps reporting stable between countdown ticks.
            assert_eq!(ctl.on_report(true), CaptureAction::None);
            if ctl.on_second() == CaptureAction::Capture {
                captures += 1;
            }
        }
        assert_eq!(captures, 1);
        assert_eq!(ctl.state(), CaptureState::Idle);
    }

    #[test]
    fn unstable_before_zero_cancels_without_capture() {
        let mut ctl = AutoCaptureController::default();
        ctl.on_report(true);
        assert_eq!(ctl.on_second(), CaptureAction::None);
        assert_eq!(ctl.remaining(), 2);
        assert_eq!(ctl.on_report(false), CaptureAction::CancelCountdown);
        assert_eq!(ctl.state(), CaptureState::Idle);

        // A tick that was already due when the timer was dropped is stale.
        assert_eq!(ctl.on_second(), CaptureAction::None);
        assert_eq!(ctl.state(), CaptureState::Idle);
    }

    #[test]
    fn restarting_after_cancel_begins_from_the_top() {
        let mut ctl = AutoCaptureController::default();
        ctl.on_report(true);
        ctl.on_second();
        ctl.on_second();
        ctl.on_report(false);
        assert_eq!(ctl.on_report(true), CaptureAction::StartCountdown);
        assert_eq!(ctl.remaining(), 3);
    }

    #[test]
    fn unstable_while_idle_is_a_no_op() {
        let mut ctl = AutoCaptureController::default();
        assert_eq!(ctl.on_report(false), CaptureAction::None);
        assert_eq!(ctl.state(), CaptureState::Idle);
    }

    #[test]
    fn stable_while_counting_does_not_restart() {
        let mut ctl = AutoCaptureController::default();
        ctl.on_report(true);
        ctl.on_second();
        assert_eq!(ctl.on_report(true), CaptureAction::None);
        assert_eq!(ctl.remaining(), 2);
    }

    #[test]
    fn custom_start_value() {
        let mut ctl = AutoCaptureController::new(1);
        ctl.on_report(true);
        assert_eq!(ctl.on_second(), CaptureAction::Capture);
    }

    #[test]
    fn reset_abandons_countdown() {
        let mut ctl = AutoCaptureController::default();
        ctl.on_report(true);
        ctl.reset();
        assert_eq!(ctl.state(), CaptureState::Idle);
        assert_eq!(ctl.on_second(), CaptureAction::None);
    }
}

use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::{elapsed_ms, Clock, SystemClock};

/// Stage of a single exercise item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Question,
    Options,
    Processing,
    Result,
}

/// Durations for one exercise kind. A controller keeps its config for life;
/// build a new controller to change it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowConfig {
    pub question_duration: Duration,
    pub options_duration: Duration,
    pub result_duration: Duration,
}

impl FlowConfig {
    pub fn from_millis(question_ms: u64, options_ms: u64, result_ms: u64) -> Self {
        Self {
            question_duration: Duration::from_millis(question_ms),
            options_duration: Duration::from_millis(options_ms),
            result_duration: Duration::from_millis(result_ms),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Enter the options phase without starting its countdown; the caller
    /// starts it later with `start_options_countdown`.
    pub delay_options_countdown: bool,
    /// Arm the question countdown without starting it; the caller starts it
    /// later with `start_question_countdown` (e.g. when audio finishes).
    pub delay_question_countdown: bool,
}

/// What happens when the options countdown runs out
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Straight to the result phase with a `-1` selection
    #[default]
    EnterResult,
    /// Into processing, for answers that need asynchronous grading
    EnterProcessing,
    /// Only tell listeners; the caller decides
    Notify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CountdownEnd {
    QuestionElapsed,
    OptionsTimeout(TimeoutAction),
}

#[derive(Clone, Copy, Debug)]
enum Timer {
    Countdown {
        started_at: Instant,
        duration: Duration,
        on_end: CountdownEnd,
    },
    ResultTimeout {
        started_at: Instant,
        duration: Duration,
    },
}

/// A countdown that is known but not ticking: either armed and waiting for
/// an external trigger, or frozen by `pause`.
#[derive(Clone, Copy, Debug)]
struct HeldCountdown {
    duration: Duration,
    on_end: CountdownEnd,
}

/// Observable state read by the presentation layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowState {
    pub phase: Phase,
    pub remaining_ms: u64,
    /// `None` unanswered, `Some(-1)` timed out, otherwise the chosen option
    pub selected_index: Option<i32>,
    pub is_paused: bool,
}

impl FlowState {
    pub fn is_answered(&self) -> bool {
        self.selected_index.is_some()
    }

    pub fn timed_out(&self) -> bool {
        self.selected_index == Some(-1)
    }
}

/// Subscriber for controller notifications. Every method defaults to a no-op.
pub trait FlowListener {
    fn question_shown(&mut self) {}
    fn answer_phase_started(&mut self) {}
    /// Options countdown ran out with `TimeoutAction::Notify`
    fn options_timed_out(&mut self) {}
    /// Result phase finished; time to move to the next item
    fn completed(&mut self) {}
    fn state_changed(&mut self, _state: &FlowState) {}
}

/// Notifications as plain values, for listeners that live across a channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowSignal {
    QuestionShown,
    AnswerPhaseStarted,
    OptionsTimedOut,
    Completed,
    StateChanged(FlowState),
}

/// Forwards every notification over an mpsc channel
pub struct ChannelListener {
    tx: Sender<FlowSignal>,
    with_state: bool,
}

impl ChannelListener {
    pub fn new(tx: Sender<FlowSignal>) -> Self {
        Self {
            tx,
            with_state: true,
        }
    }

    /// Skip `StateChanged` signals; they arrive on every tick
    pub fn events_only(tx: Sender<FlowSignal>) -> Self {
        Self {
            tx,
            with_state: false,
        }
    }

    fn send(&self, signal: FlowSignal) {
        // receiver gone means nobody is listening anymore
        let _ = self.tx.send(signal);
    }
}

impl FlowListener for ChannelListener {
    fn question_shown(&mut self) {
        self.send(FlowSignal::QuestionShown);
    }

    fn answer_phase_started(&mut self) {
        self.send(FlowSignal::AnswerPhaseStarted);
    }

    fn options_timed_out(&mut self) {
        self.send(FlowSignal::OptionsTimedOut);
    }

    fn completed(&mut self) {
        self.send(FlowSignal::Completed);
    }

    fn state_changed(&mut self, state: &FlowState) {
        if self.with_state {
            self.send(FlowSignal::StateChanged(*state));
        }
    }
}

/// Drives one exercise item at a time through question, options, optional
/// processing and result phases.
///
/// The controller never schedules anything itself: the host calls [`tick`]
/// on a fixed interval and every deadline is evaluated against the
/// controller's [`Clock`]. At most one timer is live at any moment, and
/// starting a countdown always replaces the previous one.
///
/// Misuse (answering twice, calling a phase-specific operation in another
/// phase) is ignored. Each operation returns whether it was accepted.
///
/// [`tick`]: ExerciseFlowController::tick
pub struct ExerciseFlowController<C: Clock = SystemClock> {
    config: FlowConfig,
    clock: C,
    state: FlowState,
    timer: Option<Timer>,
    pending: Option<HeldCountdown>,
    paused_countdown: Option<HeldCountdown>,
    paused_result: Option<Duration>,
    delay_options_countdown: bool,
    options_started_at: Option<Instant>,
    response_time_ms: Option<u64>,
    listeners: Vec<Box<dyn FlowListener>>,
}

impl ExerciseFlowController<SystemClock> {
    pub fn new(config: FlowConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> ExerciseFlowController<C> {
    pub fn with_clock(config: FlowConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            state: FlowState::default(),
            timer: None,
            pending: None,
            paused_countdown: None,
            paused_result: None,
            delay_options_countdown: false,
            options_started_at: None,
            response_time_ms: None,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn remaining_ms(&self) -> u64 {
        self.state.remaining_ms
    }

    pub fn selected_index(&self) -> Option<i32> {
        self.state.selected_index
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused
    }

    pub fn response_time_ms(&self) -> Option<u64> {
        self.response_time_ms
    }

    /// True while a countdown or result timeout is ticking
    pub fn has_running_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// True while a deferred question countdown waits for its trigger
    pub fn has_pending_countdown(&self) -> bool {
        self.pending.is_some()
    }

    pub fn subscribe(&mut self, listener: Box<dyn FlowListener>) {
        self.listeners.push(listener);
    }

    /// Begin a new cycle in the question phase
    pub fn start(&mut self, options: StartOptions) -> bool {
        self.cancel_timers();
        self.pending = None;
        self.state.selected_index = None;
        self.response_time_ms = None;
        self.options_started_at = None;
        self.delay_options_countdown = options.delay_options_countdown;
        self.set_phase(Phase::Question);
        self.emit(|l| l.question_shown());

        let question = HeldCountdown {
            duration: self.config.question_duration,
            on_end: CountdownEnd::QuestionElapsed,
        };
        if options.delay_question_countdown {
            // show the full duration while waiting for the trigger
            self.state.remaining_ms = as_ms(question.duration);
            self.pending = Some(question);
        } else {
            self.start_countdown(question.duration, question.on_end);
        }
        self.publish();
        true
    }

    /// Start the question countdown armed by `delay_question_countdown`
    pub fn start_question_countdown(&mut self) -> bool {
        let Some(held) = self.pending.take() else {
            return false;
        };
        self.start_countdown(held.duration, held.on_end);
        self.publish();
        true
    }

    /// Start (or restart) the options countdown. Only valid in the options
    /// phase; `on_timeout` defaults to a `-1` result.
    pub fn start_options_countdown(&mut self, on_timeout: Option<TimeoutAction>) -> bool {
        if self.state.phase != Phase::Options {
            return false;
        }
        self.options_started_at = Some(self.clock.now());
        self.start_countdown(
            self.config.options_duration,
            CountdownEnd::OptionsTimeout(on_timeout.unwrap_or_default()),
        );
        self.publish();
        true
    }

    /// User picked an option. Ignored outside the options phase or once an
    /// answer is recorded.
    pub fn select(&mut self, index: i32, skip_result_timeout: bool) -> bool {
        if self.state.phase != Phase::Options || self.state.is_answered() {
            return false;
        }
        self.enter_result(index, skip_result_timeout)
    }

    /// Hold the item while an answer is graded asynchronously. Only accepted
    /// from the options phase: a question still on screen or an answer
    /// already shown has nothing left to grade, and a repeat call while
    /// processing is ignored.
    pub fn enter_processing(&mut self) -> bool {
        if self.state.phase != Phase::Options {
            return false;
        }
        self.cancel_timers();
        self.capture_response_time();
        self.set_phase(Phase::Processing);
        self.publish();
        true
    }

    /// Record the answer and show the result. Unlike `select` this has no
    /// phase guard, so graded answers can arrive from processing.
    pub fn enter_result(&mut self, index: i32, skip_result_timeout: bool) -> bool {
        if self.state.is_answered() {
            return false;
        }
        self.cancel_timers();
        self.pending = None;
        self.state.selected_index = Some(index);
        self.capture_response_time();
        self.set_phase(Phase::Result);
        if !skip_result_timeout {
            self.start_result_timer(self.config.result_duration);
        }
        self.publish();
        true
    }

    /// Start the result timeout skipped by `enter_result`/`select`
    pub fn start_result_timeout(&mut self) -> bool {
        if self.state.phase != Phase::Result {
            return false;
        }
        self.start_result_timer(self.config.result_duration);
        self.publish();
        true
    }

    /// Rewrite the shown selection once a late grading outcome arrives
    pub fn update_selected_index(&mut self, index: i32) -> bool {
        if self.state.phase != Phase::Result {
            return false;
        }
        self.state.selected_index = Some(index);
        self.publish();
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state.is_paused {
            return false;
        }
        let now = self.clock.now();
        match self.timer.take() {
            Some(Timer::Countdown {
                started_at,
                duration,
                on_end,
            }) => {
                let remaining = remaining_at(started_at, duration, now);
                self.state.remaining_ms = as_ms(remaining);
                self.paused_countdown = Some(HeldCountdown {
                    duration: remaining,
                    on_end,
                });
            }
            Some(Timer::ResultTimeout {
                started_at,
                duration,
            }) => {
                self.paused_result = Some(remaining_at(started_at, duration, now));
            }
            None => {}
        }
        self.state.is_paused = true;
        debug!(phase = %self.state.phase, "flow paused");
        self.publish();
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.state.is_paused {
            return false;
        }
        self.state.is_paused = false;
        debug!(phase = %self.state.phase, "flow resumed");
        let now = self.clock.now();

        if let Some(remaining) = self.paused_result.take() {
            self.paused_countdown = None;
            if remaining.is_zero() {
                self.complete();
            } else {
                self.timer = Some(Timer::ResultTimeout {
                    started_at: now,
                    duration: remaining,
                });
            }
        } else if let Some(held) = self.paused_countdown.take() {
            if held.duration.is_zero() {
                self.state.remaining_ms = 0;
                self.fire(held.on_end);
            } else {
                self.timer = Some(Timer::Countdown {
                    started_at: now,
                    duration: held.duration,
                    on_end: held.on_end,
                });
            }
        }
        self.publish();
        true
    }

    /// Back to idle with every bit of bookkeeping dropped
    pub fn reset(&mut self) {
        self.cancel_timers();
        self.pending = None;
        self.delay_options_countdown = false;
        self.options_started_at = None;
        self.response_time_ms = None;
        self.state = FlowState::default();
        debug!("flow reset");
        self.publish();
    }

    /// Advance the live timer against the clock. Call on every UI tick.
    pub fn tick(&mut self) {
        if self.state.is_paused {
            return;
        }
        let Some(timer) = self.timer else {
            return;
        };
        let now = self.clock.now();
        match timer {
            Timer::Countdown {
                started_at,
                duration,
                on_end,
            } => {
                let remaining = remaining_at(started_at, duration, now);
                self.state.remaining_ms = as_ms(remaining);
                if remaining.is_zero() {
                    self.timer = None;
                    self.fire(on_end);
                }
                self.publish();
            }
            Timer::ResultTimeout {
                started_at,
                duration,
            } => {
                if remaining_at(started_at, duration, now).is_zero() {
                    self.timer = None;
                    self.complete();
                }
            }
        }
    }

    fn fire(&mut self, on_end: CountdownEnd) {
        match on_end {
            CountdownEnd::QuestionElapsed => self.enter_options(),
            CountdownEnd::OptionsTimeout(TimeoutAction::EnterResult) => {
                self.enter_result(-1, false);
            }
            CountdownEnd::OptionsTimeout(TimeoutAction::EnterProcessing) => {
                self.enter_processing();
            }
            CountdownEnd::OptionsTimeout(TimeoutAction::Notify) => {
                self.emit(|l| l.options_timed_out());
            }
        }
    }

    fn enter_options(&mut self) {
        self.options_started_at = Some(self.clock.now());
        self.set_phase(Phase::Options);
        self.emit(|l| l.answer_phase_started());
        if self.delay_options_countdown {
            self.state.remaining_ms = as_ms(self.config.options_duration);
        } else {
            self.start_countdown(
                self.config.options_duration,
                CountdownEnd::OptionsTimeout(TimeoutAction::EnterResult),
            );
        }
    }

    fn complete(&mut self) {
        debug!(selected = ?self.state.selected_index, "result phase complete");
        self.emit(|l| l.completed());
    }

    fn start_countdown(&mut self, duration: Duration, on_end: CountdownEnd) {
        self.cancel_timers();
        self.state.remaining_ms = as_ms(duration);
        if self.state.is_paused {
            // held until resume so the overlay never sees it tick
            self.paused_countdown = Some(HeldCountdown { duration, on_end });
        } else {
            self.timer = Some(Timer::Countdown {
                started_at: self.clock.now(),
                duration,
                on_end,
            });
        }
    }

    fn start_result_timer(&mut self, duration: Duration) {
        self.cancel_timers();
        if self.state.is_paused {
            self.paused_result = Some(duration);
        } else {
            self.timer = Some(Timer::ResultTimeout {
                started_at: self.clock.now(),
                duration,
            });
        }
    }

    fn cancel_timers(&mut self) {
        self.timer = None;
        self.paused_countdown = None;
        self.paused_result = None;
    }

    fn capture_response_time(&mut self) {
        if self.response_time_ms.is_some() {
            return;
        }
        if let Some(started_at) = self.options_started_at {
            self.response_time_ms = Some(elapsed_ms(started_at, self.clock.now()));
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!(from = %self.state.phase, to = %phase, "flow phase change");
        self.state.phase = phase;
    }

    fn emit(&mut self, mut f: impl FnMut(&mut dyn FlowListener)) {
        for listener in self.listeners.iter_mut() {
            f(listener.as_mut());
        }
    }

    fn publish(&mut self) {
        let state = self.state;
        self.emit(|l| l.state_changed(&state));
    }
}

fn remaining_at(started_at: Instant, duration: Duration, now: Instant) -> Duration {
    duration.saturating_sub(now.saturating_duration_since(started_at))
}

fn as_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

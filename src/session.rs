use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::answers::{AnswerError, AnswerRecord, AnswerSink, SessionSummary};
use crate::clock::Clock;
use crate::config::Config;
use crate::deck::{DeckError, SessionSource};
use crate::exercise::{ExerciseItem, ExerciseKind, SessionKind};
use crate::flow::{
    ChannelListener, ExerciseFlowController, FlowSignal, FlowState, Phase, StartOptions,
    TimeoutAction,
};
use crate::runtime::Tickable;
use crate::speech::{ExactGrader, Playback, SpeechGrader, SpeechPlayer};

/// A spoken answer waiting on the grader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingGrade {
    spoken: i32,
    ready_at: Instant,
}

/// Walks a session's items through the flow controllers, one per exercise
/// kind, and records every answer.
pub struct Session<C: Clock + Clone, A: AnswerSink, P: SpeechPlayer> {
    kind: SessionKind,
    items: Vec<ExerciseItem>,
    position: usize,
    flows: Vec<ExerciseFlowController<C>>,
    signals: Receiver<FlowSignal>,
    clock: C,
    sink: A,
    player: P,
    grader: Box<dyn SpeechGrader>,
    grading_delay: Duration,
    playback: Option<Playback>,
    grading: Option<PendingGrade>,
    recording: bool,
    records: Vec<AnswerRecord>,
    started: bool,
}

fn slot(kind: ExerciseKind) -> usize {
    match kind {
        ExerciseKind::Reading => 0,
        ExerciseKind::Listening => 1,
        ExerciseKind::Speaking => 2,
    }
}

impl<C: Clock + Clone, A: AnswerSink, P: SpeechPlayer> Session<C, A, P> {
    pub fn new(
        kind: SessionKind,
        items: Vec<ExerciseItem>,
        config: &Config,
        clock: C,
        sink: A,
        player: P,
    ) -> Self {
        let (tx, signals) = mpsc::channel();
        let flows = ExerciseKind::ALL
            .iter()
            .map(|k| {
                let mut flow = ExerciseFlowController::with_clock(config.flow_config(*k), clock.clone());
                flow.subscribe(Box::new(ChannelListener::events_only(tx.clone())));
                flow
            })
            .collect();

        Self {
            kind,
            items,
            position: 0,
            flows,
            signals,
            clock,
            sink,
            player,
            grader: Box::new(ExactGrader),
            grading_delay: Duration::from_millis(config.grading_delay_ms),
            playback: None,
            grading: None,
            recording: false,
            records: Vec::new(),
            started: false,
        }
    }

    /// Build a session from whatever the source hands out for `kind`
    pub fn load<S: SessionSource + ?Sized>(
        source: &S,
        kind: SessionKind,
        config: &Config,
        clock: C,
        sink: A,
        player: P,
    ) -> Result<Self, DeckError> {
        let items = source.load(kind)?;
        Ok(Self::new(kind, items, config, clock, sink, player))
    }

    pub fn with_grader(mut self, grader: Box<dyn SpeechGrader>) -> Self {
        self.grader = grader;
        self
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Zero-based index of the item on screen
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Option<&ExerciseItem> {
        self.items.get(self.position)
    }

    pub fn flow_state(&self) -> FlowState {
        self.current()
            .map(|item| self.flows[slot(item.kind)].state())
            .unwrap_or_default()
    }

    /// Full length of the countdown belonging to the current phase. The
    /// result phase has a timeout but no countdown, so it reports zero.
    pub fn phase_duration(&self) -> Duration {
        let Some(item) = self.current() else {
            return Duration::ZERO;
        };
        let flow = &self.flows[slot(item.kind)];
        let config = flow.config();
        match flow.phase() {
            Phase::Question => config.question_duration,
            Phase::Options => config.options_duration,
            Phase::Idle | Phase::Processing | Phase::Result => Duration::ZERO,
        }
    }

    pub fn response_time_ms(&self) -> Option<u64> {
        self.current()
            .and_then(|item| self.flows[slot(item.kind)].response_time_ms())
    }

    pub fn is_finished(&self) -> bool {
        self.started && self.position >= self.items.len()
    }

    /// Listening item still playing its audio
    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    /// Speaking item with the recorder running
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_grading(&self) -> bool {
        self.grading.is_some()
    }

    pub fn records(&self) -> &[AnswerRecord] {
        &self.records
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from_records(&self.records)
    }

    /// Start the first item
    pub fn begin(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(kind = %self.kind, items = self.items.len(), "session started");
        self.begin_item();
    }

    /// Learner picked option `index` (or, for speaking, said it)
    pub fn choose(&mut self, index: usize) -> bool {
        let Some(item) = self.current() else {
            return false;
        };
        if index >= item.options.len() {
            return false;
        }
        let kind = item.kind;
        let choice = index as i32;

        match kind {
            ExerciseKind::Reading | ExerciseKind::Listening => self.flow_mut(kind).select(choice, false),
            ExerciseKind::Speaking => {
                if !self.recording || !self.flow_mut(kind).enter_processing() {
                    return false;
                }
                self.recording = false;
                self.grading = Some(PendingGrade {
                    spoken: choice,
                    ready_at: self.clock.now() + self.grading_delay,
                });
                true
            }
        }
    }

    /// Recorder is ready: start the speaking item's answer countdown
    pub fn start_recording(&mut self) -> bool {
        let Some(kind) = self.current().map(|item| item.kind) else {
            return false;
        };
        if kind != ExerciseKind::Speaking || self.recording {
            return false;
        }
        let started = self
            .flow_mut(kind)
            .start_options_countdown(Some(TimeoutAction::EnterProcessing));
        self.recording = started;
        started
    }

    /// Tutorial overlay opened
    pub fn pause(&mut self) -> bool {
        match self.current().map(|item| item.kind) {
            Some(kind) => self.flow_mut(kind).pause(),
            None => false,
        }
    }

    pub fn resume(&mut self) -> bool {
        match self.current().map(|item| item.kind) {
            Some(kind) => self.flow_mut(kind).resume(),
            None => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.flow_state().is_paused
    }

    /// Submit the recorded answers
    pub fn finish(&mut self) -> Result<SessionSummary, AnswerError> {
        let submitted = self.sink.submit()?;
        let summary = self.summary();
        info!(
            submitted,
            correct = summary.correct,
            total = summary.total,
            "session finished"
        );
        Ok(summary)
    }

    fn flow_mut(&mut self, kind: ExerciseKind) -> &mut ExerciseFlowController<C> {
        &mut self.flows[slot(kind)]
    }

    fn begin_item(&mut self) {
        self.playback = None;
        self.grading = None;
        self.recording = false;

        let Some(item) = self.items.get(self.position) else {
            return;
        };
        let kind = item.kind;
        debug!(position = self.position, word = %item.word, %kind, "item started");

        match kind {
            ExerciseKind::Reading => {
                self.flow_mut(kind).start(StartOptions::default());
            }
            ExerciseKind::Listening => {
                let (word, audio_url) = (item.word.clone(), item.audio_url.clone());
                self.flow_mut(kind).start(StartOptions {
                    delay_question_countdown: true,
                    ..Default::default()
                });
                match self.player.speak(&word, audio_url.as_deref()) {
                    Ok(playback) => self.playback = Some(playback),
                    Err(err) => {
                        warn!(%err, %word, "could not play item audio");
                        self.flow_mut(kind).start_question_countdown();
                    }
                }
            }
            ExerciseKind::Speaking => {
                self.flow_mut(kind).start(StartOptions {
                    delay_options_countdown: true,
                    ..Default::default()
                });
            }
        }
        self.drain_signals();
    }

    fn poll_playback(&mut self, kind: ExerciseKind) {
        let now = self.clock.now();
        if self.playback.is_some_and(|p| p.is_finished(now)) {
            self.playback = None;
            self.flow_mut(kind).start_question_countdown();
        }
    }

    fn poll_grading(&mut self, kind: ExerciseKind) {
        let flow = &self.flows[slot(kind)];
        if flow.phase() == Phase::Processing && self.grading.is_none() {
            // recorder timed out with nothing said
            self.recording = false;
            self.grading = Some(PendingGrade {
                spoken: -1,
                ready_at: self.clock.now() + self.grading_delay,
            });
        }

        let Some(pending) = self.grading else {
            return;
        };
        if self.clock.now() < pending.ready_at {
            return;
        }
        self.grading = None;

        let options = match self.current() {
            Some(item) => item.options.clone(),
            None => return,
        };
        let heard = self.grader.grade(pending.spoken, &options);
        let flow = self.flow_mut(kind);
        flow.enter_result(pending.spoken, true);
        if heard != pending.spoken {
            flow.update_selected_index(heard);
        }
        flow.start_result_timeout();
    }

    /// A speaking item whose recorder never starts still times out after
    /// the options duration; `start_recording` restarts the countdown.
    fn arm_recorder_grace(&mut self) {
        let Some(kind) = self.current().map(|item| item.kind) else {
            return;
        };
        if kind == ExerciseKind::Speaking && !self.recording {
            self.flow_mut(kind)
                .start_options_countdown(Some(TimeoutAction::EnterResult));
        }
    }

    fn drain_signals(&mut self) {
        while let Ok(signal) = self.signals.try_recv() {
            match signal {
                FlowSignal::Completed => self.advance(),
                FlowSignal::AnswerPhaseStarted => {
                    debug!(?signal, position = self.position, "flow signal");
                    self.arm_recorder_grace();
                }
                FlowSignal::QuestionShown => {
                    debug!(?signal, position = self.position, "flow signal");
                }
                FlowSignal::OptionsTimedOut | FlowSignal::StateChanged(_) => {}
            }
        }
    }

    fn advance(&mut self) {
        let Some(item) = self.items.get(self.position) else {
            return;
        };
        let flow = &self.flows[slot(item.kind)];
        let selected_index = flow.selected_index().unwrap_or(-1);
        let record = AnswerRecord {
            word: item.word.clone(),
            kind: item.kind,
            session: self.kind,
            selected_index,
            correct: item.is_correct(selected_index),
            response_time_ms: flow.response_time_ms(),
            answered_at: Local::now(),
        };
        debug!(word = %record.word, correct = record.correct, "answer recorded");
        self.records.push(record.clone());
        self.sink.record(record);

        let kind = item.kind;
        self.flow_mut(kind).reset();
        self.position += 1;
        self.begin_item();
    }
}

impl<C: Clock + Clone, A: AnswerSink, P: SpeechPlayer> Tickable for Session<C, A, P> {
    fn tick(&mut self) {
        let Some(kind) = self.current().map(|item| item.kind) else {
            return;
        };
        match kind {
            ExerciseKind::Listening => self.poll_playback(kind),
            ExerciseKind::Speaking => self.poll_grading(kind),
            ExerciseKind::Reading => {}
        }
        self.flow_mut(kind).tick();
        if kind == ExerciseKind::Speaking {
            // a recorder timeout lands in processing during this tick
            self.poll_grading(kind);
        }
        self.drain_signals();
    }
}

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::clock::Clock;
use crate::flow::ExerciseFlowController;

/// Interval at which flow countdowns are refreshed for display
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Unified event type consumed by the drill loop
#[derive(Clone, Debug)]
pub enum FlowEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Anything that moves forward on the tick stream
pub trait Tickable {
    fn tick(&mut self);
}

impl<C: Clock> Tickable for ExerciseFlowController<C> {
    fn tick(&mut self) {
        ExerciseFlowController::tick(self);
    }
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait FlowEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<FlowEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<FlowEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if tx.send(FlowEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if tx.send(FlowEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<FlowEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(TICK_INTERVAL)
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<FlowEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<FlowEvent>) -> Self {
        Self { rx }
    }
}

impl FlowEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<FlowEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the drill one event/tick at a time
pub struct Runner<E: FlowEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: FlowEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> FlowEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => FlowEvent::Tick,
        }
    }

    /// Step once, feeding ticks to `target`. Anything else goes back to the
    /// caller for key handling or redraws.
    pub fn pump<X: Tickable + ?Sized>(&self, target: &mut X) -> Option<FlowEvent> {
        match self.step() {
            FlowEvent::Tick => {
                target.tick();
                None
            }
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        let ev = runner.step();
        match ev {
            FlowEvent::Tick => {}
            _ => panic!("expected Tick on timeout"),
        }
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(FlowEvent::Resize).unwrap();
        let es = TestEventSource::new(rx);
        let runner = Runner::new(es, FixedTicker::default());

        match runner.step() {
            FlowEvent::Resize => {}
            _ => panic!("expected Resize event"),
        }
    }

    #[test]
    fn pump_ticks_the_flow_and_returns_keys() {
        use crate::flow::{FlowConfig, Phase, StartOptions};
        use crossterm::event::{KeyCode, KeyModifiers};

        let (tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(1)));
        let mut flow = ExerciseFlowController::new(FlowConfig::from_millis(0, 10_000, 1_000));
        flow.start(StartOptions::default());

        assert!(runner.pump(&mut flow).is_none());
        assert_eq!(flow.phase(), Phase::Options);

        tx.send(FlowEvent::Key(KeyEvent::new(KeyCode::Char('1'), KeyModifiers::NONE)))
            .unwrap();
        match runner.pump(&mut flow) {
            Some(FlowEvent::Key(key)) => assert_eq!(key.code, KeyCode::Char('1')),
            other => panic!("expected key event, got {other:?}"),
        }
    }

    #[test]
    fn default_ticker_matches_flow_interval() {
        assert_eq!(FixedTicker::default().interval(), Duration::from_millis(50));
    }
}

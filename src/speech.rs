use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

use crate::clock::Clock;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpeechError {
    #[error("no recorded audio for '{0}'")]
    NoAudio(String),
    #[error("playback failed: {0}")]
    Playback(String),
}

/// A running playback. Callers poll it; nothing is pushed back to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    started_at: Instant,
    duration: Duration,
}

impl Playback {
    pub fn new(started_at: Instant, duration: Duration) -> Self {
        Self {
            started_at,
            duration,
        }
    }

    pub fn ends_at(&self) -> Instant {
        self.started_at + self.duration
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now >= self.ends_at()
    }
}

/// Vocalizes a word or sentence
pub trait SpeechPlayer {
    fn speak(&mut self, text: &str, audio_url: Option<&str>) -> Result<Playback, SpeechError>;
}

/// Plays recorded clips. Items without an audio url fail.
#[derive(Debug, Clone)]
pub struct ClipPlayer<C: Clock> {
    clock: C,
    clip_length: Duration,
}

impl<C: Clock> ClipPlayer<C> {
    pub fn new(clock: C, clip_length: Duration) -> Self {
        Self { clock, clip_length }
    }
}

impl<C: Clock> SpeechPlayer for ClipPlayer<C> {
    fn speak(&mut self, text: &str, audio_url: Option<&str>) -> Result<Playback, SpeechError> {
        match audio_url {
            Some(url) if !url.trim().is_empty() => {
                Ok(Playback::new(self.clock.now(), self.clip_length))
            }
            _ => Err(SpeechError::NoAudio(text.to_string())),
        }
    }
}

/// Text-to-speech stand-in; takes longer for longer text
#[derive(Debug, Clone)]
pub struct SimulatedTts<C: Clock> {
    clock: C,
    per_char: Duration,
    minimum: Duration,
}

impl<C: Clock> SimulatedTts<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            per_char: Duration::from_millis(60),
            minimum: Duration::from_millis(400),
        }
    }

    pub fn estimate(&self, text: &str) -> Duration {
        let chars = text.chars().count() as u32;
        (self.per_char * chars).max(self.minimum)
    }
}

impl<C: Clock> SpeechPlayer for SimulatedTts<C> {
    fn speak(&mut self, text: &str, _audio_url: Option<&str>) -> Result<Playback, SpeechError> {
        Ok(Playback::new(self.clock.now(), self.estimate(text)))
    }
}

/// Tries `primary`, and on failure speaks through `fallback` instead
#[derive(Debug, Clone)]
pub struct FallbackPlayer<P, F> {
    primary: P,
    fallback: F,
}

impl<P: SpeechPlayer, F: SpeechPlayer> FallbackPlayer<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: SpeechPlayer, F: SpeechPlayer> SpeechPlayer for FallbackPlayer<P, F> {
    fn speak(&mut self, text: &str, audio_url: Option<&str>) -> Result<Playback, SpeechError> {
        match self.primary.speak(text, audio_url) {
            Ok(playback) => Ok(playback),
            Err(err) => {
                warn!(%err, text, "audio playback failed, falling back to text-to-speech");
                self.fallback.speak(text, None)
            }
        }
    }
}

/// Decides which option a spoken answer actually matched
pub trait SpeechGrader {
    /// `spoken` is the option the learner attempted, `-1` when nothing was heard
    fn grade(&mut self, spoken: i32, options: &[String]) -> i32;
}

/// Trusts the attempted option as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactGrader;

impl SpeechGrader for ExactGrader {
    fn grade(&mut self, spoken: i32, options: &[String]) -> i32 {
        match usize::try_from(spoken) {
            Ok(i) if i < options.len() => spoken,
            _ => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn playback_finishes_after_duration() {
        let clock = ManualClock::new();
        let playback = Playback::new(clock.now(), Duration::from_millis(300));
        clock.advance_ms(299);
        assert!(!playback.is_finished(clock.now()));
        clock.advance_ms(1);
        assert!(playback.is_finished(clock.now()));
    }

    #[test]
    fn clip_player_needs_audio() {
        let clock = ManualClock::new();
        let mut player = ClipPlayer::new(clock, Duration::from_millis(800));
        assert_eq!(
            player.speak("der Hund", None),
            Err(SpeechError::NoAudio("der Hund".into()))
        );
        assert!(player.speak("der Hund", Some("https://cdn.example/hund.mp3")).is_ok());
    }

    #[test]
    fn tts_scales_with_text_and_has_a_floor() {
        let tts = SimulatedTts::new(ManualClock::new());
        assert_eq!(tts.estimate("ja"), Duration::from_millis(400));
        assert_eq!(tts.estimate("der Fernseher"), Duration::from_millis(780));
    }

    #[test]
    fn exact_grader_rejects_out_of_range() {
        let options = vec!["a".to_string(), "b".to_string()];
        let mut grader = ExactGrader;
        assert_eq!(grader.grade(1, &options), 1);
        assert_eq!(grader.grade(2, &options), -1);
        assert_eq!(grader.grade(-1, &options), -1);
    }

    #[test]
    fn fallback_speaks_when_primary_fails() {
        let clock = ManualClock::new();
        let mut player = FallbackPlayer::new(
            ClipPlayer::new(clock.clone(), Duration::from_millis(800)),
            SimulatedTts::new(clock.clone()),
        );

        let from_clip = player.speak("die Katze", Some("cat.mp3")).unwrap();
        assert_eq!(from_clip.ends_at(), clock.now() + Duration::from_millis(800));

        let from_tts = player.speak("die Katze", None).unwrap();
        assert_eq!(from_tts.ends_at(), clock.now() + Duration::from_millis(540));
    }
}

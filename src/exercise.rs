use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How an item is presented and answered
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExerciseKind {
    /// Word shown on screen, pick the translation
    Reading,
    /// Word played back as audio first, pick the translation
    Listening,
    /// Say the translation out loud; graded before the result shows
    Speaking,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 3] = [
        ExerciseKind::Reading,
        ExerciseKind::Listening,
        ExerciseKind::Speaking,
    ];
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionKind {
    #[default]
    Learn,
    Practice,
    Review,
}

impl SessionKind {
    /// Exercise kind for the item at `position` in a session of this kind
    pub fn kind_at(&self, position: usize) -> ExerciseKind {
        match self {
            SessionKind::Learn => ExerciseKind::Reading,
            SessionKind::Practice => {
                if position % 2 == 0 {
                    ExerciseKind::Reading
                } else {
                    ExerciseKind::Listening
                }
            }
            SessionKind::Review => ExerciseKind::ALL[position % ExerciseKind::ALL.len()],
        }
    }
}

/// One question in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseItem {
    pub word: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub audio_url: Option<String>,
    pub kind: ExerciseKind,
}

impl ExerciseItem {
    /// Timeouts arrive as `-1` and never match
    pub fn is_correct(&self, selected: i32) -> bool {
        usize::try_from(selected).is_ok_and(|i| i == self.correct_index)
    }

    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.correct_index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ExerciseItem {
        ExerciseItem {
            word: "hund".into(),
            prompt: "hund".into(),
            options: vec!["cat".into(), "dog".into(), "bird".into()],
            correct_index: 1,
            audio_url: None,
            kind: ExerciseKind::Reading,
        }
    }

    #[test]
    fn timeout_is_never_correct() {
        let item = item();
        assert!(item.is_correct(1));
        assert!(!item.is_correct(0));
        assert!(!item.is_correct(-1));
        assert_eq!(item.correct_option(), Some("dog"));
    }

    #[test]
    fn learn_sessions_are_reading_only() {
        assert!((0..6).all(|i| SessionKind::Learn.kind_at(i) == ExerciseKind::Reading));
    }

    #[test]
    fn review_cycles_through_every_kind() {
        let kinds: Vec<_> = (0..4).map(|i| SessionKind::Review.kind_at(i)).collect();
        assert_eq!(
            kinds,
            vec![
                ExerciseKind::Reading,
                ExerciseKind::Listening,
                ExerciseKind::Speaking,
                ExerciseKind::Reading
            ]
        );
    }

    #[test]
    fn kinds_display_lowercase() {
        assert_eq!(ExerciseKind::Listening.to_string(), "listening");
        assert_eq!(SessionKind::Review.to_string(), "review");
    }
}

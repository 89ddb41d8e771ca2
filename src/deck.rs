use std::fs::File;
use std::io::Read;
use std::path::Path;

use include_dir::{include_dir, Dir};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use thiserror::Error;

use crate::exercise::{ExerciseItem, ExerciseKind, SessionKind};

static DECK_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/decks");

/// Options shown per item, the correct one included
pub const OPTIONS_PER_ITEM: usize = 4;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("no built-in deck named '{0}'")]
    NotFound(String),
    #[error("deck '{0}' has no entries")]
    Empty(String),
    #[error("failed to read deck: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed deck json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed deck csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Supplies the ordered items for a session
pub trait SessionSource {
    fn load(&self, session: SessionKind) -> Result<Vec<ExerciseItem>, DeckError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeckEntry {
    pub word: String,
    pub translation: String,
    #[serde(default)]
    pub audio_url: Option<String>,
}

/// A word list turned into multiple-choice items on demand
#[derive(Debug, Clone)]
pub struct WordDeck {
    pub name: String,
    pub entries: Vec<DeckEntry>,
    limit: Option<usize>,
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct DeckFile {
    name: String,
    entries: Vec<DeckEntry>,
}

impl WordDeck {
    pub fn new(name: impl Into<String>, entries: Vec<DeckEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
            limit: None,
            seed: None,
        }
    }

    /// Load one of the decks compiled into the binary
    pub fn builtin(name: &str) -> Result<Self, DeckError> {
        let file = DECK_DIR
            .get_file(format!("{name}.json"))
            .ok_or_else(|| DeckError::NotFound(name.to_string()))?;
        let deck: DeckFile = serde_json::from_slice(file.contents())?;
        Ok(Self::new(deck.name, deck.entries))
    }

    pub fn builtin_names() -> Vec<String> {
        let mut names: Vec<String> = DECK_DIR
            .files()
            .filter_map(|f| f.path().file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Read `word,translation[,audio_url]` rows, with a header line
    pub fn from_csv_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self, DeckError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut entries = Vec::new();
        for row in rdr.deserialize() {
            let entry: DeckEntry = row?;
            entries.push(DeckEntry {
                audio_url: entry.audio_url.filter(|url| !url.is_empty()),
                ..entry
            });
        }
        Ok(Self::new(name, entries))
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, DeckError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "custom".to_string());
        Self::from_csv_reader(name, File::open(path)?)
    }

    /// A CSV path when one exists on disk, otherwise a built-in deck name
    pub fn resolve(name_or_path: &str) -> Result<Self, DeckError> {
        let path = Path::new(name_or_path);
        if path.is_file() {
            Self::from_csv_path(path)
        } else {
            Self::builtin(name_or_path)
        }
    }

    /// Cap the number of items per session
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Fix option shuffling and practice ordering, for reproducible sessions
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn build_item(&self, entry: &DeckEntry, kind: ExerciseKind, rng: &mut StdRng) -> ExerciseItem {
        let mut distractors: Vec<&str> = self
            .entries
            .iter()
            .map(|e| e.translation.as_str())
            .filter(|t| *t != entry.translation)
            .collect();
        distractors.sort_unstable();
        distractors.dedup();

        let mut options: Vec<String> = distractors
            .choose_multiple(rng, OPTIONS_PER_ITEM - 1)
            .map(|t| t.to_string())
            .collect();
        options.push(entry.translation.clone());
        options.shuffle(rng);
        let correct_index = options
            .iter()
            .position(|o| *o == entry.translation)
            .unwrap_or_default();

        let prompt = match kind {
            ExerciseKind::Reading => entry.word.clone(),
            ExerciseKind::Listening => "Listen and pick the meaning".to_string(),
            ExerciseKind::Speaking => format!("Say the meaning of \"{}\"", entry.word),
        };

        ExerciseItem {
            word: entry.word.clone(),
            prompt,
            options,
            correct_index,
            audio_url: entry.audio_url.clone(),
            kind,
        }
    }
}

impl SessionSource for WordDeck {
    fn load(&self, session: SessionKind) -> Result<Vec<ExerciseItem>, DeckError> {
        if self.entries.is_empty() {
            return Err(DeckError::Empty(self.name.clone()));
        }
        let mut rng = self.rng();
        let mut order: Vec<&DeckEntry> = self.entries.iter().collect();
        if session != SessionKind::Learn {
            order.shuffle(&mut rng);
        }
        let limit = self.limit.unwrap_or(order.len()).min(order.len());

        Ok(order
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(pos, entry)| self.build_item(entry, session.kind_at(pos), &mut rng))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_decks_are_listed_and_load() {
        let names = WordDeck::builtin_names();
        assert!(names.contains(&"german".to_string()));
        for name in names {
            let deck = WordDeck::builtin(&name).unwrap();
            assert!(!deck.entries.is_empty());
        }
    }

    #[test]
    fn unknown_builtin_deck_is_not_found() {
        assert!(matches!(
            WordDeck::builtin("klingon"),
            Err(DeckError::NotFound(_))
        ));
    }

    #[test]
    fn items_carry_correct_answer_among_options() {
        let deck = WordDeck::builtin("german").unwrap().with_seed(7).with_limit(5);
        let items = deck.load(SessionKind::Practice).unwrap();
        assert_eq!(items.len(), 5);
        for item in &items {
            assert_eq!(item.options.len(), OPTIONS_PER_ITEM);
            let correct = item.correct_option().unwrap();
            let entry = deck.entries.iter().find(|e| e.word == item.word).unwrap();
            assert_eq!(correct, entry.translation);
        }
        assert_eq!(items[1].kind, ExerciseKind::Listening);
    }

    #[test]
    fn learn_keeps_deck_order() {
        let deck = WordDeck::builtin("german").unwrap().with_limit(3);
        let words: Vec<_> = deck
            .load(SessionKind::Learn)
            .unwrap()
            .into_iter()
            .map(|i| i.word)
            .collect();
        assert_eq!(words, vec!["der Hund", "die Katze", "das Haus"]);
    }

    #[test]
    fn same_seed_same_session() {
        let a = WordDeck::builtin("spanish").unwrap().with_seed(42);
        let b = WordDeck::builtin("spanish").unwrap().with_seed(42);
        assert_eq!(
            a.load(SessionKind::Review).unwrap(),
            b.load(SessionKind::Review).unwrap()
        );
    }

    #[test]
    fn csv_rows_become_entries() {
        let data = "word,translation,audio_url\nhaus,house,\nbaum,tree,https://cdn.example/baum.mp3\n";
        let deck = WordDeck::from_csv_reader("mini", data.as_bytes()).unwrap();
        assert_eq!(deck.entries.len(), 2);
        assert_eq!(deck.entries[0].audio_url, None);
        assert_eq!(
            deck.entries[1].audio_url.as_deref(),
            Some("https://cdn.example/baum.mp3")
        );

        // two entries means one distractor at most
        let items = deck.load(SessionKind::Learn).unwrap();
        assert_eq!(items[0].options.len(), 2);
    }

    #[test]
    fn empty_deck_is_an_error() {
        let deck = WordDeck::new("nothing", Vec::new());
        assert!(matches!(
            deck.load(SessionKind::Learn),
            Err(DeckError::Empty(_))
        ));
    }

    #[test]
    fn csv_deck_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("travel.csv");
        std::fs::write(&path, "word,translation\nBahnhof,station\nFlughafen,airport\n").unwrap();
        let deck = WordDeck::from_csv_path(&path).unwrap();
        assert_eq!(deck.name, "travel");
        assert_eq!(deck.entries.len(), 2);
    }

    #[test]
    fn resolve_prefers_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("german");
        std::fs::write(&path, "word,translation
ja,yes
nein,no
").unwrap();

        let from_file = WordDeck::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(from_file.entries.len(), 2);

        let builtin = WordDeck::resolve("german").unwrap();
        assert!(builtin.entries.len() > 2);
        assert!(matches!(
            WordDeck::resolve("klingon"),
            Err(DeckError::NotFound(_))
        ));
    }
}

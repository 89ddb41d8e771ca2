use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::answers::{AnswerRecord, AnswerSink, SessionSummary};
use crate::clock::Clock;
use crate::exercise::{ExerciseItem, ExerciseKind, SessionKind};
use crate::flow::{FlowState, Phase};
use crate::session::Session;
use crate::speech::SpeechPlayer;
use crate::util::format_remaining;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

pub const DRILL_LEGEND: &str = "(1-9) answer / (space) record / (?) tutorial / (esc)ape";

const TUTORIAL: &str = "Read or listen to the word, then pick its translation before the bar runs out.\n\n\
Press the option's number to answer. On speaking items press space first, then say the answer \
(press its number to mark what you said).\n\nThe clock is stopped while this box is open. Press ? to carry on.";

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

/// Snapshot of a running session, taken once per frame
#[derive(Debug, Clone)]
pub struct DrillView {
    pub session: SessionKind,
    pub item: Option<ExerciseItem>,
    pub position: usize,
    pub total: usize,
    pub state: FlowState,
    /// Length of the current phase's countdown
    pub phase_ms: u64,
    pub playing: bool,
    pub recording: bool,
    pub grading: bool,
    pub tutorial: bool,
}

impl DrillView {
    pub fn capture<C, A, P>(session: &Session<C, A, P>, tutorial: bool) -> Self
    where
        C: Clock + Clone,
        A: AnswerSink,
        P: SpeechPlayer,
    {
        Self {
            session: session.kind(),
            item: session.current().cloned(),
            position: session.position(),
            total: session.len(),
            state: session.flow_state(),
            phase_ms: session.phase_duration().as_millis() as u64,
            playing: session.is_playing(),
            recording: session.is_recording(),
            grading: session.is_grading(),
            tutorial,
        }
    }

    fn countdown_ratio(&self) -> f64 {
        if self.phase_ms == 0 {
            return 0.0;
        }
        (self.state.remaining_ms as f64 / self.phase_ms as f64).clamp(0.0, 1.0)
    }

    fn options_visible(&self) -> bool {
        matches!(
            self.state.phase,
            Phase::Options | Phase::Processing | Phase::Result
        )
    }

    fn prompt_line(&self, item: &ExerciseItem) -> Line<'static> {
        let revealed = self.state.phase == Phase::Result;
        match item.kind {
            ExerciseKind::Listening if !revealed => {
                Line::from(Span::styled("♪ listen closely", bold().fg(Color::Magenta)))
            }
            _ => Line::from(Span::styled(item.prompt.clone(), bold())),
        }
    }

    fn option_style(&self, idx: usize, item: &ExerciseItem) -> Style {
        let selected = self.state.selected_index.and_then(|i| usize::try_from(i).ok());
        match self.state.phase {
            Phase::Result if idx == item.correct_index => bold().fg(Color::Green),
            Phase::Result if selected == Some(idx) => bold().fg(Color::Red),
            Phase::Result | Phase::Processing => dim(),
            _ if item.kind == ExerciseKind::Speaking && !self.recording => dim(),
            _ => bold(),
        }
    }

    fn status(&self, item: &ExerciseItem) -> Option<Span<'static>> {
        let italic = Style::default().add_modifier(Modifier::ITALIC);
        if self.state.phase == Phase::Result {
            let answer = item.correct_option().unwrap_or_default().to_string();
            let span = if self.state.timed_out() {
                Span::styled(format!("time's up: {answer}"), bold().fg(Color::Yellow))
            } else if self.state.selected_index.is_some_and(|i| item.is_correct(i)) {
                Span::styled("correct!", bold().fg(Color::Green))
            } else {
                Span::styled(format!("not quite: {answer}"), bold().fg(Color::Red))
            };
            return Some(span);
        }
        if self.grading || self.state.phase == Phase::Processing {
            return Some(Span::styled("checking your answer...", italic));
        }
        if self.playing {
            return Some(Span::styled("playing audio...", italic));
        }
        if item.kind == ExerciseKind::Speaking && self.state.phase == Phase::Options {
            let text = if self.recording {
                "recording... say it, then press its number"
            } else {
                "press space when you are ready to speak"
            };
            return Some(Span::styled(text, italic.fg(Color::Cyan)));
        }
        None
    }
}

impl Widget for &DrillView {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(item) = self.item.as_ref() else {
            Paragraph::new(Span::styled("no items left", dim()))
                .alignment(Alignment::Center)
                .render(area, buf);
            return;
        };

        let option_lines = if self.options_visible() {
            item.options.len() as u16
        } else {
            1
        };
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1), // header
                Constraint::Length(1),
                Constraint::Length(1), // countdown
                Constraint::Min(0),
                Constraint::Length(2), // prompt
                Constraint::Length(option_lines),
                Constraint::Length(1),
                Constraint::Length(1), // status
                Constraint::Min(0),
                Constraint::Length(1), // legend
            ])
            .split(area);

        let mut header = vec![Span::styled(
            format!(
                "{} · {}/{} · {}",
                self.session,
                (self.position + 1).min(self.total),
                self.total,
                item.kind
            ),
            dim(),
        )];
        if self.state.is_paused {
            header.push(Span::styled("   paused", bold().fg(Color::Yellow)));
        }
        Paragraph::new(Line::from(header)).render(chunks[0], buf);

        if self.phase_ms > 0 {
            Gauge::default()
                .ratio(self.countdown_ratio())
                .label(format_remaining(self.state.remaining_ms))
                .gauge_style(match self.state.phase {
                    Phase::Question => Style::default().fg(Color::Blue),
                    Phase::Options => Style::default().fg(Color::Magenta),
                    _ => Style::default().fg(Color::DarkGray),
                })
                .render(chunks[2], buf);
        }

        Paragraph::new(self.prompt_line(item))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[4], buf);

        if self.options_visible() {
            let lines: Vec<Line> = item
                .options
                .iter()
                .enumerate()
                .map(|(idx, option)| {
                    Line::from(Span::styled(
                        format!("{}. {}", idx + 1, option),
                        self.option_style(idx, item),
                    ))
                })
                .collect();
            // left-aligned column, centered as a block
            let width = item.options.iter().map(|o| o.width()).max().unwrap_or(0) as u16 + 3;
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Min(0),
                    Constraint::Length(width),
                    Constraint::Min(0),
                ])
                .split(chunks[5]);
            Paragraph::new(lines).render(columns[1], buf);
        } else {
            Paragraph::new(Span::styled("get ready...", dim()))
                .alignment(Alignment::Center)
                .render(chunks[5], buf);
        }

        if let Some(status) = self.status(item) {
            Paragraph::new(status)
                .alignment(Alignment::Center)
                .render(chunks[7], buf);
        }

        Paragraph::new(Span::styled(
            DRILL_LEGEND,
            Style::default().add_modifier(Modifier::ITALIC),
        ))
        .render(chunks[9], buf);

        if self.tutorial {
            render_tutorial(area, buf);
        }
    }
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn render_tutorial(area: Rect, buf: &mut Buffer) {
    let popup = centered(area, 70, 60);
    Clear.render(popup, buf);
    Paragraph::new(TUTORIAL)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(" how it works ", bold().fg(Color::Cyan))),
        )
        .wrap(Wrap { trim: true })
        .render(popup, buf);
}

/// End-of-session results
#[derive(Debug, Clone, Copy)]
pub struct SummaryView<'a> {
    pub summary: &'a SessionSummary,
    pub records: &'a [AnswerRecord],
    /// Whether the answers made it into the answer log
    pub saved: bool,
}

impl Widget for &SummaryView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let missed: Vec<&AnswerRecord> = self.records.iter().filter(|r| !r.correct).collect();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(1), // totals
                Constraint::Length(1), // timing
                Constraint::Length(1),
                Constraint::Length(missed.len().min(8) as u16 + 1),
                Constraint::Min(0),
                Constraint::Length(1), // legend
            ])
            .split(area);

        let s = self.summary;
        Paragraph::new(Span::styled(
            format!(
                "{}/{} correct   {:.0}% acc   {} timed out",
                s.correct, s.total, s.accuracy, s.timed_out
            ),
            bold(),
        ))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

        let timing = match (s.mean_response_ms, s.response_spread_ms) {
            (Some(avg), Some(sd)) => {
                format!("{:.1}s avg response   {:.2}s sd", avg / 1000.0, sd / 1000.0)
            }
            (Some(avg), None) => format!("{:.1}s avg response", avg / 1000.0),
            _ => "no answers given".to_string(),
        };
        Paragraph::new(Span::styled(timing, Style::default().fg(Color::Cyan)))
            .alignment(Alignment::Center)
            .render(chunks[2], buf);

        if !missed.is_empty() {
            let mut lines = vec![Line::from(Span::styled("to review:", dim()))];
            lines.extend(missed.iter().take(8).map(|r| {
                Line::from(vec![
                    Span::styled(r.word.clone(), bold().fg(Color::Red)),
                    Span::styled(format!(" ({})", r.kind), dim()),
                ])
            }));
            Paragraph::new(lines)
                .alignment(Alignment::Center)
                .render(chunks[4], buf);
        }

        let legend = if self.saved {
            "(esc)ape"
        } else {
            "answers could not be saved / (esc)ape"
        };
        Paragraph::new(Span::styled(
            legend,
            Style::default().add_modifier(Modifier::ITALIC),
        ))
        .render(chunks[6], buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn item(kind: ExerciseKind) -> ExerciseItem {
        ExerciseItem {
            word: "der Hund".into(),
            prompt: "der Hund".into(),
            options: vec!["the cat".into(), "the dog".into(), "the house".into()],
            correct_index: 1,
            audio_url: None,
            kind,
        }
    }

    fn view(kind: ExerciseKind, phase: Phase, selected_index: Option<i32>) -> DrillView {
        DrillView {
            session: SessionKind::Practice,
            item: Some(item(kind)),
            position: 0,
            total: 5,
            state: FlowState {
                phase,
                remaining_ms: 2_500,
                selected_index,
                is_paused: false,
            },
            phase_ms: 5_000,
            playing: false,
            recording: false,
            grading: false,
            tutorial: false,
        }
    }

    fn draw<W>(widget: W) -> String
    where
        W: Widget,
    {
        let area = Rect::new(0, 0, 80, 24);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);
        buf.content.iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn question_phase_hides_options() {
        let content = draw(&view(ExerciseKind::Reading, Phase::Question, None));
        assert!(content.contains("der Hund"));
        assert!(content.contains("practice · 1/5 · reading"));
        assert!(content.contains("2.5s"));
        assert!(!content.contains("the dog"));
    }

    #[test]
    fn options_phase_lists_numbered_options() {
        let content = draw(&view(ExerciseKind::Reading, Phase::Options, None));
        assert!(content.contains("1. the cat"));
        assert!(content.contains("2. the dog"));
        assert!(content.contains("3. the house"));
    }

    #[test]
    fn result_phase_reports_outcome() {
        let content = draw(&view(ExerciseKind::Reading, Phase::Result, Some(1)));
        assert!(content.contains("correct!"));

        let content = draw(&view(ExerciseKind::Reading, Phase::Result, Some(0)));
        assert!(content.contains("not quite: the dog"));

        let content = draw(&view(ExerciseKind::Reading, Phase::Result, Some(-1)));
        assert!(content.contains("time's up: the dog"));
    }

    #[test]
    fn result_phase_without_countdown_hides_the_gauge() {
        let mut v = view(ExerciseKind::Reading, Phase::Result, Some(1));
        v.phase_ms = 0;
        let content = draw(&v);
        assert!(content.contains("correct!"));
        assert!(!content.contains("2.5s"));
    }

    #[test]
    fn listening_hides_the_word_until_result() {
        let mut v = view(ExerciseKind::Listening, Phase::Question, None);
        v.playing = true;
        let content = draw(&v);
        assert!(!content.contains("der Hund"));
        assert!(content.contains("playing audio"));

        let content = draw(&view(ExerciseKind::Listening, Phase::Result, Some(1)));
        assert!(content.contains("der Hund"));
    }

    #[test]
    fn speaking_prompts_for_the_recorder() {
        let mut v = view(ExerciseKind::Speaking, Phase::Options, None);
        assert!(draw(&v).contains("press space when you are ready"));
        v.recording = true;
        assert!(draw(&v).contains("recording..."));
    }

    #[test]
    fn tutorial_overlay_and_pause_marker() {
        let mut v = view(ExerciseKind::Reading, Phase::Options, None);
        v.tutorial = true;
        v.state.is_paused = true;
        let content = draw(&v);
        assert!(content.contains("how it works"));
        assert!(content.contains("paused"));
    }

    #[test]
    fn summary_lists_missed_words() {
        let records = vec![
            AnswerRecord {
                word: "die Katze".into(),
                kind: ExerciseKind::Reading,
                session: SessionKind::Learn,
                selected_index: 1,
                correct: true,
                response_time_ms: Some(1_000),
                answered_at: Local::now(),
            },
            AnswerRecord {
                word: "das Haus".into(),
                kind: ExerciseKind::Listening,
                session: SessionKind::Learn,
                selected_index: -1,
                correct: false,
                response_time_ms: None,
                answered_at: Local::now(),
            },
        ];
        let summary = SessionSummary::from_records(&records);
        let content = draw(&SummaryView {
            summary: &summary,
            records: &records,
            saved: false,
        });
        assert!(content.contains("1/2 correct"));
        assert!(content.contains("50% acc"));
        assert!(content.contains("1 timed out"));
        assert!(content.contains("das Haus"));
        assert!(content.contains("answers could not be saved"));
    }
}

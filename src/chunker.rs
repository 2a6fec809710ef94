//! Overlapping-window chunker.
//!
//! Splits extracted text into passages of at most `chunk_size` characters
//! where adjacent passages share exactly `overlap_size` characters, so a
//! sentence cut by one window boundary is intact in a neighbor. Windows
//! prefer to end on a natural break (paragraph, line, sentence, word) found
//! within a small tolerance behind the computed cut.

use serde::Deserialize;
use serde::Serialize;

use crate::errors::DocragError;
use crate::errors::Result;

/// One passage produced by the chunker. `start`/`end` are character
/// offsets into the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub seq: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Break classes in preference order, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakClass {
    Paragraph,
    Line,
    Sentence,
    Clause,
    Word,
}

const BREAK_CLASSES: &[BreakClass] = &[
    BreakClass::Paragraph,
    BreakClass::Line,
    BreakClass::Sentence,
    BreakClass::Clause,
    BreakClass::Word,
];

pub struct Chunker {
    chunk_size: usize,
    overlap_size: usize,
}

impl Chunker {
    /// Create a chunker, rejecting configurations that cannot make progress.
    ///
    /// # Errors
    /// `ConfigError` when `chunk_size` is zero or `overlap_size` is not
    /// strictly smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DocragError::config("chunk_size must be positive"));
        }
        if overlap_size >= chunk_size {
            return Err(DocragError::config(format!(
                "overlap_size ({overlap_size}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap_size,
        })
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        Self::new(config.chunk_size(), config.overlap_size())
    }

    /// How far behind the computed cut a natural break may be.
    fn tolerance(&self) -> usize {
        self.chunk_size / 5
    }

    /// Split `text` into ordered, fully covering, overlapping spans.
    ///
    /// The i-th span starts `chunk_size - overlap_size` characters after the
    /// previous one (earlier when the previous span snapped to a break) and
    /// runs for at most `chunk_size` characters. Consecutive spans share
    /// exactly `overlap_size` characters; the final span may be shorter.
    pub fn chunk(&self, text: &str) -> Vec<ChunkSpan> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }

        let mut spans = Vec::new();
        let mut start = 0usize;
        let mut seq = 0usize;

        loop {
            let target_end = (start + self.chunk_size).min(total);
            let end = if target_end == total {
                total
            } else {
                self.snap_end(&chars, start, target_end)
            };

            spans.push(ChunkSpan {
                seq,
                start,
                end,
                text: chars[start..end].iter().collect(),
            });

            if end == total {
                break;
            }
            start = end - self.overlap_size;
            seq += 1;
        }

        spans
    }

    /// Pick the cut for a non-final span: the latest break of the strongest
    /// class inside the tolerance window, or the hard cut when none exists.
    /// A snapped cut must still leave the next span strictly ahead of the
    /// current start, otherwise chunking would stop making progress.
    fn snap_end(&self, chars: &[char], start: usize, target_end: usize) -> usize {
        let tolerance = self.tolerance();
        if tolerance == 0 {
            return target_end;
        }

        let floor = (start + self.overlap_size + 1).max(target_end.saturating_sub(tolerance));
        if floor > target_end {
            return target_end;
        }

        for class in BREAK_CLASSES {
            for end in (floor..=target_end).rev() {
                if breaks_at(chars, end, *class) {
                    return end;
                }
            }
        }

        target_end
    }
}

/// Whether a cut placed just before `chars[end]` falls on the given break
/// class. `end` is always at least 1 and at most `chars.len() - 1` here.
fn breaks_at(chars: &[char], end: usize, class: BreakClass) -> bool {
    let before = chars[end - 1];
    let after_is_space = chars.get(end).is_none_or(|c| c.is_whitespace());
    match class {
        BreakClass::Paragraph => end >= 2 && before == '\n' && chars[end - 2] == '\n',
        BreakClass::Line => before == '\n',
        BreakClass::Sentence => matches!(before, '.' | '!' | '?') && after_is_space,
        BreakClass::Clause => before == ',' && after_is_space,
        BreakClass::Word => before == ' ',
    }
}

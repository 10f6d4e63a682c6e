//! Cumulative drill track with subtitle cues.
//!
//! Every append moves the cursor by exactly the duration appended, and cues
//! are only cut at append boundaries, so cue spans line up with the audio and
//! never overlap.

use crate::audio::normalize::NormalizedSegment;
use crate::types::{AudioFormat, Cue, DialogueRow};

/// Per-row repetition structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrillPattern {
    /// Silence after each spoken segment
    pub short_silence_ms: u64,
    /// Silence closing every row
    pub long_silence_ms: u64,
    /// English passes before the bilingual pass
    pub english_repeats: usize,
}

impl Default for DrillPattern {
    fn default() -> Self {
        Self {
            short_silence_ms: 800,
            long_silence_ms: 1500,
            english_repeats: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Timeline {
    format: AudioFormat,
    pattern: DrillPattern,
    short_silence: NormalizedSegment,
    long_silence: NormalizedSegment,
    buffer: Vec<i32>,
    cursor_ms: u64,
    cues: Vec<Cue>,
}

impl Timeline {
    pub fn new(format: AudioFormat, pattern: DrillPattern) -> Self {
        Self {
            format,
            pattern,
            short_silence: NormalizedSegment::silence(pattern.short_silence_ms, format),
            long_silence: NormalizedSegment::silence(pattern.long_silence_ms, format),
            buffer: Vec::new(),
            cursor_ms: 0,
            cues: Vec::new(),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn cursor_ms(&self) -> u64 {
        self.cursor_ms
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    /// Interleaved samples in the timeline's format.
    pub fn samples(&self) -> &[i32] {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append a segment, advancing the cursor by its duration.
    pub fn append(mut self, segment: &NormalizedSegment) -> Self {
        debug_assert_eq!(segment.format(), self.format, "segment not normalized to timeline format");
        self.buffer.extend_from_slice(segment.samples());
        self.cursor_ms += segment.duration_ms();
        self
    }

    /// Segment followed by the short silence.
    fn append_spoken(self, segment: &NormalizedSegment) -> Self {
        let mut tl = self.append(segment);
        tl.buffer.extend_from_slice(tl.short_silence.samples());
        tl.cursor_ms += tl.pattern.short_silence_ms;
        tl
    }

    fn append_long_silence(mut self) -> Self {
        self.buffer.extend_from_slice(self.long_silence.samples());
        self.cursor_ms += self.pattern.long_silence_ms;
        self
    }

    fn push_cue(mut self, start_ms: u64, text: String) -> Self {
        let cue = Cue {
            index: self.cues.len() + 1,
            start_ms,
            end_ms: self.cursor_ms,
            text,
        };
        self.cues.push(cue);
        self
    }

    /// Lay down one row of the drill:
    ///
    /// 1. english + pause, repeated; cue with the english text
    /// 2. chinese + pause, english + pause; cue with both lines
    /// 3. the ding, if any
    /// 4. the long pause
    ///
    /// Returns the updated timeline and the number of cues added. A row with
    /// neither segment adds nothing.
    pub fn append_row(
        self,
        row: &DialogueRow,
        english: Option<&NormalizedSegment>,
        chinese: Option<&NormalizedSegment>,
        ding: Option<&NormalizedSegment>,
    ) -> (Self, usize) {
        if english.is_none() && chinese.is_none() {
            return (self, 0);
        }

        let cues_before = self.cues.len();
        let mut tl = self;

        if let Some(en) = english {
            let start = tl.cursor_ms;
            for _ in 0..tl.pattern.english_repeats {
                tl = tl.append_spoken(en);
            }
            tl = tl.push_cue(start, row.english.clone());

            if let Some(zh) = chinese {
                let start = tl.cursor_ms;
                tl = tl.append_spoken(zh).append_spoken(en);
                tl = tl.push_cue(start, format!("{}\n{}", row.english, row.chinese));
            }
        }

        if let Some(ding) = ding {
            tl = tl.append(ding);
        }
        tl = tl.append_long_silence();

        let added = tl.cues.len() - cues_before;
        (tl, added)
    }
}

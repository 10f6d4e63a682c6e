//! SRT rendering for drill cues.

use crate::types::Cue;

/// Format milliseconds as an SRT timestamp `HH:MM:SS,mmm`.
///
/// Hours are not wrapped; tracks longer than 99 hours get wider hour fields.
pub fn format_timestamp(total_ms: u64) -> String {
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Render cues as SRT blocks in index order, each followed by a blank line.
pub fn render(cues: &[Cue]) -> String {
    let mut ordered: Vec<&Cue> = cues.iter().collect();
    ordered.sort_by_key(|c| c.index);

    let mut out = String::new();
    for cue in ordered {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            format_timestamp(cue.start_ms),
            format_timestamp(cue.end_ms),
            cue.text
        ));
    }
    out
}

//! Portamento realised as a generated pitch macro

use super::envelope::distribute;
use super::macros::{MacroAllocator, MacroKind};
use super::note;
use crate::error::{Error, Result};

/// NTSC frame rate; pitch macros advance once per frame
pub const FRAMES_PER_SECOND: u32 = 60;

/// Slide length when none is given (a sixteenth note)
pub const DEFAULT_SLIDE_DURATION: u32 = 16;

/// Slide recorded by `/` and realised on the next note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideRequest {
    /// Note the slide starts from (`c`, `f+`)
    pub note: String,
    /// Octave in effect at the start note
    pub octave: Option<i32>,
    /// Slide length as a note value (16 = sixteenth)
    pub speed: Option<u32>,
}

/// Number of frames a slide of note value `duration` lasts at `tempo`
///
/// floor(fps / ((duration / 4) * (tempo / 60))), kept in integers.
pub fn frames_for(tempo: u32, duration: u32) -> u32 {
    let denom = duration as u64 * tempo as u64;
    if denom == 0 {
        return 0;
    }
    (FRAMES_PER_SECOND as u64 * 4 * 60 / denom) as u32
}

/// Per-frame pitch steps covering `distance`, followed by a resting 0
pub fn pitch_steps(distance: i32, frames: u32) -> Vec<i32> {
    let mut steps = distribute(distance, frames);
    steps.push(0);
    steps
}

/// Build the words playing a slide from `request` to `end_note`
///
/// `suffix` is the end note's length/tie/repeat text; anything from its last
/// `]` on is placed after the closing `EPOF`.
pub fn realize(
    request: &SlideRequest,
    end_note: &str,
    end_octave: Option<i32>,
    suffix: &str,
    tempo: Option<u32>,
    macros: &mut MacroAllocator,
) -> Result<Vec<String>> {
    let start_octave = request.octave.ok_or_else(|| {
        Error::Slide(format!("octave of '{}' is unknown", request.note))
    })?;
    let end_octave =
        end_octave.ok_or_else(|| Error::Slide(format!("octave of '{}' is unknown", end_note)))?;
    let tempo = tempo.ok_or_else(|| Error::Slide("tempo is unknown".to_string()))?;

    let start = note::period(&request.note, start_octave)
        .ok_or_else(|| Error::Slide(format!("'{}' is not a note", request.note)))?;
    let end = note::period(end_note, end_octave)
        .ok_or_else(|| Error::Slide(format!("'{}' is not a note", end_note)))?;

    let duration = request.speed.unwrap_or(DEFAULT_SLIDE_DURATION);
    let frames = frames_for(tempo, duration);
    if frames == 0 {
        return Err(Error::Slide(format!(
            "a 1/{} slide at tempo {} is shorter than one frame",
            duration, tempo
        )));
    }

    let distance = start as i32 - end as i32;
    let body = pitch_steps(distance, frames)
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let token = macros.token_for(MacroKind::Pitch, &body);

    let (before, after) = match suffix.rfind(']') {
        Some(i) => suffix.split_at(i),
        None => (suffix, ""),
    };

    let octave_diff = start_octave - end_octave;
    let mut words = Vec::new();
    let to_start = note::octave_shift(octave_diff);
    if !to_start.is_empty() {
        words.push(to_start);
    }
    words.push(token);
    words.push(format!("{}{}", request.note, before));
    words.push(format!("EPOF{}", after));
    let back = note::octave_shift(-octave_diff);
    if !back.is_empty() {
        words.push(back);
    }

    Ok(words)
}

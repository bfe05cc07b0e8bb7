//! Word-level rewriting
//!
//! Each line is split into words and every word is matched against an
//! ordered rule table. The first matching rule decides how the word is
//! rewritten and which voice state it touches.

use super::channel::VoiceTracker;
use super::instrument::{Instrument, END_KEYWORD};
use super::macros::{MacroAllocator, MacroKind};
use super::note;
use super::preprocess::Globals;
use super::slide::{self, SlideRequest};
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;

/// Word shapes, in matching priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// `/` or `/8`
    Slide,
    /// `A`, `ABC`
    VoiceSet,
    /// `t150`
    Tempo,
    /// `@v3`
    VolumeMacro,
    /// `@@3`
    TimbreMacro,
    /// `EN3`
    ArpeggioMacro,
    /// `EP3`
    PitchMacro,
    /// `q6`
    Quantize,
    /// `@3`
    DirectTimbre,
    /// `o4`
    Octave,
    /// `>`, `<<`
    OctaveShift,
    /// `"kick.dmc",15`
    Sample,
    /// `C+4,8^16]2`
    AbsoluteNote,
    /// `c+8.^16`
    Note,
    /// `[+@lead]2`
    Instrument,
}

/// Words made of capitals that are commands, not voice sets
const OFF_KEYWORDS: [&str; 4] = ["EPOF", "ENOF", "MPOF", "SDOF"];

lazy_static! {
    static ref RULES: Vec<(Rule, Regex)> = [
        (Rule::Slide, r"^/(\d+)?$"),
        (Rule::VoiceSet, r"^[A-Z]+$"),
        (Rule::Tempo, r"^t(\d+)$"),
        (Rule::VolumeMacro, r"^@v(\d+)$"),
        (Rule::TimbreMacro, r"^@@(\d+)$"),
        (Rule::ArpeggioMacro, r"^EN(\d+)$"),
        (Rule::PitchMacro, r"^EP(\d+)$"),
        (Rule::Quantize, r"^q([0-8])$"),
        (Rule::DirectTimbre, r"^@(\d+)$"),
        (Rule::Octave, r"^o(\d+)$"),
        (Rule::OctaveShift, r"^(>+|<+)$"),
        (
            Rule::Sample,
            r#"^(\{\s*)?(?:"([^"]*\.dmc)"|'([^']*\.dmc)')\s*,(.*)$"#,
        ),
        (
            Rule::AbsoluteNote,
            r"^(\[+)?([A-Ga-g])([+-])?(\d{1,2})?(?:,(\d+\.?)(\^[0-9^]+)?)?([\]\d]+)?$",
        ),
        (Rule::Note, r"^(\[+)?([a-g][+-]?)([.0-9^]+)?([\]\d+]+)?$"),
        (Rule::Instrument, r"^(\[+)?(\+)?@([a-zA-Z0-9_-]+)([\]\d+]+)?$"),
    ]
    .into_iter()
    .map(|(rule, pattern)| (rule, Regex::new(pattern).unwrap()))
    .collect();
}

/// Find the first rule matching `word`
///
/// Absolute notes only match when enabled, except that a word using the
/// `,length` form always matches so it can be rejected.
pub fn classify(word: &str, absolute_notes: bool) -> Option<(Rule, Captures<'_>)> {
    for (rule, pattern) in RULES.iter() {
        let Some(caps) = pattern.captures(word) else {
            continue;
        };
        match rule {
            Rule::VoiceSet if OFF_KEYWORDS.contains(&word) => continue,
            Rule::AbsoluteNote if !absolute_notes && !word.contains(',') => continue,
            _ => return Some((*rule, caps)),
        }
    }
    None
}

fn group<'t>(caps: &Captures<'t>, i: usize) -> &'t str {
    caps.get(i).map_or("", |m| m.as_str())
}

/// Rewrites lines against the state of one compile run
pub struct WordDispatcher<'a> {
    globals: &'a Globals,
    instruments: &'a BTreeMap<String, Instrument>,
    voices: &'a mut VoiceTracker,
    macros: &'a mut MacroAllocator,
    sample_dir: &'a Path,
}

impl<'a> WordDispatcher<'a> {
    pub fn new(
        globals: &'a Globals,
        instruments: &'a BTreeMap<String, Instrument>,
        voices: &'a mut VoiceTracker,
        macros: &'a mut MacroAllocator,
        sample_dir: &'a Path,
    ) -> Self {
        Self {
            globals,
            instruments,
            voices,
            macros,
            sample_dir,
        }
    }

    /// Rewrite one line; directive lines are left alone
    pub fn process_line(&mut self, line: &str) -> Result<String> {
        if line.starts_with('#') {
            return Ok(line.to_string());
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        let mut out = Vec::with_capacity(words.len());

        for (i, word) in words.iter().enumerate() {
            let prev = i.checked_sub(1).map(|p| words[p]);
            let next = words.get(i + 1).copied();
            let rewritten = self.process_word(word, prev, next)?;
            let rewritten = rewritten.trim();
            if !rewritten.is_empty() {
                out.push(rewritten.to_string());
            }
        }

        Ok(out.join(" "))
    }

    fn process_word(&mut self, word: &str, prev: Option<&str>, next: Option<&str>) -> Result<String> {
        let Some((rule, caps)) = classify(word, self.globals.absolute_notes) else {
            return Ok(word.to_string());
        };

        // `@v1 = { ... }` defines a macro rather than selecting it
        let is_definition = next == Some("=");

        match rule {
            Rule::Slide => self.slide_marker(prev, caps.get(1).map(|m| m.as_str())),
            Rule::VoiceSet => {
                self.voices.select(word);
                Ok(word.to_string())
            }
            Rule::Tempo => {
                if let Ok(tempo) = caps[1].parse() {
                    self.voices.set_tempo(tempo);
                }
                Ok(word.to_string())
            }
            Rule::VolumeMacro
            | Rule::TimbreMacro
            | Rule::ArpeggioMacro
            | Rule::PitchMacro
            | Rule::DirectTimbre => {
                if !is_definition {
                    let kind = match rule {
                        Rule::VolumeMacro => MacroKind::Volume,
                        Rule::ArpeggioMacro => MacroKind::Arpeggio,
                        Rule::PitchMacro => MacroKind::Pitch,
                        _ => MacroKind::Timbre,
                    };
                    self.voices
                        .update(|s| s.set_macro(kind, Some(word.to_string())));
                }
                Ok(word.to_string())
            }
            Rule::Quantize => {
                self.voices.update(|s| s.quantize = Some(word.to_string()));
                Ok(word.to_string())
            }
            Rule::Octave => {
                if let Ok(octave) = caps[1].parse() {
                    self.voices.set_octave(octave);
                }
                Ok(word.to_string())
            }
            Rule::OctaveShift => {
                let ticks = word.len() as i32;
                let delta = if word.starts_with('>') { ticks } else { -ticks };
                let base = self.voices.octave().unwrap_or(0);
                self.voices.set_octave(base + delta);
                Ok(word.to_string())
            }
            Rule::Sample => Ok(self.sample(&caps)),
            Rule::AbsoluteNote => self.absolute_note(word, &caps),
            Rule::Note => {
                let suffix = format!("{}{}", group(&caps, 3), group(&caps, 4));
                let played = self.play_note(group(&caps, 2), &suffix)?;
                Ok(format!("{}{}", group(&caps, 1), played))
            }
            Rule::Instrument => Ok(self.instrument(word, &caps)),
        }
    }

    /// Note name (`c`, `f+`) of a note word
    fn note_name(&self, word: &str) -> Option<String> {
        match classify(word, self.globals.absolute_notes)? {
            (Rule::AbsoluteNote, caps) => Some(format!(
                "{}{}",
                group(&caps, 2).to_lowercase(),
                group(&caps, 3)
            )),
            (Rule::Note, caps) => Some(group(&caps, 2).to_string()),
            _ => None,
        }
    }

    fn slide_marker(&mut self, prev: Option<&str>, speed: Option<&str>) -> Result<String> {
        let note = prev.and_then(|w| self.note_name(w)).ok_or_else(|| {
            Error::Slide(format!(
                "'/' must follow a note, found '{}'",
                prev.unwrap_or("")
            ))
        })?;

        if self.globals.transpose != 0 && !self.voices.is_noise() {
            log::warn!("slide after '{}' is ignored while #X-TRANSPOSE is set", note);
        }

        let request = SlideRequest {
            note,
            octave: self.voices.octave(),
            speed: speed.and_then(|s| s.parse().ok()),
        };
        self.voices.set_slide(Some(request));
        Ok(String::new())
    }

    /// Emit a note, transposed or as the end of a pending slide
    fn play_note(&mut self, name: &str, suffix: &str) -> Result<String> {
        let amount = self.globals.transpose;

        if amount == 0 || self.voices.is_noise() {
            if let Some(request) = self.voices.slide().cloned() {
                let words = slide::realize(
                    &request,
                    name,
                    self.voices.octave(),
                    suffix,
                    self.voices.tempo(),
                    self.macros,
                )?;
                self.voices.set_slide(None);
                return Ok(words.join(" "));
            }
            return Ok(format!("{}{}", name, suffix));
        }

        Ok(note::transpose(name, amount, suffix)
            .map(|words| words.join(" "))
            .unwrap_or_else(|| format!("{}{}", name, suffix)))
    }

    fn absolute_note(&mut self, word: &str, caps: &Captures<'_>) -> Result<String> {
        if !self.globals.absolute_notes {
            return Err(Error::AbsoluteNotesDisabled(word.to_string()));
        }

        let noise = self.voices.is_noise();
        if noise && !word.contains(',') {
            return Ok(word.to_string());
        }

        let mut words = Vec::new();
        let written: Option<i32> = if noise {
            None
        } else {
            caps.get(4).and_then(|m| m.as_str().parse().ok())
        };

        if let Some(octave) = written {
            match self.voices.octave() {
                None => words.push(format!("o{}", octave)),
                Some(current) if current != octave => {
                    words.push(note::move_to_octave(octave, current))
                }
                _ => {}
            }
            self.voices.set_octave(octave);
        }

        let name = format!("{}{}", group(caps, 2).to_lowercase(), group(caps, 3));
        let suffix = format!("{}{}{}", group(caps, 5), group(caps, 6), group(caps, 7));
        let played = self.play_note(&name, &suffix)?;
        words.push(format!("{}{}", group(caps, 1), played));

        Ok(words.join(" "))
    }

    /// Point a sample path at the directory being compiled
    fn sample(&self, caps: &Captures<'_>) -> String {
        let (quote, path) = match caps.get(2) {
            Some(m) => ('"', m.as_str()),
            None => ('\'', group(caps, 3)),
        };
        let path = self.sample_dir.join(path);
        format!(
            "{}{q}{}{q},{}",
            group(caps, 1),
            path.display(),
            group(caps, 4),
            q = quote
        )
    }

    /// Words ending every instrument active on the selected voices
    fn end_active(&mut self) -> Vec<String> {
        let instruments = self.instruments;
        let mut words = Vec::new();
        for name in self.voices.instruments() {
            if let Some(instrument) = instruments.get(&name) {
                words.extend(instrument.end(self.voices));
            }
        }
        self.voices.set_instruments(&[]);
        words
    }

    fn instrument(&mut self, word: &str, caps: &Captures<'_>) -> String {
        let name = group(caps, 3);
        let keep_active = caps.get(2).is_some();
        let mut words = Vec::new();

        if name == END_KEYWORD {
            words.extend(self.end_active());
        } else {
            let instruments = self.instruments;
            let Some(instrument) = instruments.get(name) else {
                return word.to_string();
            };

            let mut active = if keep_active {
                self.voices.instruments()
            } else {
                words.extend(self.end_active());
                Vec::new()
            };
            active.push(name.to_string());
            self.voices.set_instruments(&active);

            words.extend(instrument.start(self.voices, self.macros));
        }

        let close = group(caps, 4);
        let mut out = format!("{}{}", group(caps, 1), words.join(" "));
        if !close.is_empty() {
            if !words.is_empty() {
                out.push(' ');
            }
            out.push_str(close);
        }
        out
    }
}

//! Voice state tracking

use super::macros::{MacroKind, MACRO_KINDS};
use super::slide::SlideRequest;
use std::collections::HashMap;

/// The 2A03 noise channel; notes on it are never transposed
pub const NOISE_VOICE: char = 'D';

/// Last known state of one voice
#[derive(Debug, Clone, Default)]
pub struct VoiceState {
    /// Current octave
    pub octave: Option<i32>,
    /// Current tempo (BPM)
    pub tempo: Option<u32>,
    /// Active macro token per kind (`@v20`, `EP21`, ...)
    pub macros: [Option<String>; MACRO_KINDS],
    /// Active quantize token (`q6`)
    pub quantize: Option<String>,
    /// Active instruments in activation order
    pub instruments: Vec<String>,
    /// Slide waiting for its end note
    pub slide: Option<SlideRequest>,
}

impl VoiceState {
    pub fn macro_token(&self, kind: MacroKind) -> Option<&str> {
        self.macros[kind as usize].as_deref()
    }

    pub fn set_macro(&mut self, kind: MacroKind, token: Option<String>) {
        self.macros[kind as usize] = token;
    }
}

/// State of every voice touched during one compile run
#[derive(Debug, Clone, Default)]
pub struct VoiceTracker {
    voices: HashMap<char, VoiceState>,
    /// Voices addressed by the current line
    current: Vec<char>,
    /// Tempo set before any voice was selected
    default_tempo: Option<u32>,
}

impl VoiceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the voice set, one voice per letter
    pub fn select(&mut self, letters: &str) {
        self.current = letters.chars().collect();
    }

    /// Check if the first selected voice is the noise channel
    pub fn is_noise(&self) -> bool {
        self.current.first() == Some(&NOISE_VOICE)
    }

    /// State of the first selected voice
    pub fn state(&self) -> Option<&VoiceState> {
        self.current.first().and_then(|v| self.voices.get(v))
    }

    /// Apply `f` to every selected voice, creating states as needed
    pub fn update<F>(&mut self, f: F)
    where
        F: Fn(&mut VoiceState),
    {
        for voice in &self.current {
            f(self.voices.entry(*voice).or_default());
        }
    }

    pub fn get(&self, voice: char) -> Option<&VoiceState> {
        self.voices.get(&voice)
    }

    pub fn octave(&self) -> Option<i32> {
        self.state().and_then(|s| s.octave)
    }

    pub fn set_octave(&mut self, octave: i32) {
        self.update(|s| s.octave = Some(octave));
    }

    pub fn set_tempo(&mut self, tempo: u32) {
        if self.current.is_empty() {
            self.default_tempo = Some(tempo);
        }
        self.update(|s| s.tempo = Some(tempo));
    }

    /// Tempo of the first selected voice, or the default tempo
    pub fn tempo(&self) -> Option<u32> {
        self.state()
            .and_then(|s| s.tempo)
            .or(self.default_tempo)
    }

    pub fn instruments(&self) -> Vec<String> {
        self.state()
            .map(|s| s.instruments.clone())
            .unwrap_or_default()
    }

    pub fn set_instruments(&mut self, names: &[String]) {
        self.update(|s| s.instruments = names.to_vec());
    }

    pub fn slide(&self) -> Option<&SlideRequest> {
        self.state().and_then(|s| s.slide.as_ref())
    }

    pub fn set_slide(&mut self, slide: Option<SlideRequest>) {
        self.update(|s| s.slide = slide.clone());
    }
}

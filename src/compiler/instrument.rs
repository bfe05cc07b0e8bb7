//! Instrument definitions
//!
//! An instrument is a named bundle of macro bodies. Activating it on a voice
//! emits the macro tokens that differ from what the voice already has;
//! ending it switches off the pitch, arpeggio and vibrato macros it set.

use super::channel::VoiceTracker;
use super::envelope::Adsr;
use super::macros::{MacroAllocator, MacroKind};
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Name that ends the active instruments instead of starting one
pub const END_KEYWORD: &str = "end";

lazy_static! {
    static ref EXTENDS: Regex = Regex::new(r#"^@extends\s+(?:"([^"]*)"|'([^']*)')$"#).unwrap();
}

/// Instrument with inheritance resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Instrument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timbre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arpeggio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibrato: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantize: Option<String>,
}

impl Instrument {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn macro_body(&self, kind: MacroKind) -> Option<&str> {
        match kind {
            MacroKind::Timbre => self.timbre.as_deref(),
            MacroKind::Volume => self.volume.as_deref(),
            MacroKind::Pitch => self.pitch.as_deref(),
            MacroKind::Arpeggio => self.arpeggio.as_deref(),
            MacroKind::Vibrato => self.vibrato.as_deref(),
        }
    }

    /// Copy of `self` with unset fields taken from `parent`
    pub fn inherit(&self, parent: &Instrument) -> Instrument {
        let pick = |own: &Option<String>, theirs: &Option<String>| {
            own.clone().or_else(|| theirs.clone())
        };
        Instrument {
            name: self.name.clone(),
            timbre: pick(&self.timbre, &parent.timbre),
            volume: pick(&self.volume, &parent.volume),
            pitch: pick(&self.pitch, &parent.pitch),
            arpeggio: pick(&self.arpeggio, &parent.arpeggio),
            vibrato: pick(&self.vibrato, &parent.vibrato),
            quantize: pick(&self.quantize, &parent.quantize),
        }
    }

    /// Words activating this instrument on the selected voices
    pub fn start(&self, voices: &mut VoiceTracker, macros: &mut MacroAllocator) -> Vec<String> {
        let mut words = Vec::new();

        for kind in MacroKind::ALL {
            let Some(body) = self.macro_body(kind) else {
                continue;
            };
            let token = macros.token_for(kind, body);
            let last = voices.state().and_then(|s| s.macro_token(kind));
            if last != Some(token.as_str()) {
                voices.update(|s| s.set_macro(kind, Some(token.clone())));
                words.push(token);
            }
        }

        if let Some(q) = &self.quantize {
            let token = format!("q{}", q);
            let last = voices.state().and_then(|s| s.quantize.as_deref());
            if last != Some(token.as_str()) {
                voices.update(|s| s.quantize = Some(token.clone()));
                words.push(token);
            }
        }

        words
    }

    /// Words switching off this instrument's pitch, arpeggio and vibrato
    pub fn end(&self, voices: &mut VoiceTracker) -> Vec<String> {
        let mut words = Vec::new();
        for kind in MacroKind::ALL {
            if let (Some(_), Some(off)) = (self.macro_body(kind), kind.off_name()) {
                voices.update(|s| s.set_macro(kind, None));
                words.push(off.to_string());
            }
        }
        words
    }
}

/// Instrument as written, possibly extending another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentDef {
    pub instrument: Instrument,
    pub extends: Option<String>,
}

impl InstrumentDef {
    /// Parse the indented `field: value` lines of an instrument block
    pub fn parse(name: &str, lines: &[&str]) -> Result<Self> {
        if name == END_KEYWORD {
            return Err(Error::ReservedInstrument(name.to_string()));
        }

        let mut def = InstrumentDef {
            instrument: Instrument::new(name),
            extends: None,
        };

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = EXTENDS.captures(line) {
                let parent = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                def.extends = Some(parent.to_string());
                continue;
            }

            let (key, value) = line.split_once(':').ok_or_else(|| Error::Instrument {
                name: name.to_string(),
                message: format!("expected 'field: value', found '{}'", line),
            })?;
            let value = value.trim().to_string();
            let inst = &mut def.instrument;

            match key.trim() {
                "timbre" => inst.timbre = Some(value),
                "volume" => inst.volume = Some(value),
                "adsr" => inst.volume = Some(Adsr::parse(&value)?.to_volume()),
                "pitch" => inst.pitch = Some(value),
                "arpeggio" => inst.arpeggio = Some(value),
                "vibrato" => inst.vibrato = Some(value),
                "q" | "quantize" => inst.quantize = Some(value),
                other => log::warn!("instrument '{}': ignoring unknown field '{}'", name, other),
            }
        }

        Ok(def)
    }
}

/// Resolve inheritance for every definition
///
/// Parents are resolved before their children. Unknown parents and cycles
/// are errors.
pub fn resolve_all(defs: Vec<InstrumentDef>) -> Result<BTreeMap<String, Instrument>> {
    let defs: BTreeMap<String, InstrumentDef> = defs
        .into_iter()
        .map(|d| (d.instrument.name.clone(), d))
        .collect();

    let mut resolved = BTreeMap::new();
    for name in defs.keys() {
        resolve_one(name, &defs, &mut resolved, &mut Vec::new())?;
    }
    Ok(resolved)
}

fn resolve_one(
    name: &str,
    defs: &BTreeMap<String, InstrumentDef>,
    resolved: &mut BTreeMap<String, Instrument>,
    chain: &mut Vec<String>,
) -> Result<Instrument> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }

    if chain.iter().any(|n| n == name) {
        chain.push(name.to_string());
        return Err(Error::InheritanceCycle(chain.join(" -> ")));
    }

    let def = &defs[name];
    let instrument = match &def.extends {
        None => def.instrument.clone(),
        Some(parent) => {
            if !defs.contains_key(parent) {
                return Err(Error::UnknownParent {
                    name: name.to_string(),
                    parent: parent.clone(),
                });
            }
            chain.push(name.to_string());
            let parent = resolve_one(parent, defs, resolved, chain)?;
            chain.pop();
            def.instrument.inherit(&parent)
        }
    };

    resolved.insert(name.to_string(), instrument.clone());
    Ok(instrument)
}

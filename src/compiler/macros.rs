//! Macro numbering and definition rendering
//!
//! Every distinct macro body gets one index per kind. Instruments and slides
//! that produce the same body share the index, so each body is defined once.

use std::collections::HashMap;
use std::fmt::Write;

/// First index handed out; lower numbers are left for hand-written macros
pub const DEFAULT_COUNTER_SEED: u32 = 20;

/// Number of macro kinds
pub const MACRO_KINDS: usize = 5;

/// Macro kinds an instrument can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MacroKind {
    Timbre = 0,   // @@ @
    Volume = 1,   // @v
    Pitch = 2,    // EP @EP
    Arpeggio = 3, // EN @EN
    Vibrato = 4,  // MP @MP
}

impl MacroKind {
    /// Kinds in emission and render order
    pub const ALL: [MacroKind; MACRO_KINDS] = [
        Self::Timbre,
        Self::Volume,
        Self::Pitch,
        Self::Arpeggio,
        Self::Vibrato,
    ];

    /// Command name used in a channel line (`@v20`)
    pub fn stat_name(&self) -> &'static str {
        match self {
            Self::Timbre => "@@",
            Self::Volume => "@v",
            Self::Pitch => "EP",
            Self::Arpeggio => "EN",
            Self::Vibrato => "MP",
        }
    }

    /// Name used in a macro definition line (`@EP20 = { ... }`)
    pub fn dyn_name(&self) -> &'static str {
        match self {
            Self::Timbre => "@",
            Self::Volume => "@v",
            Self::Pitch => "@EP",
            Self::Arpeggio => "@EN",
            Self::Vibrato => "@MP",
        }
    }

    /// Token that switches the macro off, for kinds that have one
    pub fn off_name(&self) -> Option<&'static str> {
        match self {
            Self::Pitch => Some("EPOF"),
            Self::Arpeggio => Some("ENOF"),
            Self::Vibrato => Some("MPOF"),
            Self::Timbre | Self::Volume => None,
        }
    }

    /// Channel-line token for a macro index
    pub fn token(&self, index: u32) -> String {
        format!("{}{}", self.stat_name(), index)
    }
}

/// Index table for one macro kind
#[derive(Debug, Clone)]
struct MacroTable {
    next: u32,
    indices: HashMap<String, u32>,
    /// Bodies in allocation (= ascending index) order
    bodies: Vec<(u32, String)>,
}

impl MacroTable {
    fn new(seed: u32) -> Self {
        Self {
            next: seed,
            indices: HashMap::new(),
            bodies: Vec::new(),
        }
    }
}

/// Per-run macro index allocator
#[derive(Debug, Clone)]
pub struct MacroAllocator {
    tables: [MacroTable; MACRO_KINDS],
}

impl MacroAllocator {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_COUNTER_SEED)
    }

    pub fn with_seed(seed: u32) -> Self {
        Self {
            tables: std::array::from_fn(|_| MacroTable::new(seed)),
        }
    }

    /// Drop every allocation and restart all counters at `seed`
    pub fn reseed(&mut self, seed: u32) {
        *self = Self::with_seed(seed);
    }

    /// Index for `body`, allocating the next one on first sight
    pub fn index_for(&mut self, kind: MacroKind, body: &str) -> u32 {
        let table = &mut self.tables[kind as usize];
        if let Some(&index) = table.indices.get(body) {
            return index;
        }

        let index = table.next;
        table.next += 1;
        table.indices.insert(body.to_string(), index);
        table.bodies.push((index, body.to_string()));
        index
    }

    /// Channel-line token for `body`, allocating if needed
    pub fn token_for(&mut self, kind: MacroKind, body: &str) -> String {
        kind.token(self.index_for(kind, body))
    }

    /// Check if any macro has been allocated this run
    pub fn is_used(&self) -> bool {
        self.tables.iter().any(|t| !t.bodies.is_empty())
    }

    /// Allocated bodies of one kind in ascending index order
    pub fn bodies(&self, kind: MacroKind) -> impl Iterator<Item = (u32, &str)> {
        self.tables[kind as usize]
            .bodies
            .iter()
            .map(|(i, b)| (*i, b.as_str()))
    }

    /// Render all definitions, one line each
    pub fn render(&self) -> String {
        let mut out = String::new();
        for kind in MacroKind::ALL {
            for (index, body) in self.bodies(kind) {
                let _ = writeln!(out, "{}{} = {{ {} }}", kind.dyn_name(), index, body);
            }
        }
        out
    }
}

impl Default for MacroAllocator {
    fn default() -> Self {
        Self::new()
    }
}

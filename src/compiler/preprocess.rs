//! Source preprocessing
//!
//! Runs before any word is rewritten: strips comments, inlines imports,
//! collects directives and variables, and pulls instrument blocks out of the
//! text.

use super::instrument::{self, Instrument, InstrumentDef};
use super::macros::DEFAULT_COUNTER_SEED;
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Extension of extended MML sources
pub const SOURCE_EXTENSION: &str = "mmlx";

/// Directives with this prefix configure the compiler and are not emitted
pub const INTERNAL_PREFIX: &str = "X-";
pub const ABSOLUTE_NOTES: &str = "X-ABSOLUTE-NOTES";
pub const TRANSPOSE: &str = "X-TRANSPOSE";
pub const COUNTER: &str = "X-COUNTER";

/// Largest transposition accepted, in semitones (eight octaves)
pub const MAX_TRANSPOSE: i32 = 96;

lazy_static! {
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref SEMICOLON_COMMENT: Regex = Regex::new(r"(?m) *;.*$").unwrap();
    static ref SLASH_COMMENT: Regex = Regex::new(r"(?m) *//.*$").unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n{2,}").unwrap();
    static ref SPACES: Regex = Regex::new(r" {2,}").unwrap();
    static ref IMPORT: Regex =
        Regex::new(r#"(?m)^[ \t]*@import[ \t]+(?:"([^"]*)"|'([^']*)')[ \t]*$"#).unwrap();
    static ref GLOBAL: Regex = Regex::new(r"^#([A-Z][-A-Z0-9]*)(?: +(.*))?$").unwrap();
    static ref LOCAL: Regex = Regex::new(r"^([a-zA-Z][a-zA-Z0-9_]*)\s*=\s*(.*)$").unwrap();
    static ref LABEL: Regex = Regex::new(r"^([a-zA-Z0-9_-]+): *$").unwrap();
    static ref RESERVED: Vec<Regex> = [
        r"^[A-Z]{1,2}$",
        r"^v\d+$",
        r"^r\d+$",
        r"^w\d+$",
        r"^EP\d+$",
        r"^EN\d+$",
        r"^SD\d+$",
        r"^(EPOF|ENOF|SDOF|w|r)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();
}

/// Supplies the text of imported files
pub trait ImportResolver {
    /// Return the contents of `file` (extension already applied)
    fn resolve(&self, file: &str) -> Result<String>;
}

/// Reads imports from a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    dir: PathBuf,
}

impl DirectoryResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ImportResolver for DirectoryResolver {
    fn resolve(&self, file: &str) -> Result<String> {
        let path = self.dir.join(file);
        fs::read_to_string(&path).map_err(|source| Error::Import { path, source })
    }
}

/// Directives found in the source
#[derive(Debug, Clone, Default)]
pub struct Globals {
    /// Every directive by name; flags without a value map to ""
    pub entries: BTreeMap<String, String>,
    /// Semitones added to every note
    pub transpose: i32,
    /// Notes carry their octave (`c4`, `a+3,8`)
    pub absolute_notes: bool,
    /// Macro counter restart requested by `#X-COUNTER`
    pub counter_seed: Option<u32>,
}

impl Globals {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|s| s.as_str())
    }
}

/// Local variables in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    entries: Vec<(String, String)>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Output of the preprocessing stage
#[derive(Debug, Clone, Default)]
pub struct Preprocessed {
    pub text: String,
    pub globals: Globals,
    pub variables: Variables,
    pub instruments: BTreeMap<String, Instrument>,
}

/// Run every preprocessing step over `raw`
pub fn preprocess(raw: &str, resolver: &dyn ImportResolver) -> Result<Preprocessed> {
    let text = raw.replace("\r\n", "\n");

    log::debug!("- stripping comments");
    let text = strip_comments(&text);

    log::debug!("- processing imports");
    let text = resolve_imports(&text, resolver)?;

    log::debug!("- stripping comments again");
    let text = strip_comments(&text);

    log::debug!("- parsing variables");
    let (text, globals) = extract_globals(&text)?;
    let (text, variables) = extract_locals(&text)?;

    log::debug!("- applying variables");
    let text = substitute(&text, &variables);

    log::debug!("- parsing instruments");
    let (text, defs) = extract_instruments(&text)?;
    let instruments = instrument::resolve_all(defs)?;

    log::debug!("- collapsing spaces");
    let text = collapse_spaces(&text);

    Ok(Preprocessed {
        text,
        globals,
        variables,
        instruments,
    })
}

/// Remove `/* */`, `;` and `//` comments, then squeeze blank lines
pub fn strip_comments(text: &str) -> String {
    let text = BLOCK_COMMENT.replace_all(text, "");
    let text = SEMICOLON_COMMENT.replace_all(&text, "");
    let text = SLASH_COMMENT.replace_all(&text, "");
    remove_blank_lines(&text)
}

pub fn remove_blank_lines(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n").into_owned()
}

pub fn collapse_spaces(text: &str) -> String {
    SPACES.replace_all(text, " ").into_owned()
}

/// Replace each `@import "file"` line with the file's contents
///
/// Imports inside imported text are left as they are.
pub fn resolve_imports(text: &str, resolver: &dyn ImportResolver) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in IMPORT.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        let file = if name.ends_with(&format!(".{}", SOURCE_EXTENSION)) {
            name.to_string()
        } else {
            format!("{}.{}", name, SOURCE_EXTENSION)
        };

        out.push_str(&text[last..whole.start()]);
        out.push_str(&resolver.resolve(&file)?);
        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Collect `#NAME value` directives, dropping the internal ones from the text
pub fn extract_globals(text: &str) -> Result<(String, Globals)> {
    let mut globals = Globals::default();
    let mut out = String::with_capacity(text.len());

    for line in text.split_inclusive('\n') {
        let Some(caps) = GLOBAL.captures(line.trim_end_matches('\n')) else {
            out.push_str(line);
            continue;
        };

        let name = caps[1].to_string();
        let value = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
        let invalid = || Error::Directive {
            name: name.clone(),
            value: value.clone(),
        };

        match name.as_str() {
            TRANSPOSE => {
                globals.transpose = if value.is_empty() {
                    0
                } else {
                    value
                        .parse::<i32>()
                        .ok()
                        .filter(|t| t.unsigned_abs() <= MAX_TRANSPOSE.unsigned_abs())
                        .ok_or_else(invalid)?
                };
            }
            ABSOLUTE_NOTES => globals.absolute_notes = true,
            COUNTER => {
                globals.counter_seed = Some(if value.is_empty() {
                    DEFAULT_COUNTER_SEED
                } else {
                    value.parse().map_err(|_| invalid())?
                });
            }
            _ => {}
        }

        if !name.starts_with(INTERNAL_PREFIX) {
            out.push_str(line);
        }
        globals.entries.insert(name, value);
    }

    Ok((out, globals))
}

/// Check if a variable name would shadow an MML command
pub fn is_reserved(name: &str) -> bool {
    RESERVED.iter().any(|r| r.is_match(name))
}

/// Collect and remove `name = value` lines
pub fn extract_locals(text: &str) -> Result<(String, Variables)> {
    let mut vars = Variables::new();
    let mut out = String::with_capacity(text.len());

    for line in text.split_inclusive('\n') {
        match LOCAL.captures(line.trim_end_matches('\n')) {
            Some(caps) => {
                if is_reserved(&caps[1]) {
                    return Err(Error::ReservedVariable(caps[1].to_string()));
                }
                vars.set(&caps[1], caps[2].trim_end());
            }
            None => out.push_str(line),
        }
    }

    Ok((out, vars))
}

/// Replace every standalone occurrence of each variable with its value
pub fn substitute(text: &str, vars: &Variables) -> String {
    let mut text = text.to_string();
    for (name, value) in vars.iter() {
        text = replace_word(&text, name, value);
    }
    text
}

/// Replace `name` where it is preceded by whitespace, `[` or the start of
/// text and followed by whitespace, `]` or the end of text
fn replace_word(text: &str, name: &str, value: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (start, _) in text.match_indices(name) {
        if start < last {
            continue;
        }
        let end = start + name.len();
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || c == '[');
        let after_ok = text[end..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || c == ']');

        if before_ok && after_ok {
            out.push_str(&text[last..start]);
            out.push_str(value);
            last = end;
        }
    }

    out.push_str(&text[last..]);
    out
}

fn is_indented(line: &str) -> bool {
    line.starts_with('\t') || line.starts_with("    ")
}

/// Pull `name:` blocks followed by indented field lines out of the text
pub fn extract_instruments(text: &str) -> Result<(String, Vec<InstrumentDef>)> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut kept = Vec::with_capacity(lines.len());
    let mut defs = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let label = LABEL.captures(lines[i]);
        let has_body = lines.get(i + 1).map_or(false, |l| is_indented(l));

        match label {
            Some(caps) if has_body => {
                let mut end = i + 1;
                while end < lines.len() && is_indented(lines[end]) {
                    end += 1;
                }
                defs.push(InstrumentDef::parse(&caps[1], &lines[i + 1..end])?);
                i = end;
            }
            _ => {
                kept.push(lines[i]);
                i += 1;
            }
        }
    }

    Ok((kept.join("\n"), defs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MemoryResolver(HashMap<&'static str, &'static str>);

    impl ImportResolver for MemoryResolver {
        fn resolve(&self, file: &str) -> Result<String> {
            self.0.get(file).map(|s| s.to_string()).ok_or_else(|| Error::Import {
                path: PathBuf::from(file),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    fn no_imports() -> MemoryResolver {
        MemoryResolver(HashMap::new())
    }

    #[test]
    fn test_strip_comments() {
        let src = "A c d ; first\n/* multi\nline */\nB e f // second\n\n\nC g\n";
        assert_eq!(strip_comments(src), "A c d\nB e f\nC g\n");
    }

    #[test]
    fn test_imports_add_extension_and_stay_single_level() {
        let resolver = MemoryResolver(HashMap::from([
            ("drums.mmlx", "D c d\n@import \"more\""),
            ("bass.mmlx", "B c\n"),
        ]));
        let text = "@import \"drums\"\n@import 'bass.mmlx'\nA c\n";
        let out = resolve_imports(text, &resolver).unwrap();
        assert_eq!(out, "D c d\n@import \"more\"\nB c\n\nA c\n");
    }

    #[test]
    fn test_missing_import_is_fatal() {
        let err = resolve_imports("@import \"gone\"\n", &no_imports()).unwrap_err();
        assert!(matches!(err, Error::Import { .. }));
    }

    #[test]
    fn test_globals() {
        let text = "#TITLE Song\n#X-TRANSPOSE -3\n#X-ABSOLUTE-NOTES\n#EX-NAMCO106 8\nA c\n";
        let (out, globals) = extract_globals(text).unwrap();
        assert_eq!(out, "#TITLE Song\n#EX-NAMCO106 8\nA c\n");
        assert_eq!(globals.transpose, -3);
        assert!(globals.absolute_notes);
        assert_eq!(globals.get("TITLE"), Some("Song"));
        assert_eq!(globals.counter_seed, None);
    }

    #[test]
    fn test_transpose_is_bounded() {
        let (_, globals) = extract_globals("#X-TRANSPOSE -96\n").unwrap();
        assert_eq!(globals.transpose, -MAX_TRANSPOSE);
        for value in ["97", "-97", "2147483647", "-2147483648"] {
            let text = format!("#X-TRANSPOSE {}\n", value);
            assert!(matches!(
                extract_globals(&text),
                Err(Error::Directive { .. })
            ));
        }
    }

    #[test]
    fn test_counter_directive() {
        let (_, globals) = extract_globals("#X-COUNTER 40\n").unwrap();
        assert_eq!(globals.counter_seed, Some(40));
        let (_, globals) = extract_globals("#X-COUNTER\n").unwrap();
        assert_eq!(globals.counter_seed, Some(DEFAULT_COUNTER_SEED));
        assert!(matches!(
            extract_globals("#X-TRANSPOSE up\n"),
            Err(Error::Directive { .. })
        ));
    }

    #[test]
    fn test_reserved_names() {
        for name in ["A", "AB", "v1", "r8", "w16", "EP3", "EN0", "SD2", "EPOF", "w", "r"] {
            assert!(is_reserved(name), "{} should be reserved", name);
        }
        for name in ["ABC", "lead", "v", "riff", "EPX", "bass2"] {
            assert!(!is_reserved(name), "{} should not be reserved", name);
        }
        assert!(matches!(
            extract_locals("AB = c d e\n"),
            Err(Error::ReservedVariable(_))
        ));
    }

    #[test]
    fn test_locals_are_removed_and_substituted() {
        let (text, vars) = extract_locals("riff = c d e\nbeat=[c8 d8]2\nA riff [riff] riffs\n").unwrap();
        assert_eq!(text, "A riff [riff] riffs\n");
        assert_eq!(vars.get("riff"), Some("c d e"));
        assert_eq!(vars.get("beat"), Some("[c8 d8]2"));
        assert_eq!(substitute(&text, &vars), "A c d e [c d e] riffs\n");
    }

    #[test]
    fn test_substitute_boundaries() {
        let mut vars = Variables::new();
        vars.set("x", "e");
        assert_eq!(substitute("x c[x] ax xa\tx", &vars), "e c[e] ax xa\te");
    }

    #[test]
    fn test_extract_instruments() {
        let text = "#TITLE t\nlead:\n    volume: 10 9 8\n\tpitch: 1 1 0\nsolo:\n    @extends \"lead\"\nA @lead c\n";
        let (out, defs) = extract_instruments(text).unwrap();
        assert_eq!(out, "#TITLE t\nA @lead c\n");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].instrument.pitch.as_deref(), Some("1 1 0"));
        assert_eq!(defs[1].extends.as_deref(), Some("lead"));
    }

    #[test]
    fn test_label_without_body_is_kept() {
        let (out, defs) = extract_instruments("intro:\nA c\n").unwrap();
        assert_eq!(out, "intro:\nA c\n");
        assert!(defs.is_empty());
    }

    #[test]
    fn test_preprocess() {
        let resolver = MemoryResolver(HashMap::from([(
            "inst.mmlx",
            "lead: ; the lead\n    volume: vol\n",
        )]));
        let src = "#TITLE x\n#X-TRANSPOSE 2\nvol = 15 12\n@import \"inst\"\nA  @lead   c\n";
        let pre = preprocess(src, &resolver).unwrap();
        assert_eq!(pre.text, "#TITLE x\nA @lead c\n");
        assert_eq!(pre.globals.transpose, 2);
        assert_eq!(pre.variables.get("vol"), Some("15 12"));
        assert_eq!(pre.instruments["lead"].volume.as_deref(), Some("15 12"));
    }

    #[test]
    fn test_preprocess_rejects_end_instrument() {
        let src = "end:\n    volume: 1\n";
        assert!(matches!(
            preprocess(src, &no_imports()),
            Err(Error::ReservedInstrument(_))
        ));
    }
}

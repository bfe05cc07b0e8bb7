//! MMLX compiler - expands extended MML into plain ppmck MML
//!
//! A compile runs in three stages: the source is preprocessed (comments,
//! imports, variables, instrument blocks), every remaining line is rewritten
//! word by word, and the result is post-processed (macro definitions are
//! injected and redundant octave shifts removed).

pub mod channel;
pub mod envelope;
pub mod instrument;
pub mod macros;
pub mod note;
pub mod preprocess;
pub mod slide;
pub mod word;

use crate::error::{Error, Result};
use channel::VoiceTracker;
use instrument::Instrument;
use macros::MacroAllocator;
use preprocess::{
    collapse_spaces, remove_blank_lines, DirectoryResolver, Globals, ImportResolver,
    SOURCE_EXTENSION,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use word::WordDispatcher;

/// Where a compile looks for files
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Directory `@import` paths are relative to
    pub import_dir: PathBuf,
    /// File or directory being compiled; sample paths are relative to it
    pub start: PathBuf,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            import_dir: PathBuf::from("."),
            start: PathBuf::from("."),
        }
    }
}

impl CompileOptions {
    /// Directory `.dmc` sample paths are rewritten against
    pub fn sample_dir(&self) -> PathBuf {
        if self.start.is_dir() {
            self.start.clone()
        } else {
            self.start
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        }
    }
}

/// Number of `> <` collapse passes needed for a transposition
///
/// Each wrapped note adds at most one shift pair per octave crossed.
pub fn collapse_passes(transpose: i32) -> usize {
    (transpose.unsigned_abs() as usize).div_ceil(12) + 1
}

/// Main compiler state
pub struct Compiler {
    pub options: CompileOptions,
    /// Directives of the last compile
    globals: Globals,
    /// Resolved instruments of the last compile
    instruments: BTreeMap<String, Instrument>,
    /// Generated macro definitions
    macros: MacroAllocator,
    /// Per-voice state
    voices: VoiceTracker,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            globals: Globals::default(),
            instruments: BTreeMap::new(),
            macros: MacroAllocator::new(),
            voices: VoiceTracker::new(),
        }
    }

    fn reset(&mut self) {
        self.globals = Globals::default();
        self.instruments.clear();
        self.macros = MacroAllocator::new();
        self.voices = VoiceTracker::new();
    }

    /// Compile source text, reading imports from `options.import_dir`
    pub fn compile(&mut self, source: &str) -> Result<String> {
        let resolver = DirectoryResolver::new(self.options.import_dir.clone());
        self.compile_with(source, &resolver)
    }

    /// Compile source text with a custom import resolver
    pub fn compile_with(&mut self, source: &str, resolver: &dyn ImportResolver) -> Result<String> {
        self.reset();

        let pre = preprocess::preprocess(source, resolver)?;
        if let Some(seed) = pre.globals.counter_seed {
            self.macros.reseed(seed);
        }
        self.globals = pre.globals;
        self.instruments = pre.instruments;

        log::debug!("- processing words");
        let sample_dir = self.options.sample_dir();
        let mut dispatcher = WordDispatcher::new(
            &self.globals,
            &self.instruments,
            &mut self.voices,
            &mut self.macros,
            &sample_dir,
        );
        let lines = pre
            .text
            .split('\n')
            .map(|line| dispatcher.process_line(line))
            .collect::<Result<Vec<_>>>()?;

        Ok(self.post_process(lines))
    }

    /// Inject macro definitions and tidy the rewritten lines
    fn post_process(&self, mut lines: Vec<String>) -> String {
        if self.macros.is_used() {
            log::debug!("- adding macros");
            // definitions go after the last directive line
            let at = lines
                .iter()
                .rposition(|l| l.starts_with('#'))
                .map_or(0, |i| i + 1);
            let tail = lines.split_off(at);
            lines.extend(self.macros.render().lines().map(String::from));
            lines.extend(tail);
        }

        let mut text = lines.join("\n");

        log::debug!("- replacing unnecessary octave shifts");
        for _ in 0..collapse_passes(self.globals.transpose) {
            text = collapse_spaces(&text);
            text = text.replace("> <", "").replace("< >", "");
        }

        log::debug!("- removing blank lines");
        remove_blank_lines(&collapse_spaces(&text))
    }

    /// Compile MMLX file to MML output
    ///
    /// Imports are resolved relative to the input's directory.
    pub fn compile_file(&mut self, input: &Path, output: &Path) -> Result<()> {
        self.options.import_dir = input.parent().map(Path::to_path_buf).unwrap_or_default();

        log::info!("processing file: {}", input.display());
        let source = fs::read_to_string(input).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open '{}': {}", input.display(), e),
            ))
        })?;

        let out = self.compile(&source)?;

        log::info!("generating file: {}", output.display());
        fs::write(output, out)?;
        Ok(())
    }

    /// Instruments resolved by the last compile
    pub fn instruments(&self) -> &BTreeMap<String, Instrument> {
        &self.instruments
    }

    /// Directives found by the last compile
    pub fn globals(&self) -> &Globals {
        &self.globals
    }
}

/// Compile every `.mmlx` file in `dir` into `.mml` files in `output`
///
/// Each file gets a fresh compiler. Failures are logged and the remaining
/// files are still compiled; the count of failures is returned as an error.
pub fn compile_directory(dir: &Path, output: &Path) -> Result<usize> {
    fs::create_dir_all(output)?;

    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == SOURCE_EXTENSION))
        .collect();
    inputs.sort();

    let mut failed = 0;
    for input in &inputs {
        let Some(stem) = input.file_stem() else {
            continue;
        };
        let target = output.join(format!("{}.mml", stem.to_string_lossy()));
        let mut compiler = Compiler::new(CompileOptions {
            start: dir.to_path_buf(),
            ..CompileOptions::default()
        });
        if let Err(e) = compiler.compile_file(input, &target) {
            log::error!("{}: {}", input.display(), e);
            failed += 1;
        }
    }

    log::info!("compiled {} of {} files", inputs.len() - failed, inputs.len());
    if failed > 0 {
        return Err(Error::Failed(failed));
    }
    Ok(inputs.len())
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Sources(HashMap<&'static str, &'static str>);

    impl ImportResolver for Sources {
        fn resolve(&self, file: &str) -> Result<String> {
            self.0.get(file).map(|s| s.to_string()).ok_or_else(|| Error::Import {
                path: PathBuf::from(file),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    fn compile(source: &str) -> Result<String> {
        Compiler::default().compile_with(source, &Sources(HashMap::new()))
    }

    #[test]
    fn test_collapse_passes() {
        assert_eq!(collapse_passes(0), 1);
        assert_eq!(collapse_passes(1), 2);
        assert_eq!(collapse_passes(-12), 2);
        assert_eq!(collapse_passes(13), 3);
    }

    #[test]
    fn test_plain_mml_is_unchanged() {
        assert_eq!(compile("t120\nA\no4 c d e\n").unwrap(), "t120\nA\no4 c d e\n");
    }

    #[test]
    fn test_instrument_block_is_injected_after_directives() {
        let src = "#TITLE test\nlead:\n    volume: 10 9 8\n    pitch: 1 1 0\nA @lead c d @end\n";
        assert_eq!(
            compile(src).unwrap(),
            "#TITLE test\n@v20 = { 10 9 8 }\n@EP20 = { 1 1 0 }\nA @v20 EP20 c d EPOF\n"
        );
    }

    #[test]
    fn test_macros_go_first_without_directives() {
        let src = "pad:\n    arpeggio: 0 4 7\nA @pad c\n";
        assert_eq!(compile(src).unwrap(), "@EN20 = { 0 4 7 }\nA EN20 c\n");
    }

    #[test]
    fn test_counter_directive_moves_numbering() {
        let src = "#X-COUNTER 40\nlead:\n    volume: 3 2 1\nA @lead c\n";
        assert_eq!(compile(src).unwrap(), "@v40 = { 3 2 1 }\nA @v40 c\n");
    }

    #[test]
    fn test_transpose_collapses_shifts() {
        let src = "#X-TRANSPOSE 1\nA o4 b b c\n";
        assert_eq!(compile(src).unwrap(), "A o4 > c c < c+\n");
    }

    #[test]
    fn test_transpose_past_an_octave_needs_several_passes() {
        let src = "#X-TRANSPOSE 14\nA o4 b b\n";
        assert_eq!(compile(src).unwrap(), "A o4 > > c+ c+ <<\n");
    }

    #[test]
    fn test_out_of_range_transpose_is_rejected() {
        let src = "#X-TRANSPOSE 2147483647\nA o4 b\n";
        assert!(matches!(compile(src), Err(Error::Directive { .. })));
    }

    #[test]
    fn test_variables_and_imports() {
        let sources = Sources(HashMap::from([("riffs.mmlx", "riff = c d e\n")]));
        let src = "@import \"riffs\"\nA o4 riff [riff]2\n";
        let out = Compiler::default().compile_with(src, &sources).unwrap();
        assert_eq!(out, "A o4 c d e [c d e]2\n");
    }

    #[test]
    fn test_state_is_reset_between_compiles() {
        let mut compiler = Compiler::default();
        let resolver = Sources(HashMap::new());
        let src = "lead:\n    volume: 3 2 1\nA @lead c\n";
        let first = compiler.compile_with(src, &resolver).unwrap();
        let second = compiler.compile_with(src, &resolver).unwrap();
        assert_eq!(first, second);
        assert_eq!(compiler.instruments().len(), 1);

        compiler
            .compile_with("#TITLE next\n#X-TRANSPOSE 3\n", &resolver)
            .unwrap();
        assert!(compiler.instruments().is_empty());
        assert_eq!(compiler.globals().transpose, 3);
        assert_eq!(compiler.globals().get("TITLE"), Some("next"));
    }

    #[test]
    fn test_errors_are_fatal() {
        assert!(matches!(compile("A c4,8\n"), Err(Error::AbsoluteNotesDisabled(_))));
        assert!(matches!(compile("AB = c\n"), Err(Error::ReservedVariable(_))));
        assert!(matches!(
            compile("@import \"gone\"\n"),
            Err(Error::Import { .. })
        ));
    }
}

use clap::Parser;
use mmlx::compiler::compile_directory;
use mmlx::{CompileOptions, Compiler};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mmlx")]
#[command(version = "0.1.0")]
#[command(about = "MMLX to MML compiler", long_about = None)]
struct Args {
    /// Input MMLX file, or a directory of them
    input: PathBuf,

    /// Output MML file or directory (defaults to the input's location)
    output: Option<PathBuf>,

    /// Verbose logging; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the resolved instruments as JSON (single file only)
    #[arg(long)]
    dump_instruments: bool,
}

fn main() -> Result<(), mmlx::Error> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::Level::Info,
        1 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    if let Err(e) = simple_logger::init_with_level(level) {
        eprintln!("Warning: logging unavailable: {}", e);
    }

    if args.input.is_dir() {
        let output = args.output.unwrap_or_else(|| args.input.clone());
        compile_directory(&args.input, &output)?;
        return Ok(());
    }

    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("mml"));

    let mut compiler = Compiler::new(CompileOptions {
        start: args.input.clone(),
        ..CompileOptions::default()
    });
    compiler.compile_file(&args.input, &output)?;

    if args.dump_instruments {
        println!("{}", serde_json::to_string_pretty(compiler.instruments())?);
    }

    Ok(())
}

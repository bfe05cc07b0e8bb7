use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to import '{}': {source}", path.display())]
    Import {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Variable '{0}' is reserved")]
    ReservedVariable(String),

    #[error("'{0}' is a reserved word and cannot be used for an instrument")]
    ReservedInstrument(String),

    #[error("Instrument '{name}' extends unknown instrument '{parent}'")]
    UnknownParent { name: String, parent: String },

    #[error("Instrument inheritance cycle: {0}")]
    InheritanceCycle(String),

    #[error("Instrument '{name}': {message}")]
    Instrument { name: String, message: String },

    #[error("Invalid ADSR '{value}': {message}")]
    Adsr { value: String, message: String },

    #[error("Invalid #{name} value '{value}'")]
    Directive { name: String, value: String },

    #[error("In order to use absolute notes like '{0}' you have to specify #X-ABSOLUTE-NOTES")]
    AbsoluteNotesDisabled(String),

    #[error("Slide error: {0}")]
    Slide(String),

    #[error("{0} file(s) failed to compile")]
    Failed(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

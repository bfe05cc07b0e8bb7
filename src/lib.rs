pub mod compiler;
pub mod error;

pub use compiler::{CompileOptions, Compiler};
pub use error::Error;

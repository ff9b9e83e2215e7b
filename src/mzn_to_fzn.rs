//! Conversion of the model into each solver's native input.

pub mod cached_compiler;
pub mod compilation;

pub use compilation::convert_mzn;
use std::path::Path;
use tempfile::NamedTempFile;

/// Converted model files, deleted when dropped.
#[derive(Debug)]
pub struct Conversion {
    fzn_file: NamedTempFile,
    ozn_file: NamedTempFile,
}

impl Conversion {
    pub fn fzn(&self) -> &Path {
        self.fzn_file.path()
    }

    pub fn ozn(&self) -> &Path {
        self.ozn_file.path()
    }
}

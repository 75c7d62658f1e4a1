//! Error types shared across the validator

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures loading a proxy list from disk
#[derive(Debug, Error)]
pub enum InputError {
    /// Only plain `.txt` lists are accepted
    #[error("expected a .txt proxy list, got {0:?}")]
    WrongExtension(PathBuf),

    /// The file is missing, unreadable or not valid UTF-8
    #[error("cannot read proxy list {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a single input line did not produce a proxy record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("blank line")]
    Blank,

    #[error("comment line")]
    Comment,

    /// The line matched none of the accepted address grammars
    #[error("unrecognized proxy format")]
    Unrecognized,
}

/// Errors raised by a probe instead of a regular outcome
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The parser accepts up to five port digits; sockets do not
    #[error("port {0} is out of range")]
    PortOutOfRange(u32),

    #[error("failed to build proxied client: {0}")]
    Client(#[from] reqwest::Error),
}

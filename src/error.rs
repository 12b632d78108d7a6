use std::io;

use thiserror::Error;

/// Errors raised while building a corpus, training, or querying the table.
#[derive(Error, Debug)]
pub enum AlignmentError {
    /// The table was queried for a pair outside the declared vocabularies.
    #[error("no translation entry for ({source_token:?}, {target_token:?})")]
    MissingVocabularyEntry {
        source_token: String,
        target_token: String,
    },

    /// A target token collected no soft counts, so its column cannot be normalized.
    #[error("target token {token:?} never co-occurs with any source token")]
    DegenerateVocabulary { token: String },

    /// A sentence referenced a token missing from the supplied vocabulary.
    #[error("token {token:?} is not in the {side} vocabulary")]
    UnknownToken { token: String, side: &'static str },

    #[error("parallel corpus has {source_lines} source lines but {target_lines} target lines")]
    CorpusShape {
        source_lines: usize,
        target_lines: usize,
    },

    #[error("invalid value {value:?} for --{name}")]
    InvalidArgument { name: &'static str, value: String },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AlignmentError>;

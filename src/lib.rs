//! Word-to-word translation probabilities with IBM Model 1.
//!
//! A [`Corpus`] of sentence pairs is trained into a [`Model`] by
//! expectation-maximization ([`train`]), and the trained table then picks
//! the most likely target positions for every source position ([`align`]).

pub mod align;
pub mod args;
pub mod corpus;
pub mod error;
pub mod logging;
pub mod model;
pub mod report;
pub mod train;
pub mod vocab;

pub use align::{align, align_corpus, align_with_tolerance, Alignment};
pub use corpus::{Corpus, SentencePair, TokenizerConfig};
pub use error::{AlignmentError, Result};
pub use model::{Model, TranslationTable};
pub use train::{train, Trainer, TrainerConfig, TrainerState, TrainingOutcome};
pub use vocab::Vocabulary;

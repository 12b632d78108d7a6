use ndarray::{Array2, Zip};

use crate::align::{self, Alignment};
use crate::error::{AlignmentError, Result};
use crate::vocab::Vocabulary;

/// Dense translation probabilities t(h | e), rows indexed by source id and
/// columns by target id. Every pair of the cross-product has an entry.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslationTable {
    probs: Array2<f64>,
}

impl TranslationTable {
    /// Uniform start: every entry is `1 / source_len`.
    pub fn initialize(source_len: usize, target_len: usize) -> Self {
        let init = if source_len == 0 {
            0.
        } else {
            1. / (source_len as f64)
        };
        TranslationTable {
            probs: Array2::from_elem((source_len, target_len), init),
        }
    }

    pub fn from_array(probs: Array2<f64>) -> Self {
        TranslationTable { probs }
    }

    /// Probability for source id `e` and target id `h`.
    ///
    /// # Panics
    /// If either id is outside the table; callers guarantee membership.
    #[inline]
    pub fn get(&self, e: usize, h: usize) -> f64 {
        self.probs[[e, h]]
    }

    pub fn try_get(&self, e: usize, h: usize) -> Option<f64> {
        self.probs.get([e, h]).copied()
    }

    pub fn source_len(&self) -> usize {
        self.probs.nrows()
    }

    pub fn target_len(&self) -> usize {
        self.probs.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.probs
    }

    /// Euclidean distance to `other` over the whole cross-product.
    /// Zero for two empty tables.
    pub fn distance(&self, other: &TranslationTable) -> f64 {
        assert_eq!(self.probs.dim(), other.probs.dim(), "table shapes differ");
        let mut sum = 0.;
        Zip::from(&self.probs)
            .and(&other.probs)
            .for_each(|&a, &b| sum += (a - b) * (a - b));
        sum.sqrt()
    }
}

/// A trained table together with the vocabularies that index it.
#[derive(Clone, Debug)]
pub struct Model {
    pub table: TranslationTable,
    pub source_vocab: Vocabulary,
    pub target_vocab: Vocabulary,
}

impl Model {
    pub fn new(table: TranslationTable, source_vocab: Vocabulary, target_vocab: Vocabulary) -> Self {
        debug_assert_eq!(table.source_len(), source_vocab.len());
        debug_assert_eq!(table.target_len(), target_vocab.len());
        Model {
            table,
            source_vocab,
            target_vocab,
        }
    }

    /// t(target | source) looked up by token.
    pub fn probability(&self, source: &str, target: &str) -> Result<f64> {
        let missing = || AlignmentError::MissingVocabularyEntry {
            source_token: source.to_string(),
            target_token: target.to_string(),
        };
        let e = self.source_vocab.id(source).ok_or_else(missing)?;
        let h = self.target_vocab.id(target).ok_or_else(missing)?;
        self.table.try_get(e, h).ok_or_else(missing)
    }

    /// Aligns two token sequences, rejecting tokens the model has never seen.
    pub fn align_tokens<S: AsRef<str>>(&self, source: &[S], target: &[S]) -> Result<Alignment> {
        let missing = |s: &str, t: &str| AlignmentError::MissingVocabularyEntry {
            source_token: s.to_string(),
            target_token: t.to_string(),
        };
        let first = |toks: &[S]| toks.first().map(|t| t.as_ref().to_string()).unwrap_or_default();

        let source_ids = source
            .iter()
            .map(|t| {
                self.source_vocab
                    .id(t.as_ref())
                    .ok_or_else(|| missing(t.as_ref(), &first(target)))
            })
            .collect::<Result<Vec<_>>>()?;
        let target_ids = target
            .iter()
            .map(|t| {
                self.target_vocab
                    .id(t.as_ref())
                    .ok_or_else(|| missing(&first(source), t.as_ref()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(align::align(&source_ids, &target_ids, &self.table))
    }

    /// Every (source, target, probability) above `threshold`, row-major.
    pub fn entries_above(&self, threshold: f64) -> Vec<(&str, &str, f64)> {
        let mut out = Vec::new();
        for ((e, h), &p) in self.table.as_array().indexed_iter() {
            if p > threshold {
                if let (Some(s), Some(t)) = (self.source_vocab.token(e), self.target_vocab.token(h)) {
                    out.push((s, t, p));
                }
            }
        }
        out
    }
}

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use counter::Counter;
use nlp_tokenize::{Tokenizer, WhitespaceTokenizer};
use tracing::{debug, info};

use crate::error::{AlignmentError, Result};
use crate::vocab::Vocabulary;

/// One sentence pair, as vocabulary ids. Order and repeats are kept, since
/// alignment indices point at positions rather than at distinct words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentencePair {
    pub source: Vec<usize>,
    pub target: Vec<usize>,
}

/// Where each side of a sentence is cut off before tokenizing.
#[derive(Clone, Debug)]
pub struct TokenizerConfig {
    pub source_stops: Vec<char>,
    pub target_stops: Vec<char>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        TokenizerConfig {
            source_stops: vec!['.', '!', ',', '?'],
            target_stops: vec!['?', '!', ',', '।'],
        }
    }
}

/// Keeps the text up to the first stop character, then splits it on whitespace.
pub fn tokenize(sentence: &str, stops: &[char]) -> Vec<String> {
    let clause = sentence.split(|c: char| stops.contains(&c)).next().unwrap_or("");

    let tokenizer = WhitespaceTokenizer::new();
    let mut toks: Vec<String> = Vec::new();
    for bound in tokenizer.tokenize(clause) {
        let tok = &clause[bound.0..bound.1];
        if !tok.is_empty() {
            toks.push(String::from(tok));
        }
    }

    toks
}

/// Sentence pairs together with the vocabularies they are encoded against.
#[derive(Clone, Debug, Default)]
pub struct Corpus {
    pub source_vocab: Vocabulary,
    pub target_vocab: Vocabulary,
    pub pairs: Vec<SentencePair>,
    /// Untokenized (source, target) text per pair, for reports.
    pub texts: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorpusStats {
    pub pairs: usize,
    pub source_types: usize,
    pub target_types: usize,
    pub source_tokens: usize,
    pub target_tokens: usize,
    pub top_source: Vec<(String, usize)>,
    pub top_target: Vec<(String, usize)>,
}

impl Corpus {
    /// Builds both vocabularies in one pass over the pairs.
    pub fn from_token_pairs<S: AsRef<str>>(pairs: &[(Vec<S>, Vec<S>)]) -> Self {
        let source_vocab = Vocabulary::from_tokens(pairs.iter().flat_map(|p| p.0.iter()));
        let target_vocab = Vocabulary::from_tokens(pairs.iter().flat_map(|p| p.1.iter()));

        // every token was just inserted, so the lookups cannot miss
        let encode = |vocab: &Vocabulary, toks: &[S]| -> Vec<usize> {
            toks.iter()
                .filter_map(|t| vocab.id(t.as_ref()))
                .collect()
        };

        let encoded = pairs
            .iter()
            .map(|(s, t)| SentencePair {
                source: encode(&source_vocab, s.as_slice()),
                target: encode(&target_vocab, t.as_slice()),
            })
            .collect();

        Corpus {
            source_vocab,
            target_vocab,
            pairs: encoded,
            texts: pairs.iter().map(|(s, t)| (join(s), join(t))).collect(),
        }
    }

    /// Encodes pairs against vocabularies supplied by the caller. A token
    /// outside them is rejected instead of being added.
    pub fn from_parts<S: AsRef<str>>(
        source_vocab: Vocabulary,
        target_vocab: Vocabulary,
        pairs: &[(Vec<S>, Vec<S>)],
    ) -> Result<Self> {
        let mut encoded = Vec::with_capacity(pairs.len());
        for (s, t) in pairs {
            encoded.push(SentencePair {
                source: encode_strict(&source_vocab, s, "source")?,
                target: encode_strict(&target_vocab, t, "target")?,
            });
        }

        Ok(Corpus {
            source_vocab,
            target_vocab,
            pairs: encoded,
            texts: pairs.iter().map(|(s, t)| (join(s), join(t))).collect(),
        })
    }

    /// Reads `source<TAB>target` lines. Lines with fewer than two fields are skipped.
    pub fn read_tsv<R: BufRead>(reader: R, config: &TokenizerConfig) -> Result<Self> {
        let mut raw = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split('\t');
            match (fields.next(), fields.next()) {
                (Some(src), Some(tgt)) => raw.push((src.to_string(), tgt.to_string())),
                _ => debug!(line = %line, "skipping line without a tab-separated pair"),
            }
        }
        Ok(Self::from_raw(raw, config))
    }

    /// Reads two line-parallel files, one sentence per line.
    pub fn read_parallel<R1: BufRead, R2: BufRead>(
        source: R1,
        target: R2,
        config: &TokenizerConfig,
    ) -> Result<Self> {
        let source_lines = source.lines().collect::<std::io::Result<Vec<_>>>()?;
        let target_lines = target.lines().collect::<std::io::Result<Vec<_>>>()?;
        if source_lines.len() != target_lines.len() {
            return Err(AlignmentError::CorpusShape {
                source_lines: source_lines.len(),
                target_lines: target_lines.len(),
            });
        }
        Ok(Self::from_raw(
            source_lines.into_iter().zip(target_lines).collect(),
            config,
        ))
    }

    pub fn from_tsv_file<P: AsRef<Path>>(path: P, config: &TokenizerConfig) -> Result<Self> {
        let file = File::open(path)?;
        Self::read_tsv(BufReader::new(file), config)
    }

    pub fn from_parallel_files<P: AsRef<Path>>(
        source: P,
        target: P,
        config: &TokenizerConfig,
    ) -> Result<Self> {
        let source = BufReader::new(File::open(source)?);
        let target = BufReader::new(File::open(target)?);
        Self::read_parallel(source, target, config)
    }

    fn from_raw(raw: Vec<(String, String)>, config: &TokenizerConfig) -> Self {
        let tokenized: Vec<(Vec<String>, Vec<String>)> = raw
            .iter()
            .map(|(s, t)| {
                (
                    tokenize(s, &config.source_stops),
                    tokenize(t, &config.target_stops),
                )
            })
            .collect();

        let mut corpus = Self::from_token_pairs(&tokenized);
        corpus.texts = raw;
        info!(
            pairs = corpus.len(),
            source_types = corpus.source_vocab.len(),
            target_types = corpus.target_vocab.len(),
            "loaded corpus"
        );
        corpus
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Token counts per side plus the `top` most frequent tokens of each.
    pub fn stats(&self, top: usize) -> CorpusStats {
        let source_counts = self
            .pairs
            .iter()
            .flat_map(|p| p.source.iter().copied())
            .collect::<Counter<_>>();
        let target_counts = self
            .pairs
            .iter()
            .flat_map(|p| p.target.iter().copied())
            .collect::<Counter<_>>();

        let most_common = |counts: &Counter<usize>, vocab: &Vocabulary| -> Vec<(String, usize)> {
            let mut common = counts.most_common_ordered();
            common.truncate(top);
            common
                .into_iter()
                .filter_map(|(id, n)| vocab.token(id).map(|t| (t.to_string(), n)))
                .collect()
        };

        CorpusStats {
            pairs: self.len(),
            source_types: self.source_vocab.len(),
            target_types: self.target_vocab.len(),
            source_tokens: source_counts.values().sum(),
            target_tokens: target_counts.values().sum(),
            top_source: most_common(&source_counts, &self.source_vocab),
            top_target: most_common(&target_counts, &self.target_vocab),
        }
    }
}

fn encode_strict<S: AsRef<str>>(
    vocab: &Vocabulary,
    toks: &[S],
    side: &'static str,
) -> Result<Vec<usize>> {
    toks.iter()
        .map(|t| {
            vocab.id(t.as_ref()).ok_or_else(|| AlignmentError::UnknownToken {
                token: t.as_ref().to_string(),
                side,
            })
        })
        .collect()
}

fn join<S: AsRef<str>>(toks: &[S]) -> String {
    toks.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" ")
}

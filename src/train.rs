use std::time::{Duration, Instant};

use counter::Counter;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::corpus::{Corpus, SentencePair};
use crate::error::{AlignmentError, Result};
use crate::model::{Model, TranslationTable};
use crate::vocab::Vocabulary;

/// Training stops once consecutive tables are closer than this.
pub const CONVERGENCE_TOLERANCE: f64 = 0.0005;

#[derive(Clone, Debug)]
pub struct TrainerConfig {
    /// `None` means iterate until convergence.
    pub max_iterations: Option<usize>,
    pub tolerance: f64,
    pub deadline: Option<Duration>,
    /// Accumulate soft counts across sentence pairs on the rayon pool.
    pub parallel: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            max_iterations: Some(100),
            tolerance: CONVERGENCE_TOLERANCE,
            deadline: None,
            parallel: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainerState {
    Iterating,
    Converged,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrainingOutcome {
    Converged { iterations: usize, distance: f64 },
    /// The iteration cap or deadline was hit first. The table is still usable.
    NotConverged { iterations: usize, distance: f64 },
}

impl TrainingOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, TrainingOutcome::Converged { .. })
    }

    pub fn iterations(&self) -> usize {
        match *self {
            TrainingOutcome::Converged { iterations, .. }
            | TrainingOutcome::NotConverged { iterations, .. } => iterations,
        }
    }
}

/// Soft counts gathered by one expectation step.
#[derive(Clone, Debug)]
pub struct Counts {
    pub count: Array2<f64>,
    pub total: Array1<f64>,
    pub log_likelihood: f64,
}

impl Counts {
    pub fn zeros(source_len: usize, target_len: usize) -> Self {
        Counts {
            count: Array2::zeros((source_len, target_len)),
            total: Array1::zeros(target_len),
            log_likelihood: 0.,
        }
    }

    fn merge(mut self, other: Counts) -> Self {
        self.count += &other.count;
        self.total += &other.total;
        self.log_likelihood += other.log_likelihood;
        self
    }

    /// Adds the expected counts of one sentence pair.
    ///
    /// Each distinct token is visited once and weighted by how often it
    /// occurs in the sentence, which equals summing over every position.
    /// Fails with the source id whose normalizer is not positive.
    fn accumulate(&mut self, table: &TranslationTable, pair: &SentencePair) -> std::result::Result<(), usize> {
        if pair.target.is_empty() {
            return Ok(());
        }

        let ind_source = pair.source.iter().copied().collect::<Counter<_>>();
        let ind_target = pair.target.iter().copied().collect::<Counter<_>>();

        // fixed visiting order keeps the float sums reproducible
        let mut source_sorted: Vec<_> = ind_source.iter().map(|(&e, &n)| (e, n)).collect();
        source_sorted.sort_unstable();
        let mut target_sorted: Vec<_> = ind_target.iter().map(|(&h, &n)| (h, n)).collect();
        target_sorted.sort_unstable();

        for &(e, n_e) in &source_sorted {
            // normalizer over the target positions of this sentence
            let s_total: f64 = target_sorted
                .iter()
                .map(|&(h, n_h)| table.get(e, h) * n_h as f64)
                .sum();
            if !(s_total > 0.) {
                return Err(e);
            }
            self.log_likelihood += n_e as f64 * s_total.ln();

            for &(h, n_h) in &target_sorted {
                let c = table.get(e, h) / s_total * (n_e * n_h) as f64;
                self.count[[e, h]] += c;
                self.total[h] += c;
            }
        }
        Ok(())
    }
}

/// Expectation step over the whole corpus.
///
/// A source token whose probabilities over a non-empty target sentence sum
/// to zero (or NaN) cannot be normalized and is reported as degenerate.
pub fn expectation(table: &TranslationTable, corpus: &Corpus, parallel: bool) -> Result<Counts> {
    let (source_len, target_len) = (table.source_len(), table.target_len());

    let counts = if parallel {
        corpus
            .pairs
            .par_iter()
            .try_fold(
                || Counts::zeros(source_len, target_len),
                |mut acc, pair| {
                    acc.accumulate(table, pair)?;
                    Ok(acc)
                },
            )
            .try_reduce(|| Counts::zeros(source_len, target_len), |a, b| Ok(a.merge(b)))
    } else {
        let mut counts = Counts::zeros(source_len, target_len);
        corpus
            .pairs
            .iter()
            .try_for_each(|pair| counts.accumulate(table, pair))
            .map(|()| counts)
    };

    counts.map_err(|e| AlignmentError::DegenerateVocabulary {
        token: corpus.source_vocab.token(e).unwrap_or("<unknown>").to_string(),
    })
}

/// Maximization step: `t[e][h] = count[e][h] / total[h]`.
///
/// A target token with no soft counts would divide by zero, so it is
/// reported as degenerate instead.
pub fn maximization(counts: &Counts, target_vocab: &Vocabulary) -> Result<TranslationTable> {
    if let Some(h) = counts.total.iter().position(|&t| t <= 0.) {
        return Err(AlignmentError::DegenerateVocabulary {
            token: target_vocab.token(h).unwrap_or("<unknown>").to_string(),
        });
    }

    let mut probs = counts.count.clone();
    for mut row in probs.rows_mut() {
        row /= &counts.total;
    }
    Ok(TranslationTable::from_array(probs))
}

/// Whether training may stop. With no previous table it never may.
pub fn converged(previous: Option<&TranslationTable>, current: &TranslationTable, tolerance: f64) -> bool {
    match previous {
        None => false,
        Some(prev) => prev.distance(current) < tolerance,
    }
}

/// EM training state: the current table, the one before it and an
/// iteration counter.
pub struct Trainer<'a> {
    corpus: &'a Corpus,
    config: TrainerConfig,
    table: TranslationTable,
    previous: Option<TranslationTable>,
    iterations: usize,
    state: TrainerState,
}

impl<'a> Trainer<'a> {
    pub fn new(corpus: &'a Corpus, config: TrainerConfig) -> Self {
        let table = TranslationTable::initialize(corpus.source_vocab.len(), corpus.target_vocab.len());
        Trainer {
            corpus,
            config,
            table,
            previous: None,
            iterations: 0,
            state: TrainerState::Iterating,
        }
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn table(&self) -> &TranslationTable {
        &self.table
    }

    /// One expectation + maximization pass. Returns the distance between
    /// the table before and after it.
    pub fn step(&mut self) -> Result<f64> {
        let counts = expectation(&self.table, self.corpus, self.config.parallel)?;
        let next = maximization(&counts, &self.corpus.target_vocab)?;

        self.iterations += 1;
        let previous = std::mem::replace(&mut self.table, next);
        let distance = previous.distance(&self.table);
        self.previous = Some(previous);

        if converged(self.previous.as_ref(), &self.table, self.config.tolerance) {
            self.state = TrainerState::Converged;
        }

        info!(
            iteration = self.iterations,
            distance,
            log_likelihood = counts.log_likelihood,
            "finished EM iteration"
        );
        Ok(distance)
    }

    /// Iterates until convergence, the iteration cap, or the deadline.
    pub fn run(&mut self) -> Result<TrainingOutcome> {
        let start = Instant::now();
        let mut distance = f64::INFINITY;

        // no target columns means nothing to normalize; an empty source side
        // with targets is left to the first step, which reports it as degenerate
        if self.table.target_len() == 0 {
            self.state = TrainerState::Converged;
            info!("empty target vocabulary, nothing to train");
            return Ok(TrainingOutcome::Converged {
                iterations: 0,
                distance: 0.,
            });
        }

        while self.state == TrainerState::Iterating {
            if let Some(max) = self.config.max_iterations {
                if self.iterations >= max {
                    warn!(iterations = self.iterations, distance, "iteration cap reached before convergence");
                    return Ok(TrainingOutcome::NotConverged {
                        iterations: self.iterations,
                        distance,
                    });
                }
            }
            if let Some(deadline) = self.config.deadline {
                if start.elapsed() >= deadline {
                    warn!(iterations = self.iterations, distance, "deadline reached before convergence");
                    return Ok(TrainingOutcome::NotConverged {
                        iterations: self.iterations,
                        distance,
                    });
                }
            }

            distance = self.step()?;
        }

        Ok(TrainingOutcome::Converged {
            iterations: self.iterations,
            distance,
        })
    }

    pub fn into_model(self) -> Model {
        Model::new(
            self.table,
            self.corpus.source_vocab.clone(),
            self.corpus.target_vocab.clone(),
        )
    }
}

/// Trains a model on `corpus` and reports how training ended.
pub fn train(corpus: &Corpus, config: TrainerConfig) -> Result<(Model, TrainingOutcome)> {
    let mut trainer = Trainer::new(corpus, config);
    let outcome = trainer.run()?;
    Ok((trainer.into_model(), outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Zip;

    fn toy_corpus() -> Corpus {
        Corpus::from_token_pairs(&[
            (vec!["the", "house"], vec!["das", "haus"]),
            (vec!["the", "dog"], vec!["der", "hund"]),
        ])
    }

    #[test]
    fn first_check_is_never_converged() {
        let table = TranslationTable::initialize(2, 2);
        assert!(!converged(None, &table, CONVERGENCE_TOLERANCE));
        assert!(converged(Some(&table.clone()), &table, CONVERGENCE_TOLERANCE));
    }

    #[test]
    fn convergence_threshold_is_strict() {
        let a = TranslationTable::from_array(ndarray::array![[0.]]);
        let b = TranslationTable::from_array(ndarray::array![[0.5]]);
        assert!(!converged(Some(&a), &b, 0.5));
        assert!(converged(Some(&a), &b, 0.5000001));
    }

    #[test]
    fn expectation_matches_hand_computation() {
        let corpus = toy_corpus();
        let table = TranslationTable::initialize(3, 4);
        let counts = expectation(&table, &corpus, false).unwrap();
        // uniform table: each source token spreads 1/2 over the two targets
        let the = corpus.source_vocab.id("the").unwrap();
        let das = corpus.target_vocab.id("das").unwrap();
        let hund = corpus.target_vocab.id("hund").unwrap();
        assert!((counts.count[[the, das]] - 0.5).abs() < 1e-12);
        assert!((counts.count[[the, hund]] - 0.5).abs() < 1e-12);
        assert!(counts.total.iter().all(|&t| (t - 1.).abs() < 1e-12));
    }

    #[test]
    fn repeated_target_tokens_weigh_per_occurrence() {
        let corpus = Corpus::from_token_pairs(&[(vec!["a"], vec!["x", "x", "y"])]);
        let table = TranslationTable::initialize(1, 2);
        let counts = expectation(&table, &corpus, false).unwrap();
        let x = corpus.target_vocab.id("x").unwrap();
        let y = corpus.target_vocab.id("y").unwrap();
        // s_total = 3, each (a, x) occurrence adds 1/3
        assert!((counts.count[[0, x]] - 2. / 3.).abs() < 1e-12);
        assert!((counts.count[[0, y]] - 1. / 3.).abs() < 1e-12);
    }

    #[test]
    fn parallel_expectation_agrees_with_serial() {
        let corpus = toy_corpus();
        let table = TranslationTable::initialize(3, 4);
        let serial = expectation(&table, &corpus, false).unwrap();
        let parallel = expectation(&table, &corpus, true).unwrap();
        Zip::from(&serial.count)
            .and(&parallel.count)
            .for_each(|a, b| assert!((a - b).abs() < 1e-12));
    }

    #[test]
    fn maximization_normalizes_columns() {
        let corpus = toy_corpus();
        let table = TranslationTable::initialize(3, 4);
        let counts = expectation(&table, &corpus, false).unwrap();
        let next = maximization(&counts, &corpus.target_vocab).unwrap();
        for col in next.as_array().columns() {
            assert!((col.sum() - 1.).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_total_is_degenerate() {
        let mut counts = Counts::zeros(1, 2);
        counts.count[[0, 0]] = 1.;
        counts.total[0] = 1.;
        let vocab = Vocabulary::from_tokens(vec!["x", "y"]);
        match maximization(&counts, &vocab).unwrap_err() {
            AlignmentError::DegenerateVocabulary { token } => assert_eq!(token, "y"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn target_only_in_empty_source_pair_is_degenerate() {
        let corpus = Corpus::from_token_pairs(&[(vec!["a"], vec!["x"]), (vec![], vec!["y"])]);
        let err = train(&corpus, TrainerConfig::default()).unwrap_err();
        assert!(matches!(err, AlignmentError::DegenerateVocabulary { .. }));
    }

    #[test]
    fn target_without_any_source_is_degenerate() {
        let corpus = Corpus::from_token_pairs(&[(vec![], vec!["x"])]);
        match train(&corpus, TrainerConfig::default()).unwrap_err() {
            AlignmentError::DegenerateVocabulary { token } => assert_eq!(token, "x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn source_without_targets_trains_nothing() {
        let corpus = Corpus::from_token_pairs(&[(vec!["a"], vec![])]);
        let (model, outcome) = train(&corpus, TrainerConfig::default()).unwrap();
        assert!(model.table.is_empty());
        assert_eq!(outcome.iterations(), 0);
    }

    #[test]
    fn zero_normalizer_fails_loudly() {
        let corpus = Corpus::from_token_pairs(&[(vec!["a"], vec!["x", "y"])]);
        let table = TranslationTable::from_array(ndarray::array![[0., 0.]]);
        for parallel in [false, true] {
            match expectation(&table, &corpus, parallel).unwrap_err() {
                AlignmentError::DegenerateVocabulary { token } => assert_eq!(token, "a"),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn empty_target_sentence_is_skipped() {
        let corpus = Corpus::from_token_pairs(&[(vec!["a"], vec!["x"]), (vec!["a"], vec![])]);
        let table = TranslationTable::initialize(1, 1);
        let counts = expectation(&table, &corpus, false).unwrap();
        assert_eq!(counts.count[[0, 0]], 1.);
        assert_eq!(counts.total[0], 1.);
    }

    #[test]
    fn single_pair_converges_after_one_step() {
        let corpus = Corpus::from_token_pairs(&[(vec!["a"], vec!["x"])]);
        let mut trainer = Trainer::new(&corpus, TrainerConfig::default());
        let outcome = trainer.run().unwrap();
        assert_eq!(
            outcome,
            TrainingOutcome::Converged {
                iterations: 1,
                distance: 0.
            }
        );
        assert_eq!(trainer.state(), TrainerState::Converged);
        assert_eq!(trainer.table().get(0, 0), 1.);
    }

    #[test]
    fn empty_corpus_converges_immediately() {
        let corpus = Corpus::default();
        let (model, outcome) = train(&corpus, TrainerConfig::default()).unwrap();
        assert!(model.table.is_empty());
        assert_eq!(outcome.iterations(), 0);
        assert!(outcome.is_converged());
    }

    #[test]
    fn iteration_cap_reports_not_converged() {
        let config = TrainerConfig {
            max_iterations: Some(1),
            ..TrainerConfig::default()
        };
        let (_, outcome) = train(&toy_corpus(), config).unwrap();
        match outcome {
            TrainingOutcome::NotConverged { iterations, distance } => {
                assert_eq!(iterations, 1);
                assert!(distance >= CONVERGENCE_TOLERANCE);
            }
            other => panic!("expected NotConverged, got {other:?}"),
        }
    }

    #[test]
    fn zero_deadline_stops_before_training() {
        let config = TrainerConfig {
            deadline: Some(Duration::from_secs(0)),
            ..TrainerConfig::default()
        };
        let (_, outcome) = train(&toy_corpus(), config).unwrap();
        assert!(!outcome.is_converged());
        assert_eq!(outcome.iterations(), 0);
    }
}

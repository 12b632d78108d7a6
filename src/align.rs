use rayon::prelude::*;

use crate::corpus::Corpus;
use crate::model::TranslationTable;

/// (source position, target position) edges for one sentence pair.
pub type Alignment = Vec<(usize, usize)>;

/// For each source position, links every target position whose probability
/// equals the row maximum. Ties are kept, in ascending target order.
pub fn align(source: &[usize], target: &[usize], table: &TranslationTable) -> Alignment {
    align_with_tolerance(source, target, table, 0.)
}

/// Like [`align`], but every value within `epsilon` of the row maximum counts as a tie.
pub fn align_with_tolerance(
    source: &[usize],
    target: &[usize],
    table: &TranslationTable,
    epsilon: f64,
) -> Alignment {
    let mut alignment = Alignment::new();
    let mut best: Vec<usize> = Vec::with_capacity(target.len());

    for (e, &src) in source.iter().enumerate() {
        best.clear();
        if epsilon > 0. {
            // the band is anchored at the true maximum, so it needs a first pass
            let max = target
                .iter()
                .map(|&tgt| table.get(src, tgt))
                .fold(0., f64::max);
            best.extend(
                target
                    .iter()
                    .enumerate()
                    .filter(|&(_, &tgt)| table.get(src, tgt) >= max - epsilon)
                    .map(|(f, _)| f),
            );
        } else {
            let mut max = 0.;
            for (f, &tgt) in target.iter().enumerate() {
                let p = table.get(src, tgt);
                if p > max {
                    max = p;
                    best.clear();
                    best.push(f);
                } else if p == max {
                    best.push(f);
                }
            }
        }
        alignment.extend(best.iter().map(|&f| (e, f)));
    }

    alignment
}

/// One alignment per sentence pair, in corpus order.
pub fn align_corpus(
    corpus: &Corpus,
    table: &TranslationTable,
    epsilon: f64,
    parallel: bool,
) -> Vec<Alignment> {
    if parallel {
        corpus
            .pairs
            .par_iter()
            .map(|p| align_with_tolerance(&p.source, &p.target, table, epsilon))
            .collect()
    } else {
        corpus
            .pairs
            .iter()
            .map(|p| align_with_tolerance(&p.source, &p.target, table, epsilon))
            .collect()
    }
}

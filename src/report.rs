use std::io::{self, Write};

use crate::align::Alignment;
use crate::model::Model;

/// Headings for the verbose per-pair report.
#[derive(Clone, Debug)]
pub struct ReportLabels {
    pub source: String,
    pub target: String,
}

impl Default for ReportLabels {
    fn default() -> Self {
        ReportLabels {
            source: String::from("English Text"),
            target: String::from("Foreign Text"),
        }
    }
}

/// Prints each (source text, target text, alignment) triple followed by a blank line.
pub fn write_verbose<W: Write>(
    out: &mut W,
    texts: &[(String, String)],
    alignments: &[Alignment],
    labels: &ReportLabels,
) -> io::Result<()> {
    for ((source, target), alignment) in texts.iter().zip(alignments) {
        writeln!(out, "{} : {}", labels.source, source)?;
        writeln!(out, "{} : {}", labels.target, target)?;
        writeln!(out, "Alignment : {:?}", alignment)?;
        writeln!(out)?;
    }
    Ok(())
}

/// One line per sentence pair, edges as `source-target`.
pub fn write_moses<W: Write>(out: &mut W, alignments: &[Alignment]) -> io::Result<()> {
    for alignment in alignments {
        let line = alignment
            .iter()
            .map(|(e, f)| format!("{}-{}", e, f))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Dictionary of translation pairs whose probability exceeds `p`.
pub fn write_dictionary<W: Write>(out: &mut W, model: &Model, p: f64) -> io::Result<usize> {
    let entries = model.entries_above(p);
    for (source, target, prob) in &entries {
        writeln!(out, "{:?}\t{:?}\t{:4}", source, target, prob)?;
    }
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TranslationTable;
    use crate::vocab::Vocabulary;
    use ndarray::array;

    #[test]
    fn verbose_report_layout() {
        let mut buf = Vec::new();
        let texts = vec![("Hi.".to_string(), "नमस्ते।".to_string())];
        write_verbose(&mut buf, &texts, &[vec![(0, 0)]], &ReportLabels::default()).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "English Text : Hi.\nForeign Text : नमस्ते।\nAlignment : [(0, 0)]\n\n"
        );
    }

    #[test]
    fn moses_lines() {
        let mut buf = Vec::new();
        write_moses(&mut buf, &[vec![(0, 0), (0, 1), (1, 1)], vec![]]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "0-0 0-1 1-1\n\n");
    }

    #[test]
    fn dictionary_respects_threshold() {
        let model = Model::new(
            TranslationTable::from_array(array![[0.75, 0.25]]),
            Vocabulary::from_tokens(vec!["house"]),
            Vocabulary::from_tokens(vec!["haus", "das"]),
        );
        let mut buf = Vec::new();
        let written = write_dictionary(&mut buf, &model, 0.5).unwrap();
        assert_eq!(written, 1);
        assert_eq!(String::from_utf8(buf).unwrap(), "\"house\"\t\"haus\"\t0.75\n");
    }
}

use std::fs::File;
use std::io::{self, BufWriter, Write};

use stdinout::OrExit;
use tracing::{info, warn};

use word_alignment::args::{parse_args, Config};
use word_alignment::logging::init_tracing;
use word_alignment::report::{write_dictionary, write_moses, write_verbose, ReportLabels};
use word_alignment::{align_corpus, train, Corpus, TokenizerConfig, TrainingOutcome};

fn main() {
    let arguments = parse_args();
    let config = Config::from_matches(&arguments).or_exit("Invalid arguments", 1);

    init_tracing(config.log_level.as_deref());

    let tokenizer = TokenizerConfig::default();
    let corpus = match &config.target {
        Some(target) => Corpus::from_parallel_files(&config.corpus, target, &tokenizer),
        None => Corpus::from_tsv_file(&config.corpus, &tokenizer),
    }
    .or_exit("Cannot read corpus", 1);

    let stats = corpus.stats(5);
    info!(
        source_tokens = stats.source_tokens,
        target_tokens = stats.target_tokens,
        top_source = ?stats.top_source,
        top_target = ?stats.top_target,
        "corpus statistics"
    );

    let (model, outcome) = train(&corpus, config.trainer.clone()).or_exit("Training failed", 1);
    match outcome {
        TrainingOutcome::Converged { iterations, distance } => {
            info!(iterations, distance, "EM converged")
        }
        TrainingOutcome::NotConverged { iterations, distance } => {
            warn!(iterations, distance, "EM stopped without converging, using last table")
        }
    }

    let alignments = align_corpus(&corpus, &model.table, config.tie_epsilon, config.trainer.parallel);

    if config.verbose {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write_verbose(&mut handle, &corpus.texts, &alignments, &ReportLabels::default())
            .or_exit("Could not write report", 1);
    }

    let mut output: Box<dyn Write> = match &config.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).or_exit("Cannot open output file", 1),
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    write_moses(&mut output, &alignments).or_exit("Could not write to output file", 1);
    output.flush().or_exit("Could not write to output file", 1);

    if let Some(path) = &config.dictionary {
        let mut bufwriter = BufWriter::new(File::create(path).or_exit("Cannot open dictionary file", 1));
        let written = write_dictionary(&mut bufwriter, &model, config.probability)
            .or_exit("Could not write to dictionary file", 1);
        bufwriter.flush().or_exit("Could not write to dictionary file", 1);
        info!(entries = written, threshold = config.probability, "wrote dictionary");
    }
}

use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{App, AppSettings, Arg, ArgMatches};

use crate::error::{AlignmentError, Result};
use crate::train::{TrainerConfig, CONVERGENCE_TOLERANCE};

static DEFAULT_CLAP_SETTINGS: &[AppSettings] = &[
    AppSettings::DontCollapseArgsInUsage,
    AppSettings::UnifiedHelpMessage,
];

fn app() -> App<'static, 'static> {
    App::new("word-alignment")
        .settings(DEFAULT_CLAP_SETTINGS)
        .arg(
            Arg::with_name("ITERATIONS")
                .short("i")
                .long("iterations")
                .value_name("I")
                .help("Maximum iterations for EM algorithm, 0 for no limit (default: 100)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("TOLERANCE")
                .long("tolerance")
                .value_name("T")
                .help("Distance between successive tables that counts as converged (default: 0.0005)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("TIMEOUT")
                .long("timeout")
                .value_name("SECS")
                .help("Stop training after this many seconds")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("PROBABILITY")
                .short("p")
                .long("probability")
                .value_name("P")
                .help("Minimum probability for a dictionary entry (default: 0.5)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("DICTIONARY")
                .short("d")
                .long("dictionary")
                .value_name("FILE")
                .help("Write translation pairs above the minimum probability to FILE")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("TIE_EPSILON")
                .long("tie-epsilon")
                .value_name("E")
                .help("Treat probabilities within E of the maximum as ties (default: 0, exact)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("TARGET")
                .short("t")
                .long("target")
                .value_name("FILE")
                .help("Target language sentences; CORPUS then holds only the source side")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("PARALLEL")
                .long("parallel")
                .help("Use all cores for the expectation step and alignment"),
        )
        .arg(
            Arg::with_name("VERBOSE")
                .short("v")
                .long("verbose")
                .help("Print every sentence pair with its alignment"),
        )
        .arg(
            Arg::with_name("LOG_LEVEL")
                .long("log-level")
                .value_name("FILTER")
                .help("Log filter, e.g. info or word_alignment=debug (default: $RUST_LOG or info)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("CORPUS")
                .help("Tab-separated sentence pairs, or source sentences with --target")
                .index(1)
                .required(true),
        )
        .arg(
            Arg::with_name("OUTPUT")
                .help("Output file to store word alignments (default: stdout)")
                .index(2),
        )
}

pub fn parse_args() -> ArgMatches<'static> {
    app().get_matches()
}

pub fn parse_args_from<I, T>(args: I) -> std::result::Result<ArgMatches<'static>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    app().get_matches_from_safe(args)
}

/// Typed view of the command line.
#[derive(Clone, Debug)]
pub struct Config {
    pub corpus: PathBuf,
    pub target: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub dictionary: Option<PathBuf>,
    pub probability: f64,
    pub tie_epsilon: f64,
    pub verbose: bool,
    pub log_level: Option<String>,
    pub trainer: TrainerConfig,
}

impl Config {
    pub fn from_matches(arguments: &ArgMatches) -> Result<Config> {
        let iterations: usize = parse_or(arguments, "ITERATIONS", "iterations", 100)?;
        let timeout: Option<u64> = match arguments.value_of("TIMEOUT") {
            Some(v) => Some(parse_value(v, "timeout")?),
            None => None,
        };

        let trainer = TrainerConfig {
            max_iterations: if iterations == 0 { None } else { Some(iterations) },
            tolerance: parse_or(arguments, "TOLERANCE", "tolerance", CONVERGENCE_TOLERANCE)?,
            deadline: timeout.map(Duration::from_secs),
            parallel: arguments.is_present("PARALLEL"),
        };

        Ok(Config {
            // CORPUS is required, clap rejects the command line without it
            corpus: arguments.value_of("CORPUS").map(PathBuf::from).unwrap_or_default(),
            target: arguments.value_of("TARGET").map(PathBuf::from),
            output: arguments.value_of("OUTPUT").map(PathBuf::from),
            dictionary: arguments.value_of("DICTIONARY").map(PathBuf::from),
            probability: parse_or(arguments, "PROBABILITY", "probability", 0.5)?,
            tie_epsilon: parse_or(arguments, "TIE_EPSILON", "tie-epsilon", 0.)?,
            verbose: arguments.is_present("VERBOSE"),
            log_level: arguments.value_of("LOG_LEVEL").map(String::from),
            trainer,
        })
    }
}

fn parse_value<T: FromStr>(value: &str, name: &'static str) -> Result<T> {
    value.parse().map_err(|_| AlignmentError::InvalidArgument {
        name,
        value: value.to_string(),
    })
}

fn parse_or<T: FromStr>(arguments: &ArgMatches, key: &str, name: &'static str, default: T) -> Result<T> {
    match arguments.value_of(key) {
        Some(v) => parse_value(v, name),
        None => Ok(default),
    }
}

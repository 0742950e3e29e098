pub mod codec;
pub mod collector;
pub mod error;
pub mod group;
pub mod io;
pub mod job;
pub mod logic;
pub mod phase;
pub mod runner;
pub mod sort;
pub mod task;

use std::ffi::OsString;
use std::fmt::Display;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::debug;

pub use collector::Collector;
pub use error::{Error, Result};
pub use group::{Group, GroupValues, GroupedReader};
pub use job::Job;
pub use logic::{
    Logic, LogicError, LogicResult, MapCombine, MapCombineReduce, MapOnly, MapReduce, Mapper,
    Reducer, Values,
};
pub use phase::Phase;
pub use runner::{LocalConfig, LocalRunner, PhaseRunner, Runner};
pub use sort::ExternalSorter;
pub use task::{Capabilities, Task};

#[derive(Debug, Parser)]
#[command(name = "quasar")]
#[command(about = "A small map-reduce engine for streaming jobs")]
#[command(author, version)]
pub struct Cli {
    /// Input file to read lines from in a local run.
    #[arg(short = 'f', default_value = "-")]
    input_file: String,

    /// Output file of a local run. Defaults to stdout.
    #[arg(short = 'o', long = "output-file")]
    output_file: Option<PathBuf>,

    /// Output format for the results.
    #[arg(long = "output", default_value_t = OutputFormat::Plain)]
    output_format: OutputFormat,

    /// In-memory budget of each sort, in bytes.
    #[arg(long = "sort-buffer", default_value_t = sort::DEFAULT_SORT_BUFFER)]
    sort_buffer: usize,

    /// Directory the staging area of a local run is created in.
    #[arg(long = "staging-dir")]
    staging_dir: Option<PathBuf>,

    /// Index of the task to run a single phase of.
    #[arg(long = "task")]
    task: Option<usize>,

    /// Phase to run: map, combine or reduce.
    #[arg(long = "phase", default_value = "")]
    phase: String,
}

impl Cli {
    /// Parses `args`, accepting the single-dash `-task` and `-phase` flags
    /// streaming hosts pass.
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = args.into_iter().map(|arg| long_flag(arg.into()));
        Ok(Cli::try_parse_from(args)?)
    }

    /// A phase runner when a task or phase was named, a local runner
    /// otherwise.
    pub fn into_runner(self) -> Result<Box<dyn Runner>> {
        if self.task.is_some() || !self.phase.is_empty() {
            let runner = PhaseRunner::new(self.task.unwrap_or(0), &self.phase)?;
            return Ok(Box::new(runner));
        }
        Ok(Box::new(LocalRunner::new(self.local_config())))
    }

    fn local_config(&self) -> LocalConfig {
        LocalConfig {
            input: (self.input_file != "-").then(|| PathBuf::from(&self.input_file)),
            output: self.output_file.clone(),
            format: self.output_format,
            sort_buffer: self.sort_buffer,
            staging_root: self.staging_dir.clone(),
        }
    }
}

fn long_flag(arg: OsString) -> OsString {
    match arg.to_str() {
        Some("-task") => "--task".into(),
        Some("-phase") => "--phase".into(),
        _ => arg,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Runs `job` as the process arguments direct.
pub fn run(job: Job) -> Result<()> {
    run_from_args(job, std::env::args_os())
}

pub fn run_from_args<I, T>(job: Job, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::from_args(args)?;
    debug!("Parsed command line arguments: {:?}", cli);
    cli.into_runner()?.run(&job)
}

//! Runners turn a [`Job`] into work.
//!
//! 1. [`LocalRunner`] simulates the whole job in one process: every task's
//!    map, combine and reduce phases, with the sorting between them done by
//!    the external sorter.
//! 2. [`PhaseRunner`] runs a single phase of a single task, reading and
//!    writing framed pairs on stdin/stdout. This is what a streaming host
//!    invokes between its own sort steps.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::io::{
    FramedReader, FramedWriter, LineReader, PairReader, PairWriter, TextWriter, copy_pairs,
};
use crate::job::Job;
use crate::phase::Phase;
use crate::sort::{DEFAULT_SORT_BUFFER, ExternalSorter};
use crate::task::Task;
use crate::{Cli, OutputFormat};

pub trait Runner {
    fn run(&self, job: &Job) -> Result<()>;
}

/// Settings of a local run.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Text input; stdin when `None`.
    pub input: Option<PathBuf>,
    /// Text output; stdout when `None`.
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    /// In-memory budget of each external sort, in bytes.
    pub sort_buffer: usize,
    /// Where the per-run staging directory is created; the system temp
    /// directory when `None`.
    pub staging_root: Option<PathBuf>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            format: OutputFormat::Plain,
            sort_buffer: DEFAULT_SORT_BUFFER,
            staging_root: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalRunner {
    config: LocalConfig,
}

impl LocalRunner {
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    /// Runs `job` over the lines of `input` and writes the last task's output
    /// as text to `output`.
    ///
    /// Staged files live in a fresh directory that is removed before this
    /// returns, whether the job succeeded or not.
    pub fn run_with<R, W>(&self, job: &Job, input: R, output: W) -> Result<()>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let staging = self.staging_area()?;
        info!(path = %staging.path().display(), tasks = job.len(), "working in staging area");

        let result = self.run_job(job, staging.path(), input, output);
        let removed = staging.close();
        if let Err(e) = &removed {
            warn!(error = %e, "failed to remove staging area");
        }
        result.and(removed.map_err(Error::from))
    }

    fn staging_area(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("quasar-");
        let dir = match &self.config.staging_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        Ok(dir?)
    }

    fn run_job<R, W>(&self, job: &Job, root: &Path, input: R, output: W) -> Result<()>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let Some(last) = job.tasks().last() else {
            info!("job has no tasks");
            return Ok(());
        };

        // Task 0 reads the text input; every later task reads its
        // predecessor's result.
        let mut source: Box<dyn PairReader + Send> = Box::new(LineReader::new(input));
        for (index, task) in job.tasks().iter().enumerate() {
            let result = self.run_task(index, task, source, root)?;
            source = Box::new(open_staged(&result)?);
        }

        let mut writer = TextWriter::new(output, self.config.format, |key: &[u8], value: &[u8]| {
            last.render(key, value)
        });
        let copied = copy_pairs(&mut source, &mut writer);
        let closed = writer.close();
        let pairs = copied?;
        closed?;

        info!(pairs, "job finished");
        Ok(())
    }

    fn run_task(
        &self,
        index: usize,
        task: &Task,
        input: Box<dyn PairReader + Send>,
        root: &Path,
    ) -> Result<PathBuf> {
        info!(task = index, name = task.name(), "running task");
        let mut staged = self.stage(index, task, Phase::Map, input, root)?;
        for phase in [Phase::Combine, Phase::Reduce] {
            if task.supports(phase) {
                let sorted = open_staged(&staged)?;
                staged = self.stage(index, task, phase, sorted, root)?;
            }
        }
        Ok(staged)
    }

    /// Runs one phase with its output sorted into a staging file.
    fn stage<R>(&self, index: usize, task: &Task, phase: Phase, input: R, root: &Path) -> Result<PathBuf>
    where
        R: PairReader + Send + 'static,
    {
        let path = root.join(format!("{index:03}-{phase}"));
        let file = File::create(&path).map_err(|e| Error::open(&path, e))?;
        task.run(phase, input, ExternalSorter::new(file, root, self.config.sort_buffer))?;
        debug!(task = index, %phase, path = %path.display(), "staged phase output");
        Ok(path)
    }
}

fn open_staged(path: &Path) -> Result<FramedReader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| Error::open(path, e))?;
    Ok(FramedReader::new(BufReader::new(file)))
}

impl Runner for LocalRunner {
    fn run(&self, job: &Job) -> Result<()> {
        let input: Box<dyn BufRead + Send> = match &self.config.input {
            Some(path) => {
                let file = File::open(path).map_err(|e| Error::open(path, e))?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(BufReader::new(io::stdin())),
        };
        match &self.config.output {
            Some(path) => {
                let file = File::create(path).map_err(|e| Error::open(path, e))?;
                self.run_with(job, input, file)
            }
            None => self.run_with(job, input, io::stdout().lock()),
        }
    }
}

/// Runs one phase of one task on framed pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRunner {
    task: usize,
    phase: Phase,
}

impl PhaseRunner {
    pub fn new(task: usize, phase_name: &str) -> Result<Self> {
        Ok(Self {
            task,
            phase: phase_name.parse()?,
        })
    }

    /// Parses `-task <n> -phase <name>` (or the `--` forms). The task index
    /// defaults to 0; the phase is required.
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::from_args(args)?;
        Self::new(cli.task.unwrap_or(0), &cli.phase)
    }

    pub fn task(&self) -> usize {
        self.task
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn run_with<R, W>(&self, job: &Job, input: R, output: W) -> Result<()>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        let task = job.task(self.task).ok_or(Error::NoSuchTask(self.task))?;
        info!(task = self.task, name = task.name(), phase = %self.phase, "running single phase");
        task.run(
            self.phase,
            FramedReader::new(BufReader::new(input)),
            FramedWriter::new(output),
        )
    }
}

impl Runner for PhaseRunner {
    fn run(&self, job: &Job) -> Result<()> {
        self.run_with(job, io::stdin(), io::stdout().lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::io::RawPair;
    use crate::logic::{MapCombineReduce, WordCount};

    fn word_count_job() -> Job {
        Job::new([Task::named(
            "wordcount",
            MapCombineReduce(WordCount, WordCount, WordCount),
        )])
    }

    #[test]
    fn bails_without_a_phase() {
        let err = PhaseRunner::from_args(["./myprog"]).unwrap_err();
        assert!(matches!(err, Error::MissingPhase));
    }

    #[test]
    fn bails_on_an_unknown_phase() {
        let err = PhaseRunner::from_args(["./myprog", "-phase", "rock it"]).unwrap_err();
        assert_eq!(err.to_string(), "unknown phase rock it");
    }

    #[test]
    fn parses_task_and_phase() {
        let runner = PhaseRunner::from_args(["./myprog", "-task", "2", "-phase", "combine"]).unwrap();
        assert_eq!(runner.task(), 2);
        assert_eq!(runner.phase(), Phase::Combine);

        let runner = PhaseRunner::from_args(["./myprog", "--task", "1", "--phase", "reduce"]).unwrap();
        assert_eq!(runner.task(), 1);
        assert_eq!(runner.phase(), Phase::Reduce);
    }

    #[test]
    fn rejects_a_task_past_the_job() {
        let runner = PhaseRunner::new(1, "map").unwrap();
        let err = runner
            .run_with(&word_count_job(), io::empty(), io::sink())
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchTask(1)));
        assert_eq!(err.to_string(), "no task 1");
    }

    #[test]
    fn runs_a_reduce_phase_on_framed_pairs() {
        let mut input = Vec::new();
        for (word, count) in [("cat", 1u64), ("sat", 1), ("sat", 1)] {
            let pair = RawPair::encode(word, &count).unwrap();
            codec::write_record(&mut input, &pair.key, &pair.value).unwrap();
        }

        let mut output = Vec::new();
        PhaseRunner::new(0, "reduce")
            .unwrap()
            .run_with(&word_count_job(), io::Cursor::new(input), &mut output)
            .unwrap();

        let mut reader = FramedReader::new(&output[..]);
        let mut counts = Vec::new();
        while let Some(pair) = reader.next_pair().unwrap() {
            let word: String = codec::decode(&pair.key).unwrap();
            let count: u64 = codec::decode(&pair.value).unwrap();
            counts.push((word, count));
        }
        assert_eq!(counts, vec![("cat".to_string(), 1), ("sat".to_string(), 2)]);
    }

    #[test]
    fn local_run_counts_words() {
        let staging = tempfile::tempdir().unwrap();
        let runner = LocalRunner::new(LocalConfig {
            staging_root: Some(staging.path().to_path_buf()),
            ..LocalConfig::default()
        });

        let mut output = Vec::new();
        runner
            .run_with(&word_count_job(), "the cat sat\nthe dog sat\n".as_bytes(), &mut output)
            .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "cat\t1\ndog\t1\nsat\t2\nthe\t2\n"
        );
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_job_writes_nothing() {
        let mut output = Vec::new();
        LocalRunner::default()
            .run_with(&Job::default(), "ignored\n".as_bytes(), &mut output)
            .unwrap();
        assert!(output.is_empty());
    }
}

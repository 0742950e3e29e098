use anyhow::Result;
use quasar::logic::WordCount;
use quasar::{Job, MapCombineReduce, Task};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries job output, so logs go to stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let job = Job::new([Task::named(
        "wordcount",
        MapCombineReduce(WordCount, WordCount, WordCount),
    )]);

    match tokio::task::spawn_blocking(move || quasar::run(job)).await? {
        Err(quasar::Error::Args(e)) => e.exit(),
        result => Ok(result?),
    }
}

use std::marker::PhantomData;

use serde::Serialize;
use tracing::warn;

use crate::codec;
use crate::error::{Error, Result};
use crate::io::PairWriter;
use crate::logic::LogicError;
use crate::phase::Phase;

/// Write capability handed to job logic.
///
/// Failures are fail-fast: the first encode or write error is kept, every
/// later `collect` is refused, and the owning task reports the kept error
/// whatever the logic itself returns.
pub struct Collector<'a, K, V> {
    sink: &'a mut dyn PairWriter,
    failure: Option<Error>,
    collected: u64,
    _pair: PhantomData<fn(&K, &V)>,
}

impl<'a, K, V> Collector<'a, K, V>
where
    K: Serialize,
    V: Serialize,
{
    pub(crate) fn new(sink: &'a mut dyn PairWriter) -> Self {
        Self {
            sink,
            failure: None,
            collected: 0,
            _pair: PhantomData,
        }
    }

    /// Encodes and writes one output pair.
    pub fn collect(&mut self, key: &K, value: &V) -> Result<()> {
        if self.failure.is_some() {
            return Err(Error::CollectorFailed);
        }
        match self.write(key, value) {
            Ok(()) => {
                self.collected += 1;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, collected = self.collected, "collector write failed");
                self.failure = Some(e);
                Err(Error::CollectorFailed)
            }
        }
    }

    /// Number of pairs written so far.
    pub fn collected(&self) -> u64 {
        self.collected
    }

    fn write(&mut self, key: &K, value: &V) -> Result<()> {
        let key = codec::encode(key)?;
        let value = codec::encode(value)?;
        self.sink.write_pair(&key, &value)
    }

    /// Settles the outcome of one logic invocation.
    pub(crate) fn settle(
        &mut self,
        outcome: std::result::Result<(), LogicError>,
        phase: Phase,
        task: &str,
    ) -> Result<()> {
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        outcome.map_err(|source| Error::Logic {
            phase,
            task: task.to_string(),
            source,
        })
    }
}

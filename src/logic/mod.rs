pub mod word_count;

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::collector::Collector;
use crate::error::Error;
use crate::task::Stages;

pub use word_count::*;

/// Error type job logic returns. Anything `Send + Sync` converts into it
/// with `?`, including [`crate::Error`].
pub type LogicError = Box<dyn std::error::Error + Send + Sync>;

pub type LogicResult = Result<(), LogicError>;

/// Map capability: called once per input pair.
pub trait Mapper: Send + Sync {
    type KeyIn: DeserializeOwned;
    type ValueIn: DeserializeOwned;
    type KeyOut: Serialize + DeserializeOwned;
    type ValueOut: Serialize + DeserializeOwned;

    fn map(
        &self,
        key: Self::KeyIn,
        value: Self::ValueIn,
        out: &mut Collector<'_, Self::KeyOut, Self::ValueOut>,
    ) -> LogicResult;
}

/// Per-key capability, used for both the combine and the reduce phase.
///
/// Called once per group with the group's values in input order. Values left
/// unconsumed when `reduce` returns are discarded.
pub trait Reducer: Send + Sync {
    type Key: DeserializeOwned;
    type ValueIn: DeserializeOwned;
    type KeyOut: Serialize + DeserializeOwned;
    type ValueOut: Serialize + DeserializeOwned;

    fn reduce(
        &self,
        key: Self::Key,
        values: &mut Values<'_, Self::ValueIn>,
        out: &mut Collector<'_, Self::KeyOut, Self::ValueOut>,
    ) -> LogicResult;
}

/// Decoded values of one group.
///
/// A value that fails to decode ends the iteration; the task then fails with
/// the decode error.
pub struct Values<'a, V> {
    raw: &'a mut dyn Iterator<Item = Vec<u8>>,
    failure: Option<Error>,
    _value: PhantomData<fn() -> V>,
}

impl<'a, V: DeserializeOwned> Values<'a, V> {
    pub(crate) fn new(raw: &'a mut dyn Iterator<Item = Vec<u8>>) -> Self {
        Self {
            raw,
            failure: None,
            _value: PhantomData,
        }
    }

    pub(crate) fn take_failure(&mut self) -> Option<Error> {
        self.failure.take()
    }
}

impl<V: DeserializeOwned> Iterator for Values<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        if self.failure.is_some() {
            return None;
        }
        let raw = self.raw.next()?;
        match codec::decode(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                self.failure = Some(e);
                None
            }
        }
    }
}

/// Job logic that is turned into a task's phase table.
///
/// Implemented by the four capability shapes below; which phases a task
/// supports is decided by the shape, at compile time.
pub trait Logic {
    fn into_stages(self) -> Stages;
}

/// Map only.
pub struct MapOnly<M>(pub M);

/// Map, then combine. The combiner's output is the task's output.
pub struct MapCombine<M, C>(pub M, pub C);

/// Map, then reduce.
pub struct MapReduce<M, R>(pub M, pub R);

/// Map, combine the map output per key, then reduce the combined output.
pub struct MapCombineReduce<M, C, R>(pub M, pub C, pub R);

impl<M> Logic for MapOnly<M>
where
    M: Mapper + 'static,
{
    fn into_stages(self) -> Stages {
        Stages::new(self.0)
    }
}

impl<M, C> Logic for MapCombine<M, C>
where
    M: Mapper + 'static,
    C: Reducer<Key = M::KeyOut, ValueIn = M::ValueOut> + 'static,
{
    fn into_stages(self) -> Stages {
        Stages::new(self.0).with_combiner(self.1)
    }
}

impl<M, R> Logic for MapReduce<M, R>
where
    M: Mapper + 'static,
    R: Reducer<Key = M::KeyOut, ValueIn = M::ValueOut> + 'static,
{
    fn into_stages(self) -> Stages {
        Stages::new(self.0).with_reducer(self.1)
    }
}

impl<M, C, R> Logic for MapCombineReduce<M, C, R>
where
    M: Mapper + 'static,
    C: Reducer<Key = M::KeyOut, ValueIn = M::ValueOut> + 'static,
    R: Reducer<Key = C::KeyOut, ValueIn = C::ValueOut> + 'static,
{
    fn into_stages(self) -> Stages {
        Stages::new(self.0)
            .with_combiner(self.1)
            .with_reducer(self.2)
    }
}

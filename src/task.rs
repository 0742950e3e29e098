use std::any::type_name;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use crate::codec;
use crate::collector::Collector;
use crate::error::{Error, Result};
use crate::group::GroupedReader;
use crate::io::{PairReader, PairWriter};
use crate::logic::{Logic, Mapper, Reducer, Values};
use crate::phase::Phase;

/// One phase of a task, with the logic's key/value types erased behind the
/// pair codec.
pub(crate) trait Stage: Send + Sync {
    fn run(
        &self,
        task: &str,
        input: Box<dyn PairReader + Send>,
        output: &mut dyn PairWriter,
    ) -> Result<()>;

    /// Decodes a pair of this stage's output types for display.
    fn render(&self, key: &[u8], value: &[u8]) -> Result<(JsonValue, JsonValue)>;
}

struct MapStage<M>(M);

impl<M: Mapper> Stage for MapStage<M> {
    fn run(
        &self,
        task: &str,
        mut input: Box<dyn PairReader + Send>,
        output: &mut dyn PairWriter,
    ) -> Result<()> {
        let mut out = Collector::<M::KeyOut, M::ValueOut>::new(output);
        let mut records = 0u64;
        while let Some(pair) = input.next_pair()? {
            let key: M::KeyIn = codec::decode(&pair.key)?;
            let value: M::ValueIn = codec::decode(&pair.value)?;
            let outcome = self.0.map(key, value, &mut out);
            out.settle(outcome, Phase::Map, task)?;
            records += 1;
        }
        debug!(task, records, collected = out.collected(), "map stage finished");
        Ok(())
    }

    fn render(&self, key: &[u8], value: &[u8]) -> Result<(JsonValue, JsonValue)> {
        render_as::<M::KeyOut, M::ValueOut>(key, value)
    }
}

struct GroupStage<R> {
    reducer: R,
    phase: Phase,
}

impl<R: Reducer> Stage for GroupStage<R> {
    fn run(
        &self,
        task: &str,
        input: Box<dyn PairReader + Send>,
        output: &mut dyn PairWriter,
    ) -> Result<()> {
        let mut groups = GroupedReader::new(input)?;
        let mut out = Collector::<R::KeyOut, R::ValueOut>::new(output);
        let mut keys = 0u64;
        while let Some(group) = groups.next_group()? {
            let (key, mut raw) = group.into_parts();
            let key: R::Key = codec::decode(&key)?;
            let mut values = Values::<R::ValueIn>::new(&mut raw);
            let outcome = self.reducer.reduce(key, &mut values, &mut out);
            let failure = values.take_failure();
            out.settle(outcome, self.phase, task)?;
            if let Some(e) = failure {
                return Err(e);
            }
            keys += 1;
        }
        debug!(task, phase = %self.phase, keys, collected = out.collected(), "grouped stage finished");
        Ok(())
    }

    fn render(&self, key: &[u8], value: &[u8]) -> Result<(JsonValue, JsonValue)> {
        render_as::<R::KeyOut, R::ValueOut>(key, value)
    }
}

fn render_as<K, V>(key: &[u8], value: &[u8]) -> Result<(JsonValue, JsonValue)>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    let key: K = codec::decode(key)?;
    let value: V = codec::decode(value)?;
    Ok((serde_json::to_value(key)?, serde_json::to_value(value)?))
}

/// Phase table of one task. Built by [`Logic::into_stages`].
pub struct Stages {
    map: Box<dyn Stage>,
    combine: Option<Box<dyn Stage>>,
    reduce: Option<Box<dyn Stage>>,
}

impl Stages {
    pub(crate) fn new<M: Mapper + 'static>(mapper: M) -> Self {
        Self {
            map: Box::new(MapStage(mapper)),
            combine: None,
            reduce: None,
        }
    }

    pub(crate) fn with_combiner<C: Reducer + 'static>(mut self, combiner: C) -> Self {
        self.combine = Some(Box::new(GroupStage {
            reducer: combiner,
            phase: Phase::Combine,
        }));
        self
    }

    pub(crate) fn with_reducer<R: Reducer + 'static>(mut self, reducer: R) -> Self {
        self.reduce = Some(Box::new(GroupStage {
            reducer,
            phase: Phase::Reduce,
        }));
        self
    }
}

/// Which optional phases a task supports. Map is always supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub combine: bool,
    pub reduce: bool,
}

impl Capabilities {
    pub fn supports(&self, phase: Phase) -> bool {
        match phase {
            Phase::Map => true,
            Phase::Combine => self.combine,
            Phase::Reduce => self.reduce,
        }
    }
}

/// Job logic bound to its phase table.
pub struct Task {
    name: String,
    stages: Stages,
    capabilities: Capabilities,
}

impl Task {
    /// Creates a task named after the logic's type.
    pub fn new<L: Logic>(logic: L) -> Self {
        Self::named(short_type_name(type_name::<L>()), logic)
    }

    pub fn named<L: Logic>(name: impl Into<String>, logic: L) -> Self {
        let stages = logic.into_stages();
        let capabilities = Capabilities {
            combine: stages.combine.is_some(),
            reduce: stages.reduce.is_some(),
        };
        Self {
            name: name.into(),
            stages,
            capabilities,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn supports(&self, phase: Phase) -> bool {
        self.capabilities.supports(phase)
    }

    /// Runs one phase over `input`, writing to `output`.
    ///
    /// Combine and reduce regroup `input`, which must be sorted by key.
    /// Once the phase has started, `output` is closed exactly once, whether
    /// the phase succeeds or fails; the first error is returned.
    #[instrument(level = "debug", skip(self, input, output), fields(task = %self.name))]
    pub fn run<R, W>(&self, phase: Phase, input: R, mut output: W) -> Result<()>
    where
        R: PairReader + Send + 'static,
        W: PairWriter,
    {
        let stage = self.stage(phase).ok_or_else(|| Error::MissingCapability {
            phase,
            task: self.name.clone(),
        })?;

        let result = stage.run(&self.name, Box::new(input), &mut output);
        let closed = output.close();
        result.and(closed)
    }

    /// Renders a pair of this task's final output types as JSON values.
    pub fn render(&self, key: &[u8], value: &[u8]) -> Result<(JsonValue, JsonValue)> {
        self.final_stage().render(key, value)
    }

    fn stage(&self, phase: Phase) -> Option<&dyn Stage> {
        match phase {
            Phase::Map => Some(self.stages.map.as_ref()),
            Phase::Combine => self.stages.combine.as_deref(),
            Phase::Reduce => self.stages.reduce.as_deref(),
        }
    }

    fn final_stage(&self) -> &dyn Stage {
        self.stages
            .reduce
            .as_deref()
            .or(self.stages.combine.as_deref())
            .unwrap_or(self.stages.map.as_ref())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// `a::b::Outer<c::Inner>` becomes `Outer<Inner>`.
fn short_type_name(full: &str) -> String {
    let mut short = String::with_capacity(full.len());
    let mut path = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            path.push(c);
        } else {
            short.push_str(path.rsplit("::").next().unwrap_or_default());
            path.clear();
            short.push(c);
        }
    }
    short.push_str(path.rsplit("::").next().unwrap_or_default());
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testing::{MemoryReader, MemoryWriter};
    use crate::logic::{LogicResult, MapOnly, MapReduce, WordCount};

    struct Echo;

    impl Mapper for Echo {
        type KeyIn = String;
        type ValueIn = String;
        type KeyOut = String;
        type ValueOut = String;

        fn map(&self, k: String, v: String, out: &mut Collector<'_, String, String>) -> LogicResult {
            out.collect(&format!("{k} said"), &format!("Hello, {v}"))?;
            Ok(())
        }
    }

    fn echo_task() -> Task {
        Task::named("echo", MapOnly(Echo))
    }

    #[test]
    fn default_name_is_the_short_type_name() {
        assert_eq!(Task::new(MapOnly(Echo)).name(), "MapOnly<Echo>");
        assert_eq!(short_type_name("a::b::C<d::E, f::G>"), "C<E, G>");
    }

    #[test]
    fn capabilities_follow_the_logic_shape() {
        let echo = echo_task();
        assert!(echo.supports(Phase::Map));
        assert!(!echo.supports(Phase::Combine));
        assert!(!echo.supports(Phase::Reduce));

        let wc = Task::new(MapReduce(WordCount, WordCount));
        assert_eq!(
            wc.capabilities(),
            Capabilities {
                combine: false,
                reduce: true
            }
        );
    }

    #[test]
    fn missing_capability_names_phase_and_task() {
        let mut sink = MemoryWriter::default();
        let err = echo_task()
            .run(Phase::Combine, MemoryReader::new(Vec::new()), &mut sink)
            .unwrap_err();
        assert_eq!(err.to_string(), "no combine phase for echo");
        assert_eq!(sink.closes, 0);
    }

    #[test]
    fn runs_a_simple_map_phase() {
        let input = MemoryReader::typed(&[("thelma", "louise"), ("abbott", "costello")]);
        let mut sink = MemoryWriter::default();
        echo_task().run(Phase::Map, input, &mut sink).unwrap();

        assert_eq!(
            sink.decoded::<String, String>(),
            vec![
                ("thelma said".to_string(), "Hello, louise".to_string()),
                ("abbott said".to_string(), "Hello, costello".to_string()),
            ]
        );
        assert_eq!(sink.closes, 1);
    }

    #[test]
    fn read_errors_close_the_output() {
        let input = MemoryReader::typed(&[("thelma", "louise")]).failing_at_end();
        let mut sink = MemoryWriter::default();
        let err = echo_task().run(Phase::Map, input, &mut sink).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(sink.pairs.len(), 1);
        assert_eq!(sink.closes, 1);
    }

    #[test]
    fn mistyped_input_is_a_decode_error() {
        let input = MemoryReader::typed(&[(1u8, 2u8)]);
        let mut sink = MemoryWriter::default();
        let err = echo_task().run(Phase::Map, input, &mut sink).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(sink.closes, 1);
    }

    struct Swallow;

    impl Mapper for Swallow {
        type KeyIn = String;
        type ValueIn = String;
        type KeyOut = String;
        type ValueOut = String;

        fn map(&self, k: String, v: String, out: &mut Collector<'_, String, String>) -> LogicResult {
            let _ = out.collect(&k, &v);
            Ok(())
        }
    }

    #[test]
    fn collector_failure_aborts_even_when_ignored() {
        let input = MemoryReader::typed(&[("a", "1"), ("b", "2")]);
        let mut sink = MemoryWriter::failing();
        let err = Task::named("swallow", MapOnly(Swallow))
            .run(Phase::Map, input, &mut sink)
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(sink.closes, 1);
    }

    #[test]
    fn reduce_sees_each_group_once() {
        let input = MemoryReader::typed(&[("cat", 1u64), ("sat", 1), ("sat", 1), ("the", 2)]);
        let mut sink = MemoryWriter::default();
        Task::named("wc", MapReduce(WordCount, WordCount))
            .run(Phase::Reduce, input, &mut sink)
            .unwrap();
        assert_eq!(
            sink.decoded::<String, u64>(),
            vec![
                ("cat".to_string(), 1),
                ("sat".to_string(), 2),
                ("the".to_string(), 2),
            ]
        );
    }

    struct FirstOnly;

    impl Reducer for FirstOnly {
        type Key = String;
        type ValueIn = u64;
        type KeyOut = String;
        type ValueOut = u64;

        fn reduce(
            &self,
            key: String,
            values: &mut Values<'_, u64>,
            out: &mut Collector<'_, String, u64>,
        ) -> LogicResult {
            if let Some(first) = values.next() {
                out.collect(&key, &first)?;
            }
            Ok(())
        }
    }

    #[test]
    fn unconsumed_values_are_discarded() {
        let input = MemoryReader::typed(&[("a", 1u64), ("a", 2), ("a", 3), ("b", 4), ("b", 5)]);
        let mut sink = MemoryWriter::default();
        Task::named("first", MapReduce(WordCount, FirstOnly))
            .run(Phase::Reduce, input, &mut sink)
            .unwrap();
        assert_eq!(
            sink.decoded::<String, u64>(),
            vec![("a".to_string(), 1), ("b".to_string(), 4)]
        );
    }

    #[test]
    fn undecodable_values_fail_the_group() {
        let input = MemoryReader::typed(&[("a", 1u8)]);
        let mut sink = MemoryWriter::default();
        let err = Task::named("wc", MapReduce(WordCount, WordCount))
            .run(Phase::Reduce, input, &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(sink.closes, 1);
    }

    #[test]
    fn renders_final_output_types() {
        let task = Task::new(MapReduce(WordCount, WordCount));
        let pair = crate::io::RawPair::encode("sat", &2u64).unwrap();
        let (key, value) = task.render(&pair.key, &pair.value).unwrap();
        assert_eq!(key, serde_json::json!("sat"));
        assert_eq!(value, serde_json::json!(2));
    }
}

use super::{LogicResult, Mapper, Reducer, Values};
use crate::collector::Collector;

/// Built-in word count. Used as its own combiner and reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCount;

impl WordCount {
    pub fn new() -> Self {
        Self
    }
}

impl Mapper for WordCount {
    type KeyIn = u64;
    type ValueIn = String;
    type KeyOut = String;
    type ValueOut = u64;

    fn map(&self, _offset: u64, line: String, out: &mut Collector<'_, String, u64>) -> LogicResult {
        let normalized = line
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c.is_whitespace() {
                    c
                } else {
                    ' '
                }
            })
            .collect::<String>();

        // Emit each word with count of 1
        for word in normalized.split_whitespace() {
            out.collect(&word.to_string(), &1)?;
        }

        Ok(())
    }
}

impl Reducer for WordCount {
    type Key = String;
    type ValueIn = u64;
    type KeyOut = String;
    type ValueOut = u64;

    fn reduce(
        &self,
        word: String,
        counts: &mut Values<'_, u64>,
        out: &mut Collector<'_, String, u64>,
    ) -> LogicResult {
        let total: u64 = counts.sum();
        out.collect(&word, &total)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testing::MemoryWriter;

    #[test]
    fn splits_on_punctuation_and_folds_case() {
        let mut sink = MemoryWriter::default();
        {
            let mut out = Collector::new(&mut sink);
            WordCount.map(0, "The cat's HAT.".to_string(), &mut out).unwrap();
        }
        let words: Vec<String> = sink
            .decoded::<String, u64>()
            .into_iter()
            .map(|(word, _)| word)
            .collect();
        assert_eq!(words, ["the", "cat", "s", "hat"]);
    }
}

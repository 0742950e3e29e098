use std::io::{BufRead, BufWriter, Read, Write};

use serde_json::Value as JsonValue;

use crate::OutputFormat;
use crate::codec;
use crate::error::Result;

/// One encoded key/value unit flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl RawPair {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Encodes a typed key/value with the pair codec.
    pub fn encode<K, V>(key: &K, value: &V) -> Result<Self>
    where
        K: serde::Serialize + ?Sized,
        V: serde::Serialize + ?Sized,
    {
        Ok(Self {
            key: codec::encode(key)?,
            value: codec::encode(value)?,
        })
    }
}

/// Ordered source of pairs. `Ok(None)` marks the end of the stream.
pub trait PairReader {
    fn next_pair(&mut self) -> Result<Option<RawPair>>;
}

/// Sink of pairs. `close` flushes everything written so far; callers close a
/// writer exactly once.
pub trait PairWriter {
    fn write_pair(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

impl<R: PairReader + ?Sized> PairReader for Box<R> {
    fn next_pair(&mut self) -> Result<Option<RawPair>> {
        (**self).next_pair()
    }
}

impl<R: PairReader + ?Sized> PairReader for &mut R {
    fn next_pair(&mut self) -> Result<Option<RawPair>> {
        (**self).next_pair()
    }
}

impl<W: PairWriter + ?Sized> PairWriter for Box<W> {
    fn write_pair(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).write_pair(key, value)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<W: PairWriter + ?Sized> PairWriter for &mut W {
    fn write_pair(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).write_pair(key, value)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Copies every remaining pair from `reader` into `writer` without closing
/// the writer. Returns the number of pairs copied.
pub fn copy_pairs<R, W>(reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: PairReader + ?Sized,
    W: PairWriter + ?Sized,
{
    let mut copied = 0;
    while let Some(pair) = reader.next_pair()? {
        writer.write_pair(&pair.key, &pair.value)?;
        copied += 1;
    }
    Ok(copied)
}

/// Reads pairs in the length-prefixed record format.
pub struct FramedReader<R> {
    inner: R,
}

impl<R: Read> FramedReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> PairReader for FramedReader<R> {
    fn next_pair(&mut self) -> Result<Option<RawPair>> {
        codec::read_record(&mut self.inner)
    }
}

/// Writes pairs in the length-prefixed record format.
pub struct FramedWriter<W: Write> {
    inner: BufWriter<W>,
}

impl<W: Write> FramedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.inner
            .into_inner()
            .map_err(|e| crate::Error::Io(e.into_error()))
    }
}

impl<W: Write> PairWriter for FramedWriter<W> {
    fn write_pair(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        codec::write_record(&mut self.inner, key, value)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Line-oriented text input for the map phase of a local run.
///
/// Each line becomes `(byte offset of the line, line)`, encoded as
/// `(u64, String)`. Line terminators (`\n` or `\r\n`) are stripped.
pub struct LineReader<R> {
    inner: R,
    offset: u64,
    line: String,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            line: String::new(),
        }
    }
}

impl<R: BufRead> PairReader for LineReader<R> {
    fn next_pair(&mut self) -> Result<Option<RawPair>> {
        self.line.clear();
        let read = self.inner.read_line(&mut self.line)?;
        if read == 0 {
            return Ok(None);
        }
        let offset = self.offset;
        self.offset += read as u64;

        let text = self
            .line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(&self.line);
        RawPair::encode(&offset, text).map(Some)
    }
}

/// Terminal text output of a local run.
///
/// Pairs are decoded by `render` into JSON values and written as
/// `key\tvalue\n` lines, or one JSON object per line.
pub struct TextWriter<W: Write, F> {
    inner: BufWriter<W>,
    format: OutputFormat,
    render: F,
}

impl<W, F> TextWriter<W, F>
where
    W: Write,
    F: FnMut(&[u8], &[u8]) -> Result<(JsonValue, JsonValue)>,
{
    pub fn new(inner: W, format: OutputFormat, render: F) -> Self {
        Self {
            inner: BufWriter::new(inner),
            format,
            render,
        }
    }
}

impl<W, F> PairWriter for TextWriter<W, F>
where
    W: Write,
    F: FnMut(&[u8], &[u8]) -> Result<(JsonValue, JsonValue)>,
{
    fn write_pair(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let (key, value) = (self.render)(key, value)?;
        match self.format {
            OutputFormat::Plain => {
                writeln!(self.inner, "{}\t{}", plain(&key), plain(&value))?;
            }
            OutputFormat::Json => {
                let mut object = serde_json::Map::new();
                object.insert(plain(&key), value);
                serde_json::to_writer(&mut self.inner, &object)?;
                self.inner.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

fn plain(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => "null".to_string(),
        JsonValue::Array(arr) => arr.iter().map(plain).collect::<Vec<_>>().join(","),
        JsonValue::Object(_) => value.to_string(),
    }
}

//! Regrouping of a key-sorted pair stream.
//!
//! A background producer thread owns the underlying reader. Each group's
//! values are handed to the consumer through a zero-capacity channel, so the
//! producer only advances (and only discovers the next key) as fast as the
//! consumer drains the current group.
//!
//! Grouping compares encoded keys for equality. The reader never sorts: equal
//! keys that are not adjacent in the input come out as separate groups.

use std::marker::PhantomData;
use std::thread::{self, JoinHandle};

use tracing::{error, trace};

use crate::error::{Error, Result};
use crate::io::{PairReader, RawPair};

pub struct GroupedReader {
    requests: Option<flume::Sender<OpenGroup>>,
    worker: Option<JoinHandle<()>>,
}

struct OpenGroup {
    values: flume::Sender<Vec<u8>>,
    respond_to: flume::Sender<Header>,
}

enum Header {
    Group(Vec<u8>),
    End,
    Failed(Error),
}

impl GroupedReader {
    /// Starts the producer for `reader`, which must yield equal keys
    /// contiguously.
    pub fn new<R>(reader: R) -> Result<Self>
    where
        R: PairReader + Send + 'static,
    {
        let (requests, incoming) = flume::unbounded();
        let worker = thread::Builder::new()
            .name("group-producer".into())
            .spawn(move || Producer::new(reader).serve(incoming))?;
        Ok(Self {
            requests: Some(requests),
            worker: Some(worker),
        })
    }

    /// Opens the next group.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. An error from the
    /// underlying reader is returned by the call following the group during
    /// which it happened, and only once.
    ///
    /// The returned group borrows the reader: it has to be drained, cancelled
    /// or dropped before the next call.
    pub fn next_group(&mut self) -> Result<Option<Group<'_>>> {
        let requests = self.requests.as_ref().ok_or(Error::ProducerLost)?;
        let (values, values_rx) = flume::bounded(0);
        let (respond_to, header) = flume::bounded(1);
        requests
            .send(OpenGroup { values, respond_to })
            .map_err(|_| Error::ProducerLost)?;

        match header.recv().map_err(|_| Error::ProducerLost)? {
            Header::Group(key) => Ok(Some(Group {
                key,
                values: GroupValues {
                    rx: Some(values_rx),
                    _reader: PhantomData,
                },
            })),
            Header::End => Ok(None),
            Header::Failed(e) => Err(e),
        }
    }
}

impl Drop for GroupedReader {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("group producer panicked");
            }
        }
    }
}

/// A key and the lazily produced sequence of its values.
pub struct Group<'a> {
    key: Vec<u8>,
    values: GroupValues<'a>,
}

impl<'a> Group<'a> {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn values(&mut self) -> &mut GroupValues<'a> {
        &mut self.values
    }

    pub fn into_parts(self) -> (Vec<u8>, GroupValues<'a>) {
        (self.key, self.values)
    }
}

/// Single-pass value sequence of one group.
///
/// Dropping it before the end cancels the group: the producer discards the
/// values it has not handed off yet and moves on to the next key.
pub struct GroupValues<'a> {
    rx: Option<flume::Receiver<Vec<u8>>>,
    _reader: PhantomData<&'a mut GroupedReader>,
}

impl GroupValues<'_> {
    /// Stops consuming this group. Remaining values are discarded.
    pub fn cancel(&mut self) {
        if self.rx.take().is_some() {
            trace!("group cancelled by consumer");
        }
    }
}

impl Iterator for GroupValues<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let value = self.rx.as_ref()?.recv().ok();
        if value.is_none() {
            self.rx = None;
        }
        value
    }
}

enum Terminal {
    End,
    Failed(Error),
}

struct Producer<R> {
    reader: R,
    pending: Option<RawPair>,
    terminal: Option<Terminal>,
}

impl<R: PairReader> Producer<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            pending: None,
            terminal: None,
        }
    }

    fn serve(mut self, incoming: flume::Receiver<OpenGroup>) {
        while let Ok(OpenGroup { values, respond_to }) = incoming.recv() {
            let first = match self.open() {
                Ok(Some(pair)) => pair,
                Ok(None) => {
                    let _ = respond_to.send(Header::End);
                    continue;
                }
                Err(e) => {
                    let _ = respond_to.send(Header::Failed(e));
                    continue;
                }
            };

            let RawPair { key, value } = first;
            if respond_to.send(Header::Group(key.clone())).is_err() {
                self.pending = Some(RawPair { key, value });
                continue;
            }
            self.produce(&key, value, &values);
        }
        trace!("group producer stopped");
    }

    /// Takes the first pair of the next group, or reports what ended the
    /// previous one.
    fn open(&mut self) -> Result<Option<RawPair>> {
        if let Some(pair) = self.pending.take() {
            return Ok(Some(pair));
        }
        match self.terminal.take() {
            Some(Terminal::Failed(e)) => {
                self.terminal = Some(Terminal::End);
                Err(e)
            }
            Some(Terminal::End) => {
                self.terminal = Some(Terminal::End);
                Ok(None)
            }
            None => match self.reader.next_pair() {
                Ok(pair) => {
                    if pair.is_none() {
                        self.terminal = Some(Terminal::End);
                    }
                    Ok(pair)
                }
                Err(e) => {
                    self.terminal = Some(Terminal::End);
                    Err(e)
                }
            },
        }
    }

    fn produce(&mut self, key: &[u8], first: Vec<u8>, values: &flume::Sender<Vec<u8>>) {
        let mut open = values.send(first).is_ok();
        loop {
            match self.reader.next_pair() {
                Ok(Some(pair)) if pair.key == key => {
                    if open {
                        open = values.send(pair.value).is_ok();
                    }
                }
                Ok(Some(pair)) => {
                    self.pending = Some(pair);
                    break;
                }
                Ok(None) => {
                    self.terminal = Some(Terminal::End);
                    break;
                }
                Err(e) => {
                    self.terminal = Some(Terminal::Failed(e));
                    break;
                }
            }
        }
        if !open {
            trace!(key_len = key.len(), "skipped the rest of a cancelled group");
        }
    }
}

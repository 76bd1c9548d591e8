//! Pull-based byte streams used between the source read and the destination
//! upload.
//!
//! Every adapter owns exactly one underlying source, consumes it forward-only
//! and counts the bytes it hands out so the engine can report output sizes.

use std::io::{ErrorKind, Read, Write};
use std::mem;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::contract::ObjectRef;
use crate::error::RelayError;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub trait ByteSource {
    /// Returns up to `max_bytes` bytes, or everything that remains when
    /// `max_bytes` is `None`. An empty result means the stream is exhausted.
    fn read(&mut self, max_bytes: Option<usize>) -> Result<Vec<u8>, RelayError>;

    /// Total bytes returned by `read` so far.
    fn bytes_emitted(&self) -> u64;
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn read(&mut self, max_bytes: Option<usize>) -> Result<Vec<u8>, RelayError> {
        (**self).read(max_bytes)
    }

    fn bytes_emitted(&self) -> u64 {
        (**self).bytes_emitted()
    }
}

fn take_front(buffer: &mut Vec<u8>, max_bytes: Option<usize>) -> Vec<u8> {
    match max_bytes {
        Some(limit) if limit < buffer.len() => {
            let rest = buffer.split_off(limit);
            mem::replace(buffer, rest)
        }
        _ => mem::take(buffer),
    }
}

/// In-memory source, mostly useful for small bodies and fixtures.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
    bytes_emitted: u64,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            bytes_emitted: 0,
        }
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, max_bytes: Option<usize>) -> Result<Vec<u8>, RelayError> {
        let chunk = take_front(&mut self.data, max_bytes);
        self.bytes_emitted += chunk.len() as u64;
        Ok(chunk)
    }

    fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted
    }
}

/// Adapts a blocking reader, such as an HTTP response body, into a `ByteSource`.
/// Read failures are reported as fetch errors against `object`.
pub struct ReaderSource<R> {
    reader: R,
    object: ObjectRef,
    bytes_emitted: u64,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R, object: ObjectRef) -> Self {
        Self {
            reader,
            object,
            bytes_emitted: 0,
        }
    }

    fn fetch_error(&self, error: std::io::Error) -> RelayError {
        RelayError::fetch(&self.object.bucket, &self.object.key, error.to_string())
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read(&mut self, max_bytes: Option<usize>) -> Result<Vec<u8>, RelayError> {
        let chunk = match max_bytes {
            None => {
                let mut chunk = Vec::new();
                self.reader
                    .read_to_end(&mut chunk)
                    .map_err(|error| self.fetch_error(error))?;
                chunk
            }
            Some(limit) => {
                let mut chunk = vec![0u8; limit];
                let count = loop {
                    match self.reader.read(&mut chunk) {
                        Ok(count) => break count,
                        Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                        Err(error) => return Err(self.fetch_error(error)),
                    }
                };
                chunk.truncate(count);
                chunk
            }
        };
        self.bytes_emitted += chunk.len() as u64;
        Ok(chunk)
    }

    fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted
    }
}

/// Relays an already gzip-encoded stream verbatim, re-slicing it to the
/// requested read sizes.
pub struct PassthroughSource<S> {
    raw: S,
    buffer: Vec<u8>,
    finished: bool,
    bytes_emitted: u64,
}

impl<S: ByteSource> PassthroughSource<S> {
    pub fn new(raw: S) -> Self {
        Self {
            raw,
            buffer: Vec::new(),
            finished: false,
            bytes_emitted: 0,
        }
    }
}

impl<S: ByteSource> ByteSource for PassthroughSource<S> {
    fn read(&mut self, max_bytes: Option<usize>) -> Result<Vec<u8>, RelayError> {
        while !self.finished && max_bytes.map_or(true, |limit| self.buffer.len() < limit) {
            let chunk = self.raw.read(Some(DEFAULT_CHUNK_SIZE))?;
            if chunk.is_empty() {
                self.finished = true;
            } else {
                self.buffer.extend_from_slice(&chunk);
            }
        }

        let chunk = take_front(&mut self.buffer, max_bytes);
        self.bytes_emitted += chunk.len() as u64;
        Ok(chunk)
    }

    fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted
    }
}

/// Gzip-compresses a plaintext source lazily, one source chunk at a time.
///
/// A single compressor spans the whole stream, so the concatenated output is
/// identical for any sequence of read sizes.
pub struct GzipCompressingSource<S> {
    source: S,
    chunk_size: usize,
    encoder: Option<GzEncoder<Vec<u8>>>,
    buffer: Vec<u8>,
    bytes_emitted: u64,
}

impl<S: ByteSource> GzipCompressingSource<S> {
    pub fn new(source: S) -> Self {
        Self::with_chunk_size(source, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(source: S, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            encoder: Some(GzEncoder::new(Vec::new(), Compression::default())),
            buffer: Vec::new(),
            bytes_emitted: 0,
        }
    }

    fn pull_chunk(&mut self) -> Result<(), RelayError> {
        let chunk = self.source.read(Some(self.chunk_size))?;
        if chunk.is_empty() {
            if let Some(encoder) = self.encoder.take() {
                let tail = encoder.finish().map_err(stream_error)?;
                self.buffer.extend_from_slice(&tail);
            }
            return Ok(());
        }

        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        encoder.write_all(&chunk).map_err(stream_error)?;
        self.buffer.append(encoder.get_mut());
        Ok(())
    }
}

impl<S: ByteSource> ByteSource for GzipCompressingSource<S> {
    fn read(&mut self, max_bytes: Option<usize>) -> Result<Vec<u8>, RelayError> {
        while self.encoder.is_some()
            && max_bytes.map_or(true, |limit| self.buffer.len() < limit)
        {
            self.pull_chunk()?;
        }

        let chunk = take_front(&mut self.buffer, max_bytes);
        self.bytes_emitted += chunk.len() as u64;
        Ok(chunk)
    }

    fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted
    }
}

fn stream_error(error: std::io::Error) -> RelayError {
    RelayError::Stream {
        message: error.to_string(),
    }
}

//! Chunked, compressed binary streams.
//!
//! [`ChunkedWriter`] compresses written bytes with zstd and cuts a chunk every
//! time the uncompressed bytes of the current chunk reach the configured
//! chunk size. Each finished chunk is handed to a [`ChunkSink`]. Closing the
//! writer emits the final chunk (always at least one, so empty blobs exist)
//! and lets the sink commit the blob. Dropping it without closing aborts.
//!
//! [`ChunkedReader`] pulls chunks from a [`ChunkSource`] in index order and
//! decompresses them transparently.

use std::io::{self, Cursor, Read, Write};

use tracing::warn;

use crate::error::{StorageError, StorageResult};

/// Destination of compressed chunks.
pub trait ChunkSink: Send {
    /// Persist chunk `index`. Chunk 0 replaces any previous blob.
    fn put_chunk(&mut self, index: u32, data: Vec<u8>) -> StorageResult<()>;

    /// The stream was closed after `chunk_count` chunks.
    fn commit(&mut self, chunk_count: u32) -> StorageResult<()>;

    /// The stream was dropped unclosed after `chunk_count` chunks.
    fn abort(&mut self, chunk_count: u32) -> StorageResult<()>;
}

/// Origin of compressed chunks.
pub trait ChunkSource: Send {
    /// Compressed payload of chunk `index`, or `None` past the last chunk.
    fn chunk(&mut self, index: u32) -> StorageResult<Option<Vec<u8>>>;
}

/// A blob write stream that must be closed explicitly.
pub trait BinaryDataWriter: Write + Send {
    /// Emit the final chunk and commit the blob.
    fn close(self: Box<Self>) -> StorageResult<()>;
}

fn to_io(e: StorageError) -> io::Error {
    match e {
        StorageError::Io(e) => e,
        other => io::Error::other(other),
    }
}

type Encoder = zstd::stream::write::Encoder<'static, Vec<u8>>;

pub struct ChunkedWriter<S: ChunkSink> {
    sink: S,
    chunk_size: usize,
    level: i32,
    encoder: Option<Encoder>,
    pending: usize,
    chunk_count: u32,
    finished: bool,
}

impl<S: ChunkSink> ChunkedWriter<S> {
    pub fn new(sink: S, chunk_size: usize, level: i32) -> Self {
        Self {
            sink,
            chunk_size: chunk_size.max(1),
            level,
            encoder: None,
            pending: 0,
            chunk_count: 0,
            finished: false,
        }
    }

    /// Chunks handed to the sink so far.
    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    fn encoder(&mut self) -> io::Result<&mut Encoder> {
        if self.encoder.is_none() {
            self.encoder = Some(Encoder::new(Vec::new(), self.level)?);
        }
        self.encoder
            .as_mut()
            .ok_or_else(|| io::Error::other("encoder unavailable"))
    }

    fn cut_chunk(&mut self) -> io::Result<()> {
        self.encoder()?;
        let data = match self.encoder.take() {
            Some(encoder) => encoder.finish()?,
            None => Vec::new(),
        };
        self.sink.put_chunk(self.chunk_count, data).map_err(to_io)?;
        self.chunk_count += 1;
        self.pending = 0;
        Ok(())
    }

    fn finish(&mut self) -> StorageResult<()> {
        if self.finished {
            return Ok(());
        }
        if self.chunk_count == 0 || self.pending > 0 {
            self.cut_chunk()?;
        }
        self.finished = true;
        self.sink.commit(self.chunk_count)
    }
}

impl<S: ChunkSink> Write for ChunkedWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::other("stream already closed"));
        }
        let mut rest = buf;
        while !rest.is_empty() {
            let take = rest.len().min(self.chunk_size - self.pending);
            self.encoder()?.write_all(&rest[..take])?;
            self.pending += take;
            rest = &rest[take..];
            if self.pending >= self.chunk_size {
                self.cut_chunk()?;
            }
        }
        Ok(buf.len())
    }

    // Chunk boundaries follow the chunk size only.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ChunkSink> BinaryDataWriter for ChunkedWriter<S> {
    fn close(mut self: Box<Self>) -> StorageResult<()> {
        self.finish()
    }
}

impl<S: ChunkSink> Drop for ChunkedWriter<S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        warn!(chunks = self.chunk_count, "binary data stream dropped without close, discarding");
        if let Err(e) = self.sink.abort(self.chunk_count) {
            warn!(error = %e, "failed to discard chunks of unclosed stream");
        }
    }
}

pub struct ChunkedReader<S: ChunkSource> {
    source: S,
    next_index: u32,
    current: Cursor<Vec<u8>>,
    exhausted: bool,
}

impl<S: ChunkSource> ChunkedReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            next_index: 0,
            current: Cursor::new(Vec::new()),
            exhausted: false,
        }
    }
}

impl<S: ChunkSource> Read for ChunkedReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.current.read(buf)?;
            if n > 0 || self.exhausted {
                return Ok(n);
            }
            match self.source.chunk(self.next_index).map_err(to_io)? {
                Some(data) => {
                    self.current = Cursor::new(zstd::decode_all(&data[..])?);
                    self.next_index += 1;
                }
                None => self.exhausted = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        chunks: Vec<Vec<u8>>,
        committed: Option<u32>,
        aborted: Option<u32>,
    }

    #[derive(Clone, Default)]
    struct VecSink(Arc<Mutex<Log>>);

    impl ChunkSink for VecSink {
        fn put_chunk(&mut self, index: u32, data: Vec<u8>) -> StorageResult<()> {
            let mut log = self.0.lock().unwrap();
            assert_eq!(index as usize, log.chunks.len());
            log.chunks.push(data);
            Ok(())
        }

        fn commit(&mut self, chunk_count: u32) -> StorageResult<()> {
            self.0.lock().unwrap().committed = Some(chunk_count);
            Ok(())
        }

        fn abort(&mut self, chunk_count: u32) -> StorageResult<()> {
            self.0.lock().unwrap().aborted = Some(chunk_count);
            Ok(())
        }
    }

    struct VecSource(Vec<Vec<u8>>);

    impl ChunkSource for VecSource {
        fn chunk(&mut self, index: u32) -> StorageResult<Option<Vec<u8>>> {
            Ok(self.0.get(index as usize).cloned())
        }
    }

    fn write_all(data: &[u8], chunk_size: usize) -> Log {
        let sink = VecSink::default();
        let mut writer = Box::new(ChunkedWriter::new(sink.clone(), chunk_size, 3));
        writer.write_all(data).unwrap();
        writer.close().unwrap();
        let log = std::mem::take(&mut *sink.0.lock().unwrap());
        log
    }

    fn read_all(chunks: Vec<Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::new();
        ChunkedReader::new(VecSource(chunks)).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn hello_with_chunk_size_two_makes_three_chunks() {
        let log = write_all(b"hello", 2);
        assert_eq!(log.chunks.len(), 3);
        assert_eq!(log.committed, Some(3));
        assert_eq!(read_all(log.chunks), b"hello");
    }

    #[test]
    fn empty_stream_still_emits_one_chunk() {
        let log = write_all(b"", 4);
        assert_eq!(log.chunks.len(), 1);
        assert_eq!(read_all(log.chunks), b"");
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        let log = write_all(b"abcd", 2);
        assert_eq!(log.chunks.len(), 2);
        assert_eq!(read_all(log.chunks), b"abcd");
    }

    #[test]
    fn many_small_writes_roundtrip() {
        let sink = VecSink::default();
        let mut writer = Box::new(ChunkedWriter::new(sink.clone(), 7, 1));
        let mut expected = Vec::new();
        for i in 0..100u8 {
            writer.write_all(&[i, i]).unwrap();
            expected.extend_from_slice(&[i, i]);
        }
        writer.close().unwrap();
        let chunks = std::mem::take(&mut sink.0.lock().unwrap().chunks);
        assert_eq!(chunks.len(), 200 / 7 + 1);
        assert_eq!(read_all(chunks), expected);
    }

    #[test]
    fn drop_without_close_aborts() {
        let sink = VecSink::default();
        {
            let mut writer = ChunkedWriter::new(sink.clone(), 2, 3);
            writer.write_all(b"hello").unwrap();
        }
        let log = sink.0.lock().unwrap();
        assert_eq!(log.committed, None);
        assert_eq!(log.aborted, Some(2));
    }

    #[test]
    fn corrupt_chunk_fails_read() {
        let mut out = Vec::new();
        let err = ChunkedReader::new(VecSource(vec![b"not zstd".to_vec()]))
            .read_to_end(&mut out)
            .unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}

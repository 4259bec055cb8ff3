//! LOB stream adapters.
//!
//! A [`LobReader`] exposes a locator as a forward-only [`std::io::Read`]
//! source, a [`LobWriter`] as an append-only [`std::io::Write`] sink. Both
//! keep a running 0-based offset and address the native layer 1-based.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::{Error, NativeContext, Result};
use crate::native::{LobHandle, Native};

/// A large object value.
///
/// Fetched LOB columns carry a [`LobReader`] over the locator; bound LOB
/// arguments carry any reader producing the content. A LOB without a
/// reader is NULL.
pub struct Lob {
    pub reader: Option<Box<dyn Read + Send>>,
    /// Character (CLOB) rather than binary (BLOB) content.
    pub is_clob: bool,
}

impl Lob {
    pub fn new(reader: impl Read + Send + 'static, is_clob: bool) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            is_clob,
        }
    }

    /// A NULL LOB.
    pub fn null(is_clob: bool) -> Self {
        Self {
            reader: None,
            is_clob,
        }
    }

    /// BLOB content held in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(io::Cursor::new(data.into()), false)
    }

    /// CLOB content held in memory.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(io::Cursor::new(text.into().into_bytes()), true)
    }

    pub fn is_null(&self) -> bool {
        self.reader.is_none()
    }

    /// Drain the reader. A NULL LOB yields `None`.
    pub fn read_all(&mut self) -> Result<Option<Vec<u8>>> {
        match self.reader.as_mut() {
            Some(reader) => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data).map_err(from_io)?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Drain the reader as UTF-8 text.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        match self.read_all()? {
            Some(data) => String::from_utf8(data)
                .map(Some)
                .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e))),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for Lob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lob")
            .field("is_clob", &self.is_clob)
            .field("null", &self.reader.is_none())
            .finish()
    }
}

/// Recover a crate error carried through an `io::Error`.
pub(crate) fn from_io(err: io::Error) -> Error {
    if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        if let Some(inner) = err.into_inner() {
            return match inner.downcast::<Error>() {
                Ok(e) => *e,
                Err(other) => Error::Io(io::Error::other(other)),
            };
        }
        return Error::Io(io::Error::other("empty I/O error"));
    }
    Error::Io(err)
}

fn to_io(err: Error) -> io::Error {
    io::Error::other(err)
}

/// Forward-only reader over a LOB locator.
///
/// The reader holds its own reference on the locator and releases it when
/// dropped. Once the end of the content has been seen, every later read
/// returns `Ok(0)` without calling the native layer.
pub struct LobReader {
    native: Arc<dyn Native>,
    lob: Option<LobHandle>,
    offset: u64,
    finished: bool,
}

impl LobReader {
    /// Take a reference on `lob` and read it from the start.
    pub fn new(native: &Arc<dyn Native>, lob: LobHandle) -> Result<Self> {
        native
            .lob_add_ref(lob)
            .context(|| format!("add reference to {}", lob))?;
        Ok(Self {
            native: Arc::clone(native),
            lob: Some(lob),
            offset: 0,
            finished: false,
        })
    }

    /// Bytes read so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Read for LobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.finished {
            return Ok(0);
        }
        let Some(lob) = self.lob else {
            return Ok(0);
        };
        match self.native.lob_read_bytes(lob, self.offset + 1, buf) {
            Ok(0) => {
                self.finished = true;
                Ok(0)
            }
            Ok(n) => {
                self.offset += n;
                trace!(%lob, offset = self.offset, n, "lob read");
                Ok(n as usize)
            }
            Err(e) if e.is_no_data_found() => {
                self.finished = true;
                Ok(0)
            }
            Err(e) => Err(to_io(Error::native(
                e,
                format!("read {} at offset {} length {}", lob, self.offset, buf.len()),
            ))),
        }
    }
}

impl Drop for LobReader {
    fn drop(&mut self) {
        if let Some(lob) = self.lob.take() {
            if let Err(e) = self.native.lob_release(lob) {
                warn!(%lob, error = %e, "failed to release lob");
            }
        }
    }
}

impl fmt::Debug for LobReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LobReader")
            .field("lob", &self.lob)
            .field("offset", &self.offset)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Append-only writer over a LOB locator.
///
/// The locator is borrowed: the caller keeps its reference and releases it.
/// The resource is opened on the first non-empty write and closed by
/// [`LobWriter::close`] (or best-effort on drop).
pub struct LobWriter {
    native: Arc<dyn Native>,
    lob: Option<LobHandle>,
    offset: u64,
    opened: bool,
    closed: bool,
    check_size: bool,
}

impl LobWriter {
    pub fn new(native: &Arc<dyn Native>, lob: LobHandle) -> Self {
        Self {
            native: Arc::clone(native),
            lob: Some(lob),
            offset: 0,
            opened: false,
            closed: false,
            check_size: true,
        }
    }

    /// Compare the LOB size with the offset after every write.
    pub fn with_size_check(mut self, check: bool) -> Self {
        self.check_size = check;
        self
    }

    /// Bytes written so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn write_chunk(&mut self, buf: &[u8]) -> Result<()> {
        let lob = self
            .lob
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "lob writer discarded its locator")))?;

        if !self.opened {
            if let Err(e) = self.native.lob_open_resource(lob) {
                self.lob = None;
                return Err(Error::native(e, format!("open {}", lob)));
            }
            self.opened = true;
        }

        if let Err(e) = self.native.lob_write_bytes(lob, self.offset + 1, buf) {
            if let Err(close_err) = self.native.lob_close_resource(lob) {
                warn!(%lob, error = %close_err, "failed to close lob after write error");
            }
            self.lob = None;
            return Err(Error::native(
                e,
                format!("write {} at offset {} length {}", lob, self.offset, buf.len()),
            ));
        }
        self.offset += buf.len() as u64;
        trace!(%lob, offset = self.offset, n = buf.len(), "lob write");

        if self.check_size {
            let size = self
                .native
                .lob_size(lob)
                .context(|| format!("size of {}", lob))?;
            if size != self.offset {
                return Err(Error::LobSizeMismatch {
                    lob,
                    size,
                    offset: self.offset,
                });
            }
        }
        Ok(())
    }

    /// Flush and close the resource. Idempotent; errors are not retried.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let Some(lob) = self.lob else {
            return Ok(());
        };
        if !self.opened {
            return Ok(());
        }
        let flushed = self
            .native
            .lob_flush_buffer(lob)
            .context(|| format!("flush {}", lob));
        let closed = self
            .native
            .lob_close_resource(lob)
            .context(|| format!("close {}", lob));
        flushed.and(closed)
    }
}

impl Write for LobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.write_chunk(buf).map_err(to_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lob {
            Some(lob) if self.opened && !self.closed => self
                .native
                .lob_flush_buffer(lob)
                .context(|| format!("flush {}", lob))
                .map_err(to_io),
            _ => Ok(()),
        }
    }
}

impl Drop for LobWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close lob writer");
        }
    }
}

impl fmt::Debug for LobWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LobWriter")
            .field("lob", &self.lob)
            .field("offset", &self.offset)
            .field("opened", &self.opened)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Stream `reader` into `writer` in pieces of at most `chunk` bytes.
pub(crate) fn copy_chunked(reader: &mut dyn Read, writer: &mut LobWriter, chunk: usize) -> Result<u64> {
    let mut buf = vec![0u8; chunk.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(from_io(e)),
        };
        writer.write_chunk(&buf[..n])?;
        total += n as u64;
    }
}

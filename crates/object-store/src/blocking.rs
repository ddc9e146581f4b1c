//! Blocking `io::Write + io::Seek` adapter over a [`SharedWriter`].
//!
//! Media streaming threads are plain OS threads, so they drive the async
//! writer through a runtime handle. Must not be used from inside the runtime.

use std::io::{self, Seek, SeekFrom, Write};

use tokio::runtime::Handle;

use crate::writer::SharedWriter;

/// Synchronous view of a shared writer.
#[derive(Debug, Clone)]
pub struct BlockingWriter {
    writer: SharedWriter,
    runtime: Handle,
}

impl BlockingWriter {
    pub fn new(writer: SharedWriter, runtime: Handle) -> Self {
        Self { writer, runtime }
    }

    pub fn shared(&self) -> &SharedWriter {
        &self.writer
    }

    pub fn position(&self) -> u64 {
        self.writer.blocking_lock().position()
    }
}

impl Write for BlockingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self.writer.blocking_lock();
        self.runtime
            .block_on(writer.write(buf))
            .map_err(io::Error::other)
    }

    // Parts are flushed as they fill; the rest is handled on close.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for BlockingWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut writer = self.writer.blocking_lock();
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => {
                writer.position().checked_add_signed(delta).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "Seek before start of output")
                })?
            }
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "Seeking relative to the end of the output is not supported",
                ))
            }
        };
        writer.set_cursor(target);
        Ok(target)
    }
}

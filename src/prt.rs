//! Run log sink.
//!
//! The tracer itself issues no I/O except through this sink. Callers either
//! supply their own implementation or let `setup` open `<FileRoot>.prt`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Destination for human-readable run messages.
///
/// Implementations must be usable from several workers at once.
pub trait LogSink: Send + Sync {
    fn emit(&self, msg: &str);
}

/// Sink that writes one line per message to a print file.
pub struct PrtFileSink {
    writer: Mutex<BufWriter<File>>,
}

impl PrtFileSink {
    /// Create (truncate) the print file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self { writer: Mutex::new(BufWriter::new(file)) })
    }
}

impl LogSink for PrtFileSink {
    fn emit(&self, msg: &str) {
        let mut w = self.writer.lock().unwrap();
        let _ = writeln!(w, "{msg}");
        let _ = w.flush();
    }
}

/// Sink that discards everything.
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _msg: &str) {}
}

/// Sink that collects messages in memory; used by tests.
#[derive(Default)]
pub struct VecSink {
    messages: Mutex<Vec<String>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }
}

impl LogSink for VecSink {
    fn emit(&self, msg: &str) {
        self.messages.lock().unwrap().push(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prt_file_sink_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.prt");
        let sink = PrtFileSink::create(&path).unwrap();
        sink.emit("hello");
        sink.emit("world");
        drop(sink);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "hello\nworld\n");
    }

    #[test]
    fn test_vec_sink_collects() {
        let sink = VecSink::new();
        sink.emit("a");
        sink.emit("b");
        assert_eq!(sink.take(), vec!["a", "b"]);
    }
}

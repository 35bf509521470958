use std::io::{self, Write};
use std::sync::Arc;

use bytecode::Image;
use parking_lot::Mutex;

use crate::config::VmConfig;
use crate::error::VmResult;
use crate::runtime::Runtime;

/// An in-memory sink that can be handed to a runtime and read afterwards.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output of one captured run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
    /// Output written before a failure is still captured.
    pub result: VmResult<()>,
}

/// Run `image` on a fresh runtime and collect what it writes.
pub fn run_and_capture(image: &Image, config: &VmConfig) -> Captured {
    let out = SharedBuffer::new();
    let err = SharedBuffer::new();
    let result = {
        let mut rt = Runtime::with_config(out.clone(), err.clone(), config.clone());
        rt.execute(image).and_then(|_| rt.flush())
    };
    Captured {
        stdout: out.contents(),
        stderr: err.contents(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_buffer() {
        let buf = SharedBuffer::new();
        let mut writer = buf.clone();
        writer.write_all(b"abc").unwrap();
        write!(writer, "{}", 42).unwrap();
        assert_eq!(buf.contents(), "abc42");
        assert_eq!(buf.len(), 5);
        buf.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn writers_on_other_threads_are_seen() {
        let buf = SharedBuffer::new();
        std::thread::scope(|s| {
            for i in 0..4 {
                let mut writer = buf.clone();
                s.spawn(move || writeln!(writer, "{i}").unwrap());
            }
        });
        let mut lines: Vec<_> = buf.contents().lines().map(String::from).collect();
        lines.sort();
        assert_eq!(lines, ["0", "1", "2", "3"]);
    }
}

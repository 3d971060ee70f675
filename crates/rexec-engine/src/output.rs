//! Explicit, line-granular output sink. Each worker prints one line at
//! a time through the shared lock, so "one line appears atomically" is
//! a contract of this type rather than an accident of the platform's
//! buffered-stream behavior.

use std::io::Write;
use std::sync::Mutex;

#[derive(Debug)]
pub struct OutputSink {
    stdout: Mutex<std::io::Stdout>,
    stderr: Mutex<std::io::Stderr>,
}

impl OutputSink {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(std::io::stdout()),
            stderr: Mutex::new(std::io::stderr()),
        }
    }

    /// Write one already-tagged line (including its trailing newline,
    /// if any) to stdout.
    pub fn emit_stdout(&self, line: &str) {
        let mut out = self.stdout.lock().unwrap();
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }

    pub fn emit_stderr(&self, line: &str) {
        let mut err = self.stderr.lock().unwrap();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Tag a line with its host name, matching the `HOST: LINE` framing
/// when labels are enabled, or passing it through unchanged otherwise.
/// The line's own trailing newline (or lack of one) is preserved.
pub fn label(host: &str, line: &str, labels: bool) -> String {
    if labels {
        format!("{host}: {line}")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_prefixes_host_when_enabled() {
        assert_eq!(label("h1", "hi\n", true), "h1: hi\n");
        assert_eq!(label("h1", "hi\n", false), "hi\n");
    }

    #[test]
    fn label_preserves_missing_trailing_newline() {
        assert_eq!(label("h1", "hi", true), "h1: hi");
    }
}

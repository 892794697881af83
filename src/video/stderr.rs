use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::thread::JoinHandle;

/// Lines kept from a child's stderr
const MAX_LINES: usize = 20;
/// Longest line kept, in bytes
const MAX_LINE_BYTES: usize = 512;

/// Drains a child process's stderr on a background thread.
///
/// ffmpeg blocks once the stderr pipe fills up, so the stream has to be read
/// while stdout/stdin are in use. Only the last few lines are kept.
pub struct StderrTail {
    handle: Option<JoinHandle<String>>,
}

impl StderrTail {
    pub fn spawn<R: Read + Send + 'static>(stderr: R) -> Self {
        let handle = std::thread::spawn(move || collect_tail(stderr, MAX_LINES));
        Self { handle: Some(handle) }
    }

    /// Wait for the stream to close and return what was kept.
    ///
    /// Blocks until the child exits or closes stderr.
    pub fn finish(&mut self) -> String {
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

fn collect_tail<R: Read>(stderr: R, max_lines: usize) -> String {
    let mut lines: VecDeque<String> = VecDeque::with_capacity(max_lines);

    for line in BufReader::new(stderr).split(b'\n') {
        let Ok(mut line) = line else {
            break;
        };
        line.truncate(MAX_LINE_BYTES);
        let text = String::from_utf8_lossy(&line).trim().to_string();
        if text.is_empty() {
            continue;
        }
        if lines.len() == max_lines {
            lines.pop_front();
        }
        lines.push_back(text);
    }

    lines.into_iter().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_keeps_only_the_last_lines() {
        let mut noise = String::new();
        for i in 0..10_000 {
            noise.push_str(&format!("[h264 @ 0x1] error while decoding MB {} 0\n", i));
        }
        assert!(noise.len() > 64 * 1024);

        let mut tail = StderrTail::spawn(Cursor::new(noise.into_bytes()));
        let kept = tail.finish();
        let lines: Vec<&str> = kept.lines().collect();

        assert_eq!(lines.len(), MAX_LINES);
        assert!(lines.last().unwrap().contains("MB 9999"));
        assert!(lines.first().unwrap().contains("MB 9980"));
    }

    #[test]
    fn test_long_lines_are_truncated() {
        let line = "x".repeat(10_000);
        let kept = collect_tail(Cursor::new(line.into_bytes()), 4);
        assert_eq!(kept.len(), MAX_LINE_BYTES);
    }

    #[test]
    fn test_finish_twice_is_empty() {
        let mut tail = StderrTail::spawn(Cursor::new(b"Invalid data found\n".to_vec()));
        assert_eq!(tail.finish(), "Invalid data found");
        assert_eq!(tail.finish(), "");
    }
}

//! Percentage extraction from a forwarding tool's console output.
//!
//! The tool prints progress bars such as `CPU 3% ... (1.2 MB/s) 58.5% [=====>   ]`.
//! [`ProgressWriter`] sits between the tool and its real destination: every
//! chunk is passed through unchanged and then scanned for the last
//! `<digits>.<digits>%` marker.

use std::{
    io::{self, Write},
    sync::LazyLock,
    time::Duration,
};

use regex::Regex;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::Instant,
};

/// Maximum sanitized line length in characters, before the ellipsis.
pub const MAX_LINE_CHARS: usize = 150;

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+)%").expect("valid percent regex"));
static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("valid ansi regex"));

/// Receiver of `(percent, line)` progress reports.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u32, line: &str);
}

impl<S: ProgressSink + ?Sized> ProgressSink for &S {
    fn report(&self, percent: u32, line: &str) {
        (**self).report(percent, line)
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<S> {
    fn report(&self, percent: u32, line: &str) {
        (**self).report(percent, line)
    }
}

/// Extract the last percentage marker of a chunk.
///
/// Returns the value rounded half-up together with the sanitized chunk, or
/// `None` when the chunk carries no marker.
pub fn parse_progress(chunk: &str) -> Option<(u32, String)> {
    let last = PERCENT_RE.captures_iter(chunk).last()?;
    let value: f64 = last.get(1)?.as_str().parse().ok()?;
    let rounded = (value + 0.5).floor();
    let percent = if rounded <= 0.0 {
        0
    } else if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    };
    Some((percent, sanitize_line(chunk)))
}

/// Strip ANSI escapes, fold newlines, drop the resource-usage preamble
/// before the first `(` and cap the length at [`MAX_LINE_CHARS`].
pub fn sanitize_line(raw: &str) -> String {
    let cleaned = ANSI_RE.replace_all(raw, "");
    let cleaned = cleaned.replace('\n', " ");
    let mut line = cleaned.trim();

    if let Some(idx) = line.find('(')
        && idx > 0
    {
        line = &line[idx..];
    }

    match line.char_indices().nth(MAX_LINE_CHARS) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

/// Interval gate for status re-renders.
///
/// The clock starts at construction, so the first report inside the interval
/// does not pass.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Instant,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `true` once more than `interval` passed since the last pass; resets the clock.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last) > self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Tee writer that forwards bytes to `inner` and reports progress markers to `sink`.
pub struct ProgressWriter<W: Write, S: ProgressSink> {
    inner: W,
    sink: S,
}

impl<W: Write, S: ProgressSink> ProgressWriter<W, S> {
    pub fn new(inner: W, sink: S) -> Self {
        Self { inner, sink }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write, S: ProgressSink> Write for ProgressWriter<W, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        let chunk = String::from_utf8_lossy(&buf[..n]);
        if let Some((percent, line)) = parse_progress(&chunk) {
            self.sink.report(percent, &line);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Drive an async stream through a [`ProgressWriter`] until EOF.
pub async fn pump<R, W, S>(mut reader: R, writer: &mut ProgressWriter<W, S>) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: Write,
    S: ProgressSink,
{
    let mut buf = [0u8; 8 * 1024];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

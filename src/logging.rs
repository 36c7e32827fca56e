use std::{
    collections::VecDeque,
    io::{self, Write},
    sync::{Arc, Mutex, OnceLock},
};

use tracing_subscriber::{EnvFilter, fmt, fmt::MakeWriter};

const MAX_LOG_LINES: usize = 2000;
const DEFAULT_LOG_LIMIT: usize = 200;

/// Bounded tail of recent log lines, ANSI-stripped.
#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    fn push(&self, raw: &[u8]) {
        if raw.is_empty() {
            return;
        }
        let mut guard = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() >= MAX_LOG_LINES {
            guard.pop_front();
        }
        let cleaned = strip_ansi(raw);
        guard.push_back(cleaned.trim_end().to_string());
    }

    fn tail(&self, limit: Option<usize>) -> Vec<String> {
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LINES);
        let guard = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        let start = guard.len().saturating_sub(limit);
        guard.iter().skip(start).cloned().collect()
    }
}

static LOG_BUFFER: OnceLock<LogBuffer> = OnceLock::new();

/// Install the global subscriber: stdout plus the in-memory tail.
pub fn init_logging() {
    let buffer = LOG_BUFFER.get_or_init(LogBuffer::default).clone();

    fmt()
        .with_env_filter(env_filter())
        .with_writer(LogMakeWriter { buffer })
        .init();
}

fn env_filter() -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    match "info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

pub fn get_logs(limit: Option<usize>) -> Vec<String> {
    LOG_BUFFER
        .get()
        .map(|buffer| buffer.tail(limit))
        .unwrap_or_default()
}

#[derive(Clone)]
struct LogMakeWriter {
    buffer: LogBuffer,
}

impl<'a> MakeWriter<'a> for LogMakeWriter {
    type Writer = LogWriter<io::Stdout>;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            buffer: self.buffer.clone(),
            line: Vec::new(),
            inner: io::stdout(),
        }
    }
}

/// Tees everything to `inner` while splitting lines into the buffer.
struct LogWriter<W: Write> {
    buffer: LogBuffer,
    line: Vec<u8>,
    inner: W,
}

impl<W: Write> LogWriter<W> {
    fn capture(&mut self, buf: &[u8]) {
        for &byte in buf {
            if byte == b'\n' {
                self.buffer.push(&self.line);
                self.line.clear();
            } else {
                self.line.push(byte);
            }
        }
    }

    fn flush_line(&mut self) {
        if !self.line.is_empty() {
            self.buffer.push(&self.line);
            self.line.clear();
        }
    }
}

impl<W: Write> Write for LogWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_all(buf)?;
        self.capture(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        self.flush_line();
        Ok(())
    }
}

impl<W: Write> Drop for LogWriter<W> {
    fn drop(&mut self) {
        self.flush_line();
    }
}

fn strip_ansi(input: &[u8]) -> String {
    let mut output = Vec::with_capacity(input.len());
    let mut idx = 0;
    while idx < input.len() {
        if input[idx] == 0x1b {
            idx += 1;
            if idx < input.len() && input[idx] == b'[' {
                idx += 1;
                while idx < input.len() && !(b'@'..=b'~').contains(&input[idx]) {
                    idx += 1;
                }
                if idx < input.len() {
                    idx += 1;
                }
                continue;
            }
        }
        output.push(input[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&output).into_owned()
}

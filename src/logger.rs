//! Kernel logging.
//!
//! Kept close to the source kernel's logger: a leveled, colorized line
//! writer over the serial port plus a ring buffer so a crash dump can
//! recover recent history even if the serial link was quiet. The VGA/
//! framebuffer sinks and TSC-based timestamping are out of this core's
//! scope (graphics, arch-specific boot) and were dropped; timestamps are
//! microseconds since [`init`] as supplied by the caller's tick source.

use core::fmt::{self, Write};
use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use spin::Mutex;

use crate::serial;

static mut LOG_BUFFER_POOL: [[u8; 1024]; 2] = [[0; 1024]; 2];
static LOG_BUFFER_IN_USE: AtomicBool = AtomicBool::new(false);

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);
static BOOT_TICKS: AtomicU64 = AtomicU64::new(0);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::INFO.priority());
static SERIAL_RUNTIME_ENABLED: AtomicBool = AtomicBool::new(true);

const RINGBUF_SIZE: usize = 65536;
static RINGBUF: Mutex<RingBuffer> = Mutex::new(RingBuffer::new());

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Panic,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Panic => "PANIC",
            LogLevel::Fatal => "FATAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn serial_color(self) -> &'static str {
        match self {
            LogLevel::Panic | LogLevel::Fatal => "\x1b[1;37;41m",
            LogLevel::Error => "\x1b[1;31m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Trace => "\x1b[90m",
        }
    }

    const fn priority(self) -> u8 {
        match self {
            LogLevel::Panic => 0,
            LogLevel::Fatal => 1,
            LogLevel::Error => 2,
            LogLevel::Warn => 3,
            LogLevel::Info => 4,
            LogLevel::Debug => 5,
            LogLevel::Trace => 6,
        }
    }

    fn from_priority(value: u8) -> Self {
        match value {
            0 => LogLevel::Panic,
            1 => LogLevel::Fatal,
            2 => LogLevel::Error,
            3 => LogLevel::Warn,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("panic") {
            Some(LogLevel::Panic)
        } else if value.eq_ignore_ascii_case("fatal") {
            Some(LogLevel::Fatal)
        } else if value.eq_ignore_ascii_case("error") {
            Some(LogLevel::Error)
        } else if value.eq_ignore_ascii_case("warn") || value.eq_ignore_ascii_case("warning") {
            Some(LogLevel::Warn)
        } else if value.eq_ignore_ascii_case("info") {
            Some(LogLevel::Info)
        } else if value.eq_ignore_ascii_case("debug") {
            Some(LogLevel::Debug)
        } else if value.eq_ignore_ascii_case("trace") {
            Some(LogLevel::Trace)
        } else {
            None
        }
    }
}

/// Brings up the logger. Idempotent; returns whether this call actually
/// performed initialization (false if already initialized).
pub fn init() -> bool {
    LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.load(Ordering::Relaxed)
}

/// Monotonic microsecond tick, bumped by the caller's timer interrupt
/// handler. The logger has no notion of wall-clock time of its own.
pub fn tick(microseconds: u64) {
    BOOT_TICKS.store(microseconds, Ordering::Relaxed);
}

pub fn boot_time_us() -> u64 {
    BOOT_TICKS.load(Ordering::Relaxed)
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if level.priority() > LOG_LEVEL.load(Ordering::Relaxed) {
        return;
    }

    let emit_serial = SERIAL_RUNTIME_ENABLED.load(Ordering::Relaxed)
        || level.priority() <= LogLevel::Error.priority();
    let timestamp_us = boot_time_us();

    let mut line = build_log_line(level, timestamp_us, args);

    if emit_serial {
        if let Some(buffer) = line.as_ref() {
            serial::write_bytes(buffer.as_bytes());
        } else {
            emit_serial_fallback(level, timestamp_us, args);
        }
    }

    if line.is_none() {
        line = build_log_line(level, timestamp_us, args);
    }
    if let Some(buffer) = line.as_ref() {
        RINGBUF.lock().write_bytes(buffer.as_bytes());
    }
}

pub fn set_max_level(level: LogLevel) {
    LOG_LEVEL.store(level.priority(), Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    LogLevel::from_priority(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn parse_level_directive(cmdline: &str) -> Option<LogLevel> {
    for token in cmdline.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel") {
                if let Some(level) = LogLevel::from_str(value) {
                    return Some(level);
                }
            }
        }
    }
    None
}

pub fn set_serial_output_enabled(enabled: bool) {
    SERIAL_RUNTIME_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn read_ringbuffer() -> [u8; RINGBUF_SIZE] {
    RINGBUF.lock().buf
}

pub fn ringbuffer_write_pos() -> usize {
    RINGBUF.lock().write_pos
}

fn emit_serial_fallback(level: LogLevel, timestamp_us: u64, args: fmt::Arguments<'_>) {
    serial::_print(format_args!(
        "{color}[{timestamp}] [{level:<5}] {message}\x1b[0m\n",
        color = level.serial_color(),
        timestamp = TimestampDisplay {
            microseconds: timestamp_us
        },
        level = LevelDisplay(level),
        message = args,
    ));
}

fn build_log_line(
    level: LogLevel,
    timestamp_us: u64,
    args: fmt::Arguments<'_>,
) -> Option<LogLineBuffer> {
    let mut buffer = LogLineBuffer::new()?;
    if buffer.write_str(level.serial_color()).is_err() {
        return None;
    }
    if write!(
        buffer,
        "[{timestamp}] [{level:<5}] ",
        timestamp = TimestampDisplay {
            microseconds: timestamp_us,
        },
        level = LevelDisplay(level)
    )
    .is_err()
    {
        return None;
    }
    if fmt::write(&mut buffer, args).is_err() {
        return None;
    }
    if buffer.write_str("\x1b[0m\n").is_err() {
        return None;
    }
    Some(buffer)
}

struct TimestampDisplay {
    microseconds: u64,
}

impl fmt::Display for TimestampDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.microseconds / 1_000_000;
        let micros = self.microseconds % 1_000_000;
        write!(f, "{:>5}.{:06}", seconds, micros)
    }
}

struct LevelDisplay(LogLevel);

impl fmt::Display for LevelDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5}", self.0.as_str())
    }
}

struct LogLineBuffer {
    buf: &'static mut [u8; 1024],
    len: usize,
}

impl LogLineBuffer {
    fn new() -> Option<Self> {
        if LOG_BUFFER_IN_USE
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            // SAFETY: we just won the exclusive claim on buffer 0.
            let buf_ptr = unsafe { addr_of_mut!(LOG_BUFFER_POOL[0]) };
            Some(Self {
                buf: unsafe { &mut *buf_ptr },
                len: 0,
            })
        } else {
            // SAFETY: buffer 1 is reserved for a log call nested inside
            // another (e.g. logging from within a panic that interrupted
            // a log already in flight).
            let buf_ptr = unsafe { addr_of_mut!(LOG_BUFFER_POOL[1]) };
            Some(Self {
                buf: unsafe { &mut *buf_ptr },
                len: 0,
            })
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Drop for LogLineBuffer {
    fn drop(&mut self) {
        LOG_BUFFER_IN_USE.store(false, Ordering::Release);
    }
}

impl fmt::Write for LogLineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.len + bytes.len() > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

struct RingBuffer {
    buf: [u8; RINGBUF_SIZE],
    write_pos: usize,
}

impl RingBuffer {
    const fn new() -> Self {
        Self {
            buf: [0; RINGBUF_SIZE],
            write_pos: 0,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        if self.write_pos >= RINGBUF_SIZE {
            self.write_pos %= RINGBUF_SIZE;
        }
        for &byte in bytes {
            self.buf[self.write_pos] = byte;
            self.write_pos += 1;
            if self.write_pos >= RINGBUF_SIZE {
                self.write_pos = 0;
            }
        }
    }
}

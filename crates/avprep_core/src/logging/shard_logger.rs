//! Per-shard logger with file and callback output.
//!
//! Each worker gets its own logger that:
//! - Appends to a dedicated log file (`<name>.log`)
//! - Sends messages to a callback (if provided)
//! - Supports compact mode with progress filtering
//! - Maintains a tail buffer for failure diagnosis
//!
//! The logger is shared by concurrent clip tasks behind an `Arc`.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-shard logger with dual output (file + callback).
pub struct ShardLogger {
    /// Logger name (shard label).
    name: String,
    /// Path to log file.
    log_path: PathBuf,
    /// File writer (buffered).
    file_writer: Mutex<Option<BufWriter<File>>>,
    /// Callback for forwarding formatted lines.
    callback: Mutex<Option<LogCallback>>,
    /// Logging configuration.
    config: LogConfig,
    /// Tail buffer for recent lines.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress value logged (for compact mode filtering).
    last_progress: Mutex<Option<u32>>,
}

impl ShardLogger {
    /// Create a new shard logger.
    ///
    /// # Arguments
    /// * `name` - Logger name (used in log filename)
    /// * `log_dir` - Directory to write the log file to
    /// * `config` - Logging configuration
    /// * `callback` - Optional callback receiving formatted lines
    pub fn new(
        name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let name = name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&name)));

        // Append so resumed runs keep earlier history
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let tail_capacity = config.error_tail.max(1);
        let logger = Self {
            name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback: Mutex::new(callback),
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(tail_capacity)),
            last_progress: Mutex::new(None),
        };

        let started = Local::now().format("%Y-%m-%d %H:%M:%S");
        logger.write_file(&format!("##### {} started {} #####", logger.name, started));
        Ok(logger)
    }

    /// Get the logger name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the log file path.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }

        let formatted = self.format_message(message);
        self.remember(&formatted);
        self.output(&formatted);
    }

    /// Log an info message.
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log a debug message.
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Log a warning message.
    pub fn warn(&self, message: &str) {
        let msg = MessagePrefix::Warning.format(message);
        self.log(LogLevel::Warn, &msg);
    }

    /// Log an error message.
    pub fn error(&self, message: &str) {
        let msg = MessagePrefix::Error.format(message);
        self.log(LogLevel::Error, &msg);
    }

    /// Log a phase marker.
    pub fn phase(&self, phase_name: &str) {
        let msg = MessagePrefix::Phase.format(phase_name);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a section marker.
    pub fn section(&self, section_name: &str) {
        let msg = MessagePrefix::Section.format(section_name);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a success message.
    pub fn success(&self, message: &str) {
        let msg = MessagePrefix::Success.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a per-clip detail line.
    ///
    /// In compact mode these only go to the tail buffer and the file.
    pub fn clip(&self, clip_id: &str, message: &str) {
        let formatted = self.format_message(&format!("[{}] {}", clip_id, message));
        self.remember(&formatted);
        if self.config.compact {
            self.write_file(&formatted);
        } else {
            self.output(&formatted);
        }
    }

    /// Log progress update (filtered in compact mode).
    ///
    /// Returns true if the progress was logged, false if filtered.
    pub fn progress(&self, percent: u32) -> bool {
        let percent = percent.min(100);
        {
            let mut last = self.last_progress.lock();
            if self.config.compact {
                let step = self.config.progress_step.max(1);
                let current_step = percent / step;
                if let Some(prev) = *last {
                    if current_step <= prev / step && percent < 100 {
                        return false;
                    }
                    if prev == 100 {
                        return false;
                    }
                }
            }
            *last = Some(percent);
        }

        let msg = format!("Progress: {}%", percent);
        self.log(LogLevel::Info, &msg);
        true
    }

    /// Log progress as `done` of `total` items.
    pub fn progress_items(&self, done: usize, total: usize) -> bool {
        let percent = if total == 0 {
            100
        } else {
            (done * 100 / total) as u32
        };
        self.progress(percent)
    }

    /// Show the tail buffer (typically after a failure).
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in &lines {
            self.output(line);
        }
    }

    /// Get the current tail buffer contents.
    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    /// Flush the log file.
    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Close the logger and release resources.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    /// Format a message with timestamp (if enabled).
    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn remember(&self, formatted: &str) {
        if self.config.error_tail == 0 {
            return;
        }
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.error_tail {
            buffer.pop_front();
        }
        buffer.push_back(formatted.to_string());
    }

    fn write_file(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }
    }

    /// Output a formatted message to file and callback.
    fn output(&self, formatted: &str) {
        self.write_file(formatted);

        if let Some(ref callback) = *self.callback.lock() {
            callback(formatted);
        }
    }
}

impl Drop for ShardLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

/// Builder for creating a ShardLogger with fluent API.
pub struct ShardLoggerBuilder {
    name: String,
    log_dir: PathBuf,
    config: LogConfig,
    callback: Option<LogCallback>,
}

impl ShardLoggerBuilder {
    /// Create a new builder.
    pub fn new(name: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            log_dir: log_dir.into(),
            config: LogConfig::default(),
            callback: None,
        }
    }

    /// Set the logging configuration.
    pub fn config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the log level.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Enable or disable compact mode.
    pub fn compact(mut self, compact: bool) -> Self {
        self.config.compact = compact;
        self
    }

    /// Set the callback.
    pub fn callback(mut self, callback: LogCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Set the callback if one is given.
    pub fn maybe_callback(mut self, callback: Option<LogCallback>) -> Self {
        if callback.is_some() {
            self.callback = callback;
        }
        self
    }

    /// Build the ShardLogger.
    pub fn build(self) -> std::io::Result<ShardLogger> {
        ShardLogger::new(self.name, self.log_dir, self.config, self.callback)
    }
}

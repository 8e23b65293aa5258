use std::{fmt::Write as _, thread};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::logging::rotate::Rotate;

pub mod rotate;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("default"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

pub struct LogMessage {
    pub level: Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

/// A named log file fed through a channel.
///
/// Callers never block on disk: lines go to a background thread which
/// batches them into `log/<date>_<name>.log`.
pub struct Logger {
    writer: UnboundedSender<LogMessage>,
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();
        let mut rotate = Rotate::new(format!("log/%Y-%m-%d_{}.log", log_name));

        let spawned = thread::Builder::new()
            .name(format!("log-{}", log_name))
            .spawn(move || {
                let mut line = String::with_capacity(4096);

                while let Some(received) = rx.blocking_recv() {
                    if writeln!(
                        &mut line,
                        "{} {} {}",
                        received.created_at.format("%F %X%.6f"),
                        received.level,
                        received.msg
                    )
                    .is_err()
                    {
                        continue;
                    }

                    if rx.is_empty() || line.len() >= 4096 {
                        if let Err(why) = rotate.write_msg(received.created_at, line.as_bytes()) {
                            error_console(format!("Failed to write log file because {:?}", why));
                            info_console(line.clone());
                        }
                        rotate.flush();
                        line.clear();
                    }
                }
            });

        if let Err(why) = spawned {
            error_console(format!("Failed to start the {} log writer because {:?}", log_name, why));
        }

        Logger { writer: tx }
    }

    pub fn debug(&self, log: String) {
        self.send(Level::Debug, log);
    }

    pub fn info(&self, log: String) {
        self.send(Level::Info, log);
    }

    pub fn warn(&self, log: String) {
        self.send(Level::Warn, log);
    }

    pub fn error(&self, log: String) {
        self.send(Level::Error, log);
    }

    fn send(&self, level: Level, msg: String) {
        if let Err(why) = self.writer.send(LogMessage::new(level, msg)) {
            error_console(why.0.msg);
        }
    }
}

pub fn debug_file_async(log: String) {
    LOGGER.debug(log);
}

pub fn info_file_async(log: String) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: String) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: String) {
    LOGGER.error(log);
}

pub fn info_console(log: String) {
    println!("{} Info {}", Local::now().format("%Y-%m-%d %H:%M:%S.%3f"), log);
}

pub fn error_console(log: String) {
    eprintln!("{} Error {}", Local::now().format("%Y-%m-%d %H:%M:%S.%3f"), log);
}

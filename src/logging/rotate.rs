use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, TimeDelta};

use crate::logging;

/// Default size of one file before a new generation starts: 10 MB
const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;
/// Files older than this many days are removed when the date changes
const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// Daily log file with size generations and age-based cleanup.
pub struct Rotate {
    /// strftime pattern, e.g. `log/%Y-%m-%d_http.log`
    fn_pattern: String,
    /// File name for the current date, without generation
    cur_base_fn: String,
    cur_fn: String,
    out_fh: Option<BufWriter<File>>,
    /// 0, 1, 2 ... within one date; never decreases
    generation: u32,
    max_size: u64,
    current_size: u64,
    max_age: TimeDelta,
}

impl Rotate {
    pub fn new(fn_pattern: String) -> Self {
        Self::with_options(fn_pattern, DEFAULT_MAX_SIZE, DEFAULT_MAX_AGE_DAYS)
    }

    pub fn with_options(fn_pattern: String, max_size: u64, max_age_days: i64) -> Self {
        Rotate {
            fn_pattern,
            cur_base_fn: String::new(),
            cur_fn: String::new(),
            out_fh: None,
            generation: 0,
            max_size,
            current_size: 0,
            max_age: TimeDelta::try_days(max_age_days).unwrap_or(TimeDelta::days(7)),
        }
    }

    /// Appends `msg` to the file for `now`, opening a new date or generation
    /// file when needed.
    pub fn write_msg(&mut self, now: DateTime<Local>, msg: &[u8]) -> Result<()> {
        let base_fn = now.format(&self.fn_pattern).to_string();
        if base_fn != self.cur_base_fn || self.out_fh.is_none() {
            let date_changed = base_fn != self.cur_base_fn;
            self.cur_base_fn = base_fn;
            self.generation = 0;
            self.open_new_file()?;
            if date_changed {
                self.cleanup_old_files(now);
            }
        }

        if self.current_size > 0 && self.current_size + msg.len() as u64 > self.max_size {
            self.generation += 1;
            self.open_new_file()?;
        }

        let writer = self
            .out_fh
            .as_mut()
            .ok_or_else(|| anyhow!("log file {} is not open", self.cur_fn))?;
        writer.write_all(msg)?;
        self.current_size += msg.len() as u64;

        Ok(())
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.out_fh.as_mut() {
            let _ = w.flush();
        }
    }

    pub fn current_file(&self) -> &str {
        &self.cur_fn
    }

    /// `log/2024-06-14_http.log`, then `log/2024-06-14_http.1.log` ...
    fn generate_full_fn(base_fn: &str, generation: u32) -> String {
        if generation == 0 {
            return base_fn.to_string();
        }

        let path = Path::new(base_fn);
        let parent = path.parent().unwrap_or(Path::new(""));
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("log");
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("log");
        parent
            .join(format!("{}.{}.{}", stem, generation, ext))
            .to_string_lossy()
            .to_string()
    }

    fn open_new_file(&mut self) -> Result<()> {
        self.flush();

        // skip generations that already exist so a restart never overwrites
        loop {
            let candidate = Self::generate_full_fn(&self.cur_base_fn, self.generation);
            let size = fs::metadata(&candidate).map(|m| m.len()).unwrap_or(0);
            if size < self.max_size {
                self.cur_fn = candidate;
                self.current_size = size;
                break;
            }
            self.generation += 1;
        }

        if let Some(parent) = Path::new(&self.cur_fn).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.cur_fn)?;
        self.out_fh = Some(BufWriter::with_capacity(4096, file));

        Ok(())
    }

    fn cleanup_old_files(&self, now: DateTime<Local>) {
        let cut_off = (now - self.max_age).timestamp().max(0) as u64;
        let files = match Self::files_in_directory(&self.cur_fn) {
            Ok(files) => files,
            Err(why) => {
                logging::error_console(format!("Failed to list log directory because {:?}", why));
                return;
            }
        };

        for file in files {
            let expired = fs::metadata(&file)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .is_some_and(|d| d.as_secs() <= cut_off);
            let is_log = file.extension().is_some_and(|e| e == "log");

            if expired && is_log {
                if let Err(why) = fs::remove_file(&file) {
                    logging::error_console(format!(
                        "couldn't remove the file({}). because {:?}",
                        file.display(),
                        why
                    ));
                }
            }
        }
    }

    fn files_in_directory<P: AsRef<Path>>(file_path: P) -> Result<Vec<PathBuf>, io::Error> {
        let parent_dir = file_path
            .as_ref()
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Parent directory not found"))?;

        let mut files = Vec::new();
        for entry in fs::read_dir(parent_dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }

        Ok(files)
    }
}

impl Drop for Rotate {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("index_tail_bot_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_generation_filename() {
        let base = "log/2024-06-14_http.log";
        assert_eq!(Rotate::generate_full_fn(base, 0), "log/2024-06-14_http.log");
        assert_eq!(Rotate::generate_full_fn(base, 2), "log/2024-06-14_http.2.log");
    }

    #[test]
    fn test_date_rotation() {
        let dir = scratch_dir("date");
        let pattern = format!("{}/%Y-%m-%d_test.log", dir.display());
        let mut r = Rotate::new(pattern);

        let day1 = Local::now();
        r.write_msg(day1, b"day 1\n").unwrap();
        let first = r.current_file().to_string();

        let day2 = day1 + TimeDelta::days(1);
        r.write_msg(day2, b"day 2\n").unwrap();
        r.flush();

        assert_ne!(first, r.current_file());
        assert_eq!(fs::read_to_string(&first).unwrap(), "day 1\n");
        assert_eq!(fs::read_to_string(r.current_file()).unwrap(), "day 2\n");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_size_rotation_never_overwrites() {
        let dir = scratch_dir("size");
        let pattern = format!("{}/%Y-%m-%d_size.log", dir.display());
        let mut r = Rotate::with_options(pattern, 256, 7);
        let now = Local::now();

        for i in 0..20 {
            let line = format!("line {:02} {}\n", i, "x".repeat(40));
            r.write_msg(now, line.as_bytes()).unwrap();
        }
        r.flush();

        assert!(r.generation >= 3, "generation {}", r.generation);
        let count = fs::read_dir(&dir).unwrap().count() as u32;
        assert_eq!(count, r.generation + 1);
        let _ = fs::remove_dir_all(&dir);
    }
}

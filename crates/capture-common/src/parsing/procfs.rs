//! Utility functions used to extract thread data from procfs

use glob::glob;
use lazy_static::lazy_static;
use nix::unistd::Pid;
use regex::Regex;
use std::{
    fs::{self, File},
    io::{self, BufReader, prelude::*},
    path::Path,
};
use thiserror::Error;

use crate::Tid;

lazy_static! {
    /// Pattern for matching thread directories.
    static ref RE_TASK_PATH: Regex = Regex::new(r"^/proc/(?P<pid>\d+)/task/(?P<tid>\d+)$").unwrap();
}

#[derive(Error, Debug)]
pub enum ProcfsError {
    #[error("reading file failed {path}")]
    ReadFile {
        #[source]
        source: io::Error,
        path: String,
    },
    #[error("parent for {0} not found")]
    ParentNotFound(String),
    #[error("globbing running threads")]
    GlobbingError(#[from] glob::PatternError),
    #[error("unreadable entry")]
    GlobError(#[from] glob::GlobError),
    #[error(transparent)]
    ParseIntError(#[from] std::num::ParseIntError),
}

/// A running thread and the process it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadEntry {
    pub pid: Pid,
    pub tid: Tid,
}

impl ThreadEntry {
    /// Whether this thread is the thread group leader.
    pub fn is_leader(&self) -> bool {
        self.pid.as_raw() as u64 == self.tid.as_raw()
    }
}

fn read_comm(path: &str) -> Result<String, ProcfsError> {
    let data = fs::read_to_string(path).map_err(|source| ProcfsError::ReadFile {
        source,
        path: path.to_string(),
    })?;
    Ok(data.trim_end_matches('\n').to_owned())
}

fn read_ppid(path: &str) -> Result<Pid, ProcfsError> {
    let file = File::open(path).map_err(|source| ProcfsError::ReadFile {
        source,
        path: path.to_string(),
    })?;

    let reader = BufReader::new(file);
    for line in reader.lines().map_while(Result::ok) {
        if let Some(value) = line.strip_prefix("PPid:") {
            return Ok(Pid::from_raw(value.trim().parse()?));
        }
    }

    Err(ProcfsError::ParentNotFound(path.to_string()))
}

/// Returns the command name for the given process.
pub fn get_process_comm(pid: Pid) -> Result<String, ProcfsError> {
    read_comm(&format!("/proc/{pid}/comm"))
}

/// Returns the command name of a single thread.
pub fn get_thread_comm(entry: ThreadEntry) -> Result<String, ProcfsError> {
    read_comm(&format!("/proc/{}/task/{}/comm", entry.pid, entry.tid))
}

/// Returns the parent of a given process.
pub fn get_process_parent_pid(pid: Pid) -> Result<Pid, ProcfsError> {
    read_ppid(&format!("/proc/{pid}/status"))
}

/// Returns all threads of all running processes.
pub fn get_running_threads() -> Result<Vec<ThreadEntry>, ProcfsError> {
    let mut threads = Vec::new();
    for entry in glob("/proc/[0-9]*/task/[0-9]*")? {
        let entry = match entry {
            Ok(entry) => entry,
            // threads come and go while we scan
            Err(err) => {
                log::trace!("skipping unreadable task entry: {err}");
                continue;
            }
        };
        if let Some(thread) = parse_task_path(&entry) {
            threads.push(thread);
        }
    }
    Ok(threads)
}

fn parse_task_path(path: &Path) -> Option<ThreadEntry> {
    let path = path.to_string_lossy();
    let caps = RE_TASK_PATH.captures(&path)?;
    let pid: i32 = caps.name("pid")?.as_str().parse().ok()?;
    let tid: u64 = caps.name("tid")?.as_str().parse().ok()?;
    Some(ThreadEntry {
        pid: Pid::from_raw(pid),
        tid: Tid::from_raw(tid),
    })
}

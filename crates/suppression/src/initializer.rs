use capture_common::{
    Tid,
    parsing::procfs::{self, ProcfsError, ThreadEntry},
};
use thiserror::Error;

use crate::engine::SuppressionBuilder;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("listing running threads")]
    Procfs(#[from] ProcfsError),
}

/// Parent of a thread as seen by the lineage: threads hang below their group
/// leader, leaders below their parent process.
fn parent_of(entry: ThreadEntry) -> Result<Tid, ProcfsError> {
    if entry.is_leader() {
        procfs::get_process_parent_pid(entry.pid).map(Tid::from)
    } else {
        Ok(Tid::from(entry.pid))
    }
}

impl SuppressionBuilder {
    /// Load the threads running on the system into the builder.
    ///
    /// Threads exiting while we scan are skipped. Returns the number of
    /// threads loaded.
    pub fn populate_from_procfs(&mut self) -> Result<usize, InitError> {
        let mut loaded = 0;
        let mut suppressed = 0;
        for entry in procfs::get_running_threads()? {
            let comm = match procfs::get_thread_comm(entry) {
                Ok(comm) => comm,
                Err(err) => {
                    log::debug!("Error getting comm of {}: {}", entry.tid, err);
                    continue;
                }
            };
            let parent = parent_of(entry).unwrap_or_else(|err| {
                log::debug!("Error getting parent of {}: {}", entry.tid, err);
                Tid::KERNEL
            });
            if self.observe(entry.tid, parent, &comm) {
                suppressed += 1;
            }
            loaded += 1;
        }
        log::debug!("loaded {loaded} threads from procfs, {suppressed} denylisted");
        Ok(loaded)
    }
}

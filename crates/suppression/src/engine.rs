use std::collections::HashSet;

use capture_common::{
    Tid,
    parsing::{
        EventRecord, EventType,
        schema::{LINEAGE_COMM_INDEX, LINEAGE_PTID_INDEX},
    },
};

use crate::{config::SuppressionConfig, lineage::LineageTree};

/// Outcome of [`SuppressionEngine::process_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Suppress,
}

/// Lineage data carried by process creation events.
struct Lineage {
    ptid: Tid,
    comm: String,
}

impl Lineage {
    /// `None` for records too short to carry the command name.
    fn from_record(record: &EventRecord) -> Option<Self> {
        if record.nparams() <= LINEAGE_COMM_INDEX {
            return None;
        }
        let ptid = match record.param(LINEAGE_PTID_INDEX).and_then(|p| p.as_i64()) {
            Ok(ptid) => ptid.unwrap_or(0),
            Err(err) => {
                log::debug!("{} without parent tid: {err}", record.event_type());
                return None;
            }
        };
        let comm = match record.param(LINEAGE_COMM_INDEX) {
            Ok(param) => {
                let data = param.data;
                let end = data.iter().position(|c| *c == 0).unwrap_or(data.len());
                String::from_utf8_lossy(&data[..end]).into_owned()
            }
            Err(err) => {
                log::debug!("{} without command: {err}", record.event_type());
                return None;
            }
        };
        Some(Self {
            ptid: Tid::from_raw(ptid as u64),
            comm,
        })
    }
}

/// Steady state suppression: decides which events are dropped before
/// reaching the consumers.
///
/// A thread is suppressed when its command name is denylisted or when its
/// parent is suppressed. Tid 0 is never suppressed.
#[derive(Debug, Default)]
pub struct SuppressionEngine {
    comms: HashSet<String>,
    tids: HashSet<Tid>,
    suppressed_events: u64,
}

impl SuppressionEngine {
    pub fn add_denylisted_command(&mut self, comm: impl Into<String>) {
        self.comms.insert(comm.into());
    }

    pub fn clear_denylist(&mut self) {
        self.comms.clear();
    }

    /// Suppress a thread, returning false for tid 0.
    pub fn suppress_tid(&mut self, tid: Tid) -> bool {
        if tid.is_kernel() {
            return false;
        }
        self.tids.insert(tid);
        true
    }

    pub fn clear_suppressed_tids(&mut self) {
        self.tids.clear();
    }

    pub fn is_suppressed(&self, tid: Tid) -> bool {
        !tid.is_kernel() && self.tids.contains(&tid)
    }

    /// Events suppressed so far.
    pub fn suppressed_event_count(&self) -> u64 {
        self.suppressed_events
    }

    pub fn suppressed_tid_count(&self) -> usize {
        self.tids.len()
    }

    fn suppress_event(&mut self, tid: Tid) -> Verdict {
        self.suppressed_events += 1;
        if self.suppress_tid(tid) {
            log::trace!("suppressing tid {tid}");
        }
        Verdict::Suppress
    }

    pub fn process_event(&mut self, record: &EventRecord) -> Verdict {
        if self.tids.is_empty() && self.comms.is_empty() {
            return Verdict::Pass;
        }
        let tid = record.tid();
        let event_type = record.event_type();

        if event_type.is_lineage() {
            let Some(lineage) = Lineage::from_record(record) else {
                return Verdict::Pass;
            };
            // A suppressed parent wins over the child's own name.
            if self.is_suppressed(lineage.ptid) {
                return self.suppress_event(tid);
            }
            return self.check_comm(tid, &lineage.comm);
        }

        if event_type == EventType::PROCEXIT_1_E {
            // Exit events always reach consumers, which retire their state.
            if self.tids.remove(&tid) {
                log::trace!("suppressed tid {tid} exited");
            }
            return Verdict::Pass;
        }

        if self.is_suppressed(tid) {
            self.suppressed_events += 1;
            Verdict::Suppress
        } else {
            Verdict::Pass
        }
    }

    fn check_comm(&mut self, tid: Tid, comm: &str) -> Verdict {
        if self.comms.contains(comm) {
            self.suppress_event(tid)
        } else {
            Verdict::Pass
        }
    }
}

/// Build phase of the suppression engine.
///
/// While the initial thread population is loaded the builder records the
/// lineage of every thread. [`SuppressionBuilder::finalize`] extends the
/// suppression to all descendants of suppressed threads and drops the
/// lineage.
#[derive(Debug, Default)]
pub struct SuppressionBuilder {
    engine: SuppressionEngine,
    tree: LineageTree,
}

impl SuppressionBuilder {
    pub fn new(config: &SuppressionConfig) -> Self {
        let mut builder = Self::default();
        for comm in &config.comms {
            builder.add_denylisted_command(comm.as_str());
        }
        for tid in &config.tids {
            builder.suppress_tid(*tid);
        }
        builder
    }

    pub fn add_denylisted_command(&mut self, comm: impl Into<String>) {
        self.engine.add_denylisted_command(comm);
    }

    pub fn suppress_tid(&mut self, tid: Tid) -> bool {
        self.engine.suppress_tid(tid)
    }

    pub fn lineage(&self) -> &LineageTree {
        &self.tree
    }

    /// Record a thread found while scanning the running system. Returns true
    /// if its command name is denylisted.
    pub fn observe(&mut self, tid: Tid, ptid: Tid, comm: &str) -> bool {
        self.tree.insert(tid, ptid, comm);
        self.engine.comms.contains(comm) && self.engine.suppress_tid(tid)
    }

    /// Process an event received during the build phase, recording the
    /// lineage it carries.
    pub fn observe_record(&mut self, record: &EventRecord) -> Verdict {
        if record.event_type().is_lineage() {
            // The lineage must be recorded even when nothing is denylisted yet.
            if let Some(lineage) = Lineage::from_record(record) {
                self.tree.insert(record.tid(), lineage.ptid, &lineage.comm);
            }
        }
        self.engine.process_event(record)
    }

    /// End the build phase.
    pub fn finalize(mut self) -> SuppressionEngine {
        let descendants = self.tree.descendants(&self.engine.tids);
        for tid in descendants {
            self.engine.suppress_tid(tid);
        }
        log::debug!(
            "suppression ready: {} threads in lineage, {} suppressed",
            self.tree.len(),
            self.engine.tids.len()
        );
        self.engine
    }
}

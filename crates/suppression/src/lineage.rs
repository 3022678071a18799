use std::collections::{HashMap, HashSet};

use capture_common::Tid;

/// Parent to children relations of the threads seen while starting up.
///
/// The tree only lives for the build phase of the suppression engine: once
/// the suppressed set has been extended to every descendant it's dropped.
#[derive(Debug, Default)]
pub struct LineageTree {
    nodes: HashMap<Tid, LineageNode>,
}

#[derive(Debug, Default)]
pub struct LineageNode {
    /// Empty for threads only known as parents.
    pub comm: String,
    pub children: Vec<Tid>,
}

impl LineageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `tid` with its command name as a child of `ptid`.
    pub fn insert(&mut self, tid: Tid, ptid: Tid, comm: &str) {
        if tid.is_kernel() {
            return;
        }
        let node = self.nodes.entry(tid).or_default();
        node.comm = comm.to_string();
        if !ptid.is_kernel() && ptid != tid {
            let parent = self.nodes.entry(ptid).or_default();
            if !parent.children.contains(&tid) {
                parent.children.push(tid);
            }
        }
    }

    pub fn contains(&self, tid: Tid) -> bool {
        self.nodes.contains_key(&tid)
    }

    pub fn comm(&self, tid: Tid) -> Option<&str> {
        self.nodes.get(&tid).map(|node| node.comm.as_str())
    }

    pub fn children(&self, tid: Tid) -> &[Tid] {
        self.nodes
            .get(&tid)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every thread reachable from `roots`, roots excluded unless they are
    /// descendants of another root.
    pub fn descendants<'a>(&self, roots: impl IntoIterator<Item = &'a Tid>) -> HashSet<Tid> {
        let mut found = HashSet::new();
        let mut stack: Vec<Tid> = roots
            .into_iter()
            .flat_map(|root| self.children(*root))
            .copied()
            .collect();
        while let Some(tid) = stack.pop() {
            if found.insert(tid) {
                stack.extend_from_slice(self.children(tid));
            }
        }
        found
    }
}

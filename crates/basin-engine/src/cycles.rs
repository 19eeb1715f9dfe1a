//! Cycle discovery and terminal classification.
//!
//! Color-walk over the functional graph: every node is visited exactly once,
//! so the whole classification is O(V) with an auxiliary stack bounded by
//! the longest walk.

use basin_common::{BasinResult, CancelFlag, CycleId, NodeId, CANCEL_CHECK_STRIDE};
use hashbrown::HashMap;

use crate::successor::SuccessorMap;

/// Depth recorded for HALT-terminating nodes (conceptually infinite).
pub const HALT_DEPTH: u32 = u32::MAX;

const WHITE: u8 = 0;
const GRAY: u8 = 1;
const BLACK: u8 = 2;

/// A maximal closed orbit under `f_N`. Members are listed in orbit order
/// starting from the identity node (the minimum member).
pub struct Cycle {
    pub id: CycleId,
    pub members: Vec<NodeId>,
}

impl Cycle {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// All cycles of one `f_N`, ordered by ascending id.
pub struct CycleTable {
    cycles: Vec<Cycle>,
    by_id: HashMap<u32, usize>,
}

impl CycleTable {
    fn new(mut cycles: Vec<Cycle>) -> Self {
        cycles.sort_by_key(|c| c.id);
        let by_id = cycles
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.0, i))
            .collect();
        Self { cycles, by_id }
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn get(&self, id: CycleId) -> Option<&Cycle> {
        self.by_id.get(&id.0).map(|&i| &self.cycles[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cycle> {
        self.cycles.iter()
    }
}

/// Per-node terminal classification for one N: which cycle (or HALT) each
/// trajectory resolves to, and how many steps away the first cycle member is.
pub struct Classification {
    n: u32,
    halt_code: u32,
    /// Cycle id (as raw node id) per node; `halt_code` for HALT-terminating.
    terminal: Vec<u32>,
    /// Steps to first cycle contact; 0 for members, `HALT_DEPTH` for HALT.
    depth: Vec<u32>,
    cycles: CycleTable,
}

impl Classification {
    #[inline]
    pub fn n(&self) -> u32 {
        self.n
    }

    #[inline]
    pub fn num_nodes(&self) -> u32 {
        self.terminal.len() as u32
    }

    #[inline]
    pub fn halt_code(&self) -> u32 {
        self.halt_code
    }

    /// The cycle this node resolves to, or `None` for HALT-terminating nodes.
    #[inline]
    pub fn terminal_of(&self, v: NodeId) -> Option<CycleId> {
        let t = self.terminal[v.index()];
        if t == self.halt_code {
            None
        } else {
            Some(CycleId(t))
        }
    }

    /// Steps to the first cycle member, or `None` for HALT-terminating nodes.
    #[inline]
    pub fn depth_of(&self, v: NodeId) -> Option<u32> {
        let d = self.depth[v.index()];
        if d == HALT_DEPTH {
            None
        } else {
            Some(d)
        }
    }

    #[inline]
    pub fn is_halt_terminating(&self, v: NodeId) -> bool {
        self.terminal[v.index()] == self.halt_code
    }

    pub fn cycles(&self) -> &CycleTable {
        &self.cycles
    }

    /// Raw terminal codes; entries equal to [`Self::halt_code`] mean HALT.
    pub fn raw_terminal(&self) -> &[u32] {
        &self.terminal
    }

    pub fn raw_depth(&self) -> &[u32] {
        &self.depth
    }

    /// Decompose into `(n, halt_code, terminal, depth, cycles)` so consumers
    /// that only need the flat arrays can drop the member lists.
    pub fn into_parts(self) -> (u32, u32, Vec<u32>, Vec<u32>, CycleTable) {
        (self.n, self.halt_code, self.terminal, self.depth, self.cycles)
    }
}

enum WalkOutcome {
    /// The walk fell off the graph (a node with no successor).
    Halt,
    /// The walk re-entered its own path; the cycle starts at this position.
    NewCycle(u32),
    /// The walk reached an already-resolved node.
    Resolved(u32),
}

/// Classify every node into (cycle id, depth) in one pass.
///
/// From each unvisited node, walk successors marking GRAY until the walk
/// halts, closes on itself (new cycle), or hits a BLACK node (inherit its
/// classification with a depth offset). Each node is pushed on a walk stack
/// at most once, so the total cost is O(V).
pub fn classify(succ: &SuccessorMap, cancel: &CancelFlag) -> BasinResult<Classification> {
    let v = succ.num_nodes() as usize;
    let halt = succ.halt_code();
    let raw = succ.raw();

    let mut color = vec![WHITE; v];
    let mut terminal = vec![halt; v];
    let mut depth = vec![HALT_DEPTH; v];
    // Position of each GRAY node in the current walk stack.
    let mut walk_pos = vec![0u32; v];
    let mut path: Vec<u32> = Vec::new();
    let mut cycles: Vec<Cycle> = Vec::new();
    let mut since_check = 0usize;

    for start in 0..v as u32 {
        if color[start as usize] != WHITE {
            continue;
        }
        path.clear();
        let mut cur = start;
        let outcome = loop {
            match color[cur as usize] {
                WHITE => {
                    color[cur as usize] = GRAY;
                    walk_pos[cur as usize] = path.len() as u32;
                    path.push(cur);
                    let next = raw[cur as usize];
                    if next == halt {
                        break WalkOutcome::Halt;
                    }
                    cur = next;
                }
                GRAY => break WalkOutcome::NewCycle(walk_pos[cur as usize]),
                _ => break WalkOutcome::Resolved(cur),
            }
        };

        match outcome {
            WalkOutcome::Halt => {
                // terminal/depth already hold the HALT sentinels.
                for &u in &path {
                    color[u as usize] = BLACK;
                }
            }
            WalkOutcome::NewCycle(k) => {
                let members = &path[k as usize..];
                let id = *members.iter().min().unwrap();
                for &m in members {
                    terminal[m as usize] = id;
                    depth[m as usize] = 0;
                }
                // Orbit order, rotated to start at the identity node.
                let pivot = members.iter().position(|&m| m == id).unwrap();
                let mut ordered = Vec::with_capacity(members.len());
                ordered.extend(members[pivot..].iter().map(|&m| NodeId(m)));
                ordered.extend(members[..pivot].iter().map(|&m| NodeId(m)));
                cycles.push(Cycle {
                    id: CycleId(id),
                    members: ordered,
                });
                for (i, &u) in path[..k as usize].iter().enumerate() {
                    terminal[u as usize] = id;
                    depth[u as usize] = k - i as u32;
                }
                for &u in &path {
                    color[u as usize] = BLACK;
                }
            }
            WalkOutcome::Resolved(resolved) => {
                let base_terminal = terminal[resolved as usize];
                let base_depth = depth[resolved as usize];
                let len = path.len() as u32;
                if base_depth != HALT_DEPTH {
                    for (i, &u) in path.iter().enumerate() {
                        terminal[u as usize] = base_terminal;
                        depth[u as usize] = base_depth + (len - i as u32);
                    }
                }
                for &u in &path {
                    color[u as usize] = BLACK;
                }
            }
        }

        since_check += path.len();
        if since_check >= CANCEL_CHECK_STRIDE {
            cancel.check()?;
            since_check = 0;
        }
    }

    Ok(Classification {
        n: succ.n(),
        halt_code: halt,
        terminal,
        depth,
        cycles: CycleTable::new(cycles),
    })
}

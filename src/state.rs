//! Tracks which checkpoints are safe to acknowledge.
//!
//! A checkpoint starts out *pending*: records that arrived before it may still
//! sit in a buffer. Once those records are written it becomes *ackable*, and
//! `take_ackable` hands it out exactly once. Only the latest checkpoint of a
//! scope is kept in either slot; older ones are superseded.
//!
//! In stream scope every stream is tracked on its own, so a slow stream never
//! holds back acknowledgment of a fast one. In global scope there is a single
//! slot that only advances on a flush of every stream.

use crate::error::{Error, Result};
use crate::message::{Checkpoint, CheckpointScope, StreamId};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug)]
struct Sequenced {
    seq: u64,
    checkpoint: Checkpoint,
}

#[derive(Debug)]
enum Slots {
    /// No checkpoint seen yet and no scope configured.
    Undecided,
    PerStream {
        pending: HashMap<StreamId, Sequenced>,
        ackable: HashMap<StreamId, Sequenced>,
    },
    Global {
        pending: Option<Checkpoint>,
        ackable: Option<Checkpoint>,
    },
}

impl Slots {
    fn for_scope(scope: CheckpointScope) -> Self {
        match scope {
            CheckpointScope::Stream => Self::PerStream {
                pending: HashMap::new(),
                ackable: HashMap::new(),
            },
            CheckpointScope::Global => Self::Global {
                pending: None,
                ackable: None,
            },
        }
    }

    fn scope(&self) -> Option<CheckpointScope> {
        match self {
            Self::Undecided => None,
            Self::PerStream { .. } => Some(CheckpointScope::Stream),
            Self::Global { .. } => Some(CheckpointScope::Global),
        }
    }
}

/// Pending/ackable bookkeeping for one sync.
#[derive(Debug)]
pub struct StateManager {
    slots: Slots,
    next_seq: u64,
}

impl StateManager {
    /// Creates a manager for `scope`, or one that adopts the scope of the
    /// first checkpoint when `scope` is `None`.
    pub fn new(scope: Option<CheckpointScope>) -> Self {
        Self {
            slots: scope.map_or(Slots::Undecided, Slots::for_scope),
            next_seq: 0,
        }
    }

    pub fn scope(&self) -> Option<CheckpointScope> {
        self.slots.scope()
    }

    /// Records a checkpoint that just arrived. It becomes the pending
    /// checkpoint of its scope, replacing any earlier pending one.
    pub fn add_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let received = checkpoint.scope();
        if let Slots::Undecided = self.slots {
            debug!(scope = %received, "checkpoint scope fixed by first checkpoint");
            self.slots = Slots::for_scope(received);
        }
        let seq = self.next_seq;

        match (&mut self.slots, checkpoint) {
            (Slots::PerStream { pending, ackable }, Checkpoint::Stream(cp)) => {
                let stream = cp.stream.clone();
                ackable.remove(&stream);
                pending.insert(
                    stream,
                    Sequenced {
                        seq,
                        checkpoint: Checkpoint::Stream(cp),
                    },
                );
            }
            (Slots::Global { pending, .. }, checkpoint @ Checkpoint::Global(_)) => {
                *pending = Some(checkpoint);
            }
            (slots, _) => {
                return Err(Error::CheckpointScopeMismatch {
                    expected: slots.scope().unwrap_or(received),
                    received,
                });
            }
        }
        self.next_seq += 1;
        Ok(())
    }

    /// Every record of `stream` received so far has been written.
    ///
    /// Only stream-scoped checkpoints advance here; a global checkpoint needs
    /// every stream flushed.
    pub fn mark_stream_flushed(&mut self, stream: &StreamId) {
        if let Slots::PerStream { pending, ackable } = &mut self.slots {
            if let Some(cp) = pending.remove(stream) {
                ackable.insert(stream.clone(), cp);
            }
        }
    }

    /// Every record received so far, on every stream, has been written.
    pub fn mark_all_flushed(&mut self) {
        match &mut self.slots {
            Slots::Undecided => {}
            Slots::PerStream { pending, ackable } => {
                ackable.extend(pending.drain());
            }
            Slots::Global { pending, ackable } => {
                if let Some(cp) = pending.take() {
                    *ackable = Some(cp);
                }
            }
        }
    }

    /// Hands out every ackable checkpoint in arrival order and forgets it.
    pub fn take_ackable(&mut self) -> Vec<Checkpoint> {
        match &mut self.slots {
            Slots::Undecided => Vec::new(),
            Slots::PerStream { ackable, .. } => {
                let mut ready: Vec<Sequenced> = ackable.drain().map(|(_, cp)| cp).collect();
                ready.sort_by_key(|cp| cp.seq);
                ready.into_iter().map(|cp| cp.checkpoint).collect()
            }
            Slots::Global { ackable, .. } => ackable.take().into_iter().collect(),
        }
    }

    pub fn pending_count(&self) -> usize {
        match &self.slots {
            Slots::Undecided => 0,
            Slots::PerStream { pending, .. } => pending.len(),
            Slots::Global { pending, .. } => usize::from(pending.is_some()),
        }
    }
}

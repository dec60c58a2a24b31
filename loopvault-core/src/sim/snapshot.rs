use crate::collab::{Checkpoint, ExternalError};

/// Stack of saved states backing a [`Journaled`] implementation.
///
/// [`Journaled`]: crate::collab::Journaled
#[derive(Debug, Clone)]
pub struct SnapshotStack<S> {
    saved: Vec<(Checkpoint, S)>,
    next: u64,
}

impl<S> Default for SnapshotStack<S> {
    fn default() -> Self {
        Self {
            saved: Vec::new(),
            next: 0,
        }
    }
}

impl<S: Clone> SnapshotStack<S> {
    pub fn push(&mut self, state: &S) -> Checkpoint {
        let checkpoint = Checkpoint(self.next);
        self.next += 1;
        self.saved.push((checkpoint, state.clone()));
        checkpoint
    }

    fn position(&self, checkpoint: Checkpoint) -> Option<usize> {
        self.saved.iter().rposition(|(cp, _)| *cp == checkpoint)
    }

    /// Pop back to `checkpoint` and return the state saved there.
    pub fn revert(&mut self, checkpoint: Checkpoint) -> Result<S, ExternalError> {
        let index = self
            .position(checkpoint)
            .ok_or(ExternalError::UnknownCheckpoint(checkpoint))?;
        let mut tail = self.saved.split_off(index);
        let (_, state) = tail.swap_remove(0);
        Ok(state)
    }

    /// Drop `checkpoint` and everything above it.
    pub fn release(&mut self, checkpoint: Checkpoint) {
        if let Some(index) = self.position(checkpoint) {
            self.saved.truncate(index);
        }
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_discards_later_checkpoints() {
        let mut stack = SnapshotStack::default();
        let a = stack.push(&1);
        let _b = stack.push(&2);
        assert_eq!(stack.revert(a).unwrap(), 1);
        assert_eq!(stack.depth(), 0);
        assert!(stack.revert(a).is_err());
    }

    #[test]
    fn release_keeps_earlier_checkpoints() {
        let mut stack = SnapshotStack::default();
        let a = stack.push(&"a");
        let b = stack.push(&"b");
        stack.release(b);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.revert(a).unwrap(), "a");
    }
}

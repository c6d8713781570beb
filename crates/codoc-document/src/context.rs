//! Change context - the staging buffer for one in-progress update.

use crate::change::Change;
use crate::error::Result;
use crate::operation::Operation;
use crate::presence::PresenceChange;
use codoc_core::{ChangeID, Ticket};
use codoc_crdt::Root;

/// Collects the operations one updater invocation produces.
///
/// The context owns the ticket allocation for the update: the first ticket
/// issued carries delimiter 1, and every subsequent ticket increments it, so
/// allocation order is deterministic. Operations are applied to the clone
/// graph as they are recorded; the frozen change replays them against the
/// authoritative graph afterwards.
pub struct ChangeContext<'a> {
    id: ChangeID,
    message: String,
    delimiter: u32,
    root: &'a mut Root,
    operations: Vec<Operation>,
}

impl<'a> ChangeContext<'a> {
    /// Create a context staging against the given clone graph.
    pub fn new(id: ChangeID, message: impl Into<String>, root: &'a mut Root) -> Self {
        ChangeContext {
            id,
            message: message.into(),
            delimiter: codoc_core::ticket::INITIAL_DELIMITER,
            root,
            operations: Vec::new(),
        }
    }

    /// The change id this context stages under.
    pub fn id(&self) -> ChangeID {
        self.id
    }

    /// Issue the next ticket of this update.
    pub fn issue_ticket(&mut self) -> Ticket {
        self.delimiter += 1;
        self.id.ticket(self.delimiter)
    }

    /// The clone graph being staged against.
    pub fn root(&self) -> &Root {
        self.root
    }

    /// The clone graph, mutably.
    pub fn root_mut(&mut self) -> &mut Root {
        self.root
    }

    /// Execute an operation against the clone and record it.
    pub fn apply(&mut self, operation: Operation) -> Result<()> {
        operation.execute(self.root)?;
        self.operations.push(operation);
        Ok(())
    }

    /// Record an operation already applied to the clone.
    pub fn record(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Whether any operations were recorded.
    pub fn has_ops(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Freeze into an immutable change.
    pub fn into_change(self, presence_change: Option<PresenceChange>) -> Change {
        Change::new(self.id, self.message, self.operations, presence_change)
    }
}

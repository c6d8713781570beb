//! Changes - the atomic unit of replication.

use crate::error::Result;
use crate::operation::Operation;
use crate::presence::{PresenceChange, PresenceMap};
use codoc_core::{ActorID, ChangeID};
use codoc_crdt::Root;
use serde::{Deserialize, Serialize};

/// An ordered list of operations plus an optional presence delta, authored
/// by one actor under one change id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    id: ChangeID,
    message: String,
    operations: Vec<Operation>,
    presence_change: Option<PresenceChange>,
}

impl Change {
    /// Create a change.
    pub fn new(
        id: ChangeID,
        message: impl Into<String>,
        operations: Vec<Operation>,
        presence_change: Option<PresenceChange>,
    ) -> Self {
        Change {
            id,
            message: message.into(),
            operations,
            presence_change,
        }
    }

    /// The change id.
    pub fn id(&self) -> ChangeID {
        self.id
    }

    /// The client-local sequence number.
    pub fn client_seq(&self) -> u32 {
        self.id.client_seq()
    }

    /// The human-readable message attached by the author.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The operations, in execution order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// The presence delta, if any.
    pub fn presence_change(&self) -> Option<&PresenceChange> {
        self.presence_change.as_ref()
    }

    /// Rewrite the author, including every operation's execution stamp.
    pub fn set_actor(&mut self, actor: ActorID) {
        self.id = self.id.with_actor(actor);
        for operation in &mut self.operations {
            operation.set_actor(actor);
        }
    }

    /// Execute against a graph and presence map. Operations run in order;
    /// the presence delta, if present, installs last under the author.
    pub fn execute(&self, root: &mut Root, presences: &mut PresenceMap) -> Result<()> {
        for operation in &self.operations {
            operation.execute(root)?;
        }
        if let Some(presence_change) = &self.presence_change {
            let actor = self.id.actor().to_hex();
            match presence_change {
                PresenceChange::Put(presence) => presences.store(&actor, presence.clone()),
                PresenceChange::Clear => {
                    presences.remove(&actor);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ElementSeed;
    use crate::presence::Presence;
    use codoc_core::Ticket;
    use codoc_crdt::PrimitiveValue;
    use serde_json::json;

    fn actor(last: u8) -> ActorID {
        let mut bytes = [0u8; 12];
        bytes[11] = last;
        ActorID::from_bytes(bytes)
    }

    #[test]
    fn test_execute_ops_then_presence() {
        let author = actor(1);
        let id = ChangeID::new(1, 1, author);
        let mut presence = Presence::new();
        presence.set("name", json!("alice"));

        let change = Change::new(
            id,
            "init",
            vec![Operation::Set {
                parent_created_at: Root::root_ticket(),
                key: "x".to_string(),
                value: ElementSeed::Primitive(PrimitiveValue::Integer(1)),
                executed_at: Ticket::new(1, 1, author),
            }],
            Some(PresenceChange::Put(presence)),
        );

        let mut root = Root::new();
        let mut presences = PresenceMap::new();
        change.execute(&mut root, &mut presences).unwrap();

        assert_eq!(root.marshal(), r#"{"x":1}"#);
        assert_eq!(
            presences.load(&author.to_hex()).unwrap().get("name"),
            Some(&json!("alice"))
        );
    }

    #[test]
    fn test_set_actor_rewrites_id_and_ops() {
        let mut change = Change::new(
            ChangeID::new(1, 1, ActorID::INITIAL),
            "",
            vec![Operation::Set {
                parent_created_at: Root::root_ticket(),
                key: "x".to_string(),
                value: ElementSeed::Primitive(PrimitiveValue::Integer(1)),
                executed_at: Ticket::new(1, 1, ActorID::INITIAL),
            }],
            None,
        );

        let assigned = actor(7);
        change.set_actor(assigned);

        assert_eq!(change.id().actor(), assigned);
        for op in change.operations() {
            assert_eq!(op.executed_at().actor(), assigned);
        }
    }

    #[test]
    fn test_clear_presence() {
        let author = actor(2);
        let mut presences = PresenceMap::new();
        presences.load_or_store(&author.to_hex()).set("k", json!(1));

        let change = Change::new(
            ChangeID::new(1, 1, author),
            "",
            Vec::new(),
            Some(PresenceChange::Clear),
        );
        let mut root = Root::new();
        change.execute(&mut root, &mut presences).unwrap();

        assert!(presences.load(&author.to_hex()).is_none());
    }
}

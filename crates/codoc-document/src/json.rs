//! The JSON view handed to updaters.
//!
//! Proxies translate user-facing mutations into operations: each mutation
//! issues a ticket from the change context, executes against the clone
//! graph, and is recorded on the in-progress change. Nothing here touches
//! the authoritative graph.

use crate::context::ChangeContext;
use crate::error::{DocError, Result};
use crate::operation::{ElementSeed, Operation};
use codoc_core::Ticket;
use codoc_crdt::{ElementBody, PrimitiveValue, Root};
use std::collections::BTreeMap;

/// A handle on an object element of the staged document.
pub struct JsonObject<'a, 'b> {
    ctx: &'a mut ChangeContext<'b>,
    target: Ticket,
}

impl<'a, 'b> JsonObject<'a, 'b> {
    pub(crate) fn new(ctx: &'a mut ChangeContext<'b>, target: Ticket) -> Self {
        JsonObject { ctx, target }
    }

    /// Set a member to a primitive value.
    pub fn set(&mut self, key: &str, value: impl Into<PrimitiveValue>) -> Result<()> {
        self.set_seed(key, ElementSeed::Primitive(value.into()))
            .map(|_| ())
    }

    /// Set a member to null.
    pub fn set_null(&mut self, key: &str) -> Result<()> {
        self.set(key, PrimitiveValue::Null)
    }

    /// Create an empty object member and return a handle on it.
    pub fn new_object(&mut self, key: &str) -> Result<JsonObject<'_, 'b>> {
        let created_at = self.set_seed(key, ElementSeed::Object)?;
        Ok(JsonObject::new(&mut *self.ctx, created_at))
    }

    /// Create an empty array member and return a handle on it.
    pub fn new_array(&mut self, key: &str) -> Result<JsonArray<'_, 'b>> {
        let created_at = self.set_seed(key, ElementSeed::Array)?;
        Ok(JsonArray {
            ctx: &mut *self.ctx,
            target: created_at,
        })
    }

    /// Create an empty text member and return a handle on it.
    pub fn new_text(&mut self, key: &str) -> Result<JsonText<'_, 'b>> {
        let created_at = self.set_seed(key, ElementSeed::Text)?;
        Ok(JsonText {
            ctx: &mut *self.ctx,
            target: created_at,
        })
    }

    /// Create an empty rich text member and return a handle on it.
    pub fn new_rich_text(&mut self, key: &str) -> Result<JsonRichText<'_, 'b>> {
        let created_at = self.set_seed(key, ElementSeed::RichText)?;
        Ok(JsonRichText {
            ctx: &mut *self.ctx,
            target: created_at,
        })
    }

    /// Create a counter member with an initial value.
    pub fn new_counter(&mut self, key: &str, value: i64) -> Result<JsonCounter<'_, 'b>> {
        let created_at = self.set_seed(key, ElementSeed::Counter(value))?;
        Ok(JsonCounter {
            ctx: &mut *self.ctx,
            target: created_at,
        })
    }

    /// Remove a member. Returns false when the key is absent.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let Some(member) = self.member(key) else {
            return Ok(false);
        };
        let executed_at = self.ctx.issue_ticket();
        self.ctx.apply(Operation::Remove {
            parent_created_at: self.target,
            created_at: member,
            executed_at,
        })?;
        Ok(true)
    }

    /// Whether a member is present.
    pub fn has(&self, key: &str) -> bool {
        self.live_member(key).is_some()
    }

    /// Navigate to an object member.
    pub fn object(&mut self, key: &str) -> Result<JsonObject<'_, 'b>> {
        let target = self.typed_member(key, "object", |body| {
            matches!(body, ElementBody::Object(_))
        })?;
        Ok(JsonObject::new(&mut *self.ctx, target))
    }

    /// Navigate to an array member.
    pub fn array(&mut self, key: &str) -> Result<JsonArray<'_, 'b>> {
        let target =
            self.typed_member(key, "array", |body| matches!(body, ElementBody::Array(_)))?;
        Ok(JsonArray {
            ctx: &mut *self.ctx,
            target,
        })
    }

    /// Navigate to a text member.
    pub fn text(&mut self, key: &str) -> Result<JsonText<'_, 'b>> {
        let target = self.typed_member(key, "text", |body| matches!(body, ElementBody::Text(_)))?;
        Ok(JsonText {
            ctx: &mut *self.ctx,
            target,
        })
    }

    /// Navigate to a rich text member.
    pub fn rich_text(&mut self, key: &str) -> Result<JsonRichText<'_, 'b>> {
        let target = self.typed_member(key, "rich text", |body| {
            matches!(body, ElementBody::RichText(_))
        })?;
        Ok(JsonRichText {
            ctx: &mut *self.ctx,
            target,
        })
    }

    /// Navigate to a counter member.
    pub fn counter(&mut self, key: &str) -> Result<JsonCounter<'_, 'b>> {
        let target = self.typed_member(key, "counter", |body| {
            matches!(body, ElementBody::Counter(_))
        })?;
        Ok(JsonCounter {
            ctx: &mut *self.ctx,
            target,
        })
    }

    fn set_seed(&mut self, key: &str, value: ElementSeed) -> Result<Ticket> {
        let executed_at = self.ctx.issue_ticket();
        self.ctx.apply(Operation::Set {
            parent_created_at: self.target,
            key: key.to_string(),
            value,
            executed_at,
        })?;
        Ok(executed_at)
    }

    fn live_member(&self, key: &str) -> Option<Ticket> {
        let root = self.ctx.root();
        let ElementBody::Object(object) = root.find(&self.target)?.body() else {
            return None;
        };
        let ticket = object.get(key)?;
        root.find(&ticket)
            .filter(|element| !element.is_removed())
            .map(|_| ticket)
    }

    fn member(&mut self, key: &str) -> Option<Ticket> {
        self.live_member(key)
    }

    fn typed_member(
        &self,
        key: &str,
        expected: &str,
        pred: fn(&ElementBody) -> bool,
    ) -> Result<Ticket> {
        let ticket = self
            .live_member(key)
            .ok_or_else(|| DocError::ElementNotFound(key.to_string()))?;
        let body = self
            .ctx
            .root()
            .find(&ticket)
            .expect("live member is registered")
            .body();
        if pred(body) {
            Ok(ticket)
        } else {
            Err(DocError::TypeMismatch {
                expected: expected.to_string(),
                found: body.type_name().to_string(),
            })
        }
    }
}

/// A handle on an array element of the staged document.
pub struct JsonArray<'a, 'b> {
    ctx: &'a mut ChangeContext<'b>,
    target: Ticket,
}

impl<'a, 'b> JsonArray<'a, 'b> {
    /// Append a primitive value.
    pub fn push(&mut self, value: impl Into<PrimitiveValue>) -> Result<()> {
        let prev = self.last_ticket();
        self.add_after(prev, value.into())
    }

    /// Insert a primitive value at a visible index.
    pub fn insert(&mut self, index: usize, value: impl Into<PrimitiveValue>) -> Result<()> {
        let prev = if index == 0 {
            Ticket::INITIAL
        } else {
            self.visible_at(index - 1).ok_or(DocError::IndexOutOfBounds {
                index,
                length: self.len(),
            })?
        };
        self.add_after(prev, value.into())
    }

    /// Remove the element at a visible index.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        let target = self.visible_at(index).ok_or(DocError::IndexOutOfBounds {
            index,
            length: self.len(),
        })?;
        let executed_at = self.ctx.issue_ticket();
        self.ctx.apply(Operation::Remove {
            parent_created_at: self.target,
            created_at: target,
            executed_at,
        })
    }

    /// The number of visible elements.
    pub fn len(&self) -> usize {
        self.visible_tickets().len()
    }

    /// Whether no visible elements remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn add_after(&mut self, prev: Ticket, value: PrimitiveValue) -> Result<()> {
        let executed_at = self.ctx.issue_ticket();
        self.ctx.apply(Operation::Add {
            parent_created_at: self.target,
            prev_created_at: prev,
            value: ElementSeed::Primitive(value),
            executed_at,
        })
    }

    fn array_children(&self) -> Vec<Ticket> {
        let root = self.ctx.root();
        let Some(element) = root.find(&self.target) else {
            return Vec::new();
        };
        let ElementBody::Array(array) = element.body() else {
            return Vec::new();
        };
        array.child_tickets()
    }

    /// The last linked child, tombstones included, as the append anchor.
    fn last_ticket(&self) -> Ticket {
        self.array_children().last().copied().unwrap_or(Ticket::INITIAL)
    }

    fn visible_tickets(&self) -> Vec<Ticket> {
        let root = self.ctx.root();
        self.array_children()
            .into_iter()
            .filter(|ticket| {
                root.find(ticket)
                    .is_some_and(|element| !element.is_removed())
            })
            .collect()
    }

    fn visible_at(&self, index: usize) -> Option<Ticket> {
        self.visible_tickets().get(index).copied()
    }
}

/// A handle on a text element of the staged document.
pub struct JsonText<'a, 'b> {
    ctx: &'a mut ChangeContext<'b>,
    target: Ticket,
}

impl<'a, 'b> JsonText<'a, 'b> {
    /// Replace the character range `[from, to)` with `content`.
    pub fn edit(&mut self, from: usize, to: usize, content: &str) -> Result<()> {
        edit_text(self.ctx, self.target, from, to, content)
    }

    /// The visible content.
    pub fn content(&self) -> String {
        text_content(self.ctx, self.target)
    }

    /// The visible character length.
    pub fn len(&self) -> usize {
        text_len(self.ctx, self.target)
    }

    /// Whether no visible characters remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A handle on a rich text element of the staged document.
pub struct JsonRichText<'a, 'b> {
    ctx: &'a mut ChangeContext<'b>,
    target: Ticket,
}

impl<'a, 'b> JsonRichText<'a, 'b> {
    /// Replace the character range `[from, to)` with `content`.
    pub fn edit(&mut self, from: usize, to: usize, content: &str) -> Result<()> {
        edit_text(self.ctx, self.target, from, to, content)
    }

    /// Apply attributes over the character range `[from, to)`.
    pub fn style(&mut self, from: usize, to: usize, attributes: &[(&str, &str)]) -> Result<()> {
        let executed_at = self.ctx.issue_ticket();
        let (from, to) = resolve_range(self.ctx, self.target, from, to)?;
        let attributes: BTreeMap<String, String> = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let text = text_body_mut(self.ctx, self.target);
        text.style(from, to, &attributes, executed_at)
            .expect("boundaries just resolved");
        self.ctx.record(Operation::Style {
            parent_created_at: self.target,
            from,
            to,
            attributes,
            executed_at,
        });
        Ok(())
    }

    /// The visible content.
    pub fn content(&self) -> String {
        text_content(self.ctx, self.target)
    }

    /// The visible character length.
    pub fn len(&self) -> usize {
        text_len(self.ctx, self.target)
    }

    /// Whether no visible characters remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A handle on a counter element of the staged document.
pub struct JsonCounter<'a, 'b> {
    ctx: &'a mut ChangeContext<'b>,
    target: Ticket,
}

impl<'a, 'b> JsonCounter<'a, 'b> {
    /// Add a delta to the counter.
    pub fn increase(&mut self, delta: i64) -> Result<()> {
        let executed_at = self.ctx.issue_ticket();
        self.ctx.apply(Operation::Increase {
            parent_created_at: self.target,
            delta,
            executed_at,
        })
    }

    /// The staged value.
    pub fn value(&self) -> i64 {
        match self.ctx.root().find(&self.target).map(|e| e.body()) {
            Some(ElementBody::Counter(n)) => *n,
            _ => 0,
        }
    }
}

fn edit_text(ctx: &mut ChangeContext<'_>, target: Ticket, from: usize, to: usize, content: &str) -> Result<()> {
    let executed_at = ctx.issue_ticket();
    let (from, to) = resolve_range(ctx, target, from, to)?;

    let text = text_body_mut(ctx, target);
    let max_created_by_actor = text
        .edit(from, to, content, executed_at, None)
        .expect("boundaries just resolved");
    ctx.record(Operation::Edit {
        parent_created_at: target,
        from,
        to,
        content: content.to_string(),
        max_created_by_actor,
        executed_at,
    });
    Ok(())
}

fn resolve_range(
    ctx: &mut ChangeContext<'_>,
    target: Ticket,
    from: usize,
    to: usize,
) -> Result<(codoc_crdt::TextPos, codoc_crdt::TextPos)> {
    let text = text_body_mut(ctx, target);
    let length = text.len();
    let from_pos = text.pos_at(from).ok_or(DocError::IndexOutOfBounds {
        index: from,
        length,
    })?;
    let to_pos = text
        .pos_at(to)
        .ok_or(DocError::IndexOutOfBounds { index: to, length })?;
    Ok((from_pos, to_pos))
}

fn text_body_mut<'r>(ctx: &'r mut ChangeContext<'_>, target: Ticket) -> &'r mut codoc_crdt::TextValue {
    let element = ctx
        .root_mut()
        .find_mut(&target)
        .expect("text proxy targets a registered element");
    match element.body_mut() {
        ElementBody::Text(text) | ElementBody::RichText(text) => text,
        _ => unreachable!("text proxy targets a text element"),
    }
}

fn text_content(ctx: &ChangeContext<'_>, target: Ticket) -> String {
    match ctx.root().find(&target).map(|e| e.body()) {
        Some(ElementBody::Text(text)) | Some(ElementBody::RichText(text)) => text.to_plain(),
        _ => String::new(),
    }
}

fn text_len(ctx: &ChangeContext<'_>, target: Ticket) -> usize {
    match ctx.root().find(&target).map(|e| e.body()) {
        Some(ElementBody::Text(text)) | Some(ElementBody::RichText(text)) => text.len(),
        _ => 0,
    }
}

/// Construct the root proxy for an update.
pub(crate) fn root_proxy<'a, 'b>(ctx: &'a mut ChangeContext<'b>) -> JsonObject<'a, 'b> {
    JsonObject::new(ctx, Root::root_ticket())
}

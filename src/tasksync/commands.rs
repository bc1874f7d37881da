//! # Command Queue
//!
//! Mutations are recorded as [`Command`]s and held in a FIFO [`CommandQueue`]
//! until the flush collaborator drains and transmits them as one batch. Order
//! matters: a `section_move` or `section_delete` may refer to a section whose
//! `section_add` sits earlier in the same batch, under its temp id.
//!
//! Each command serializes to the batch wire shape:
//!
//! ```text
//! { "type": "section_move", "uuid": "<token>", "temp_id": "<add only>", "args": { ... } }
//! ```

use crate::id::Id;
use crate::model::Section;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Add,
    Update,
    Move,
    Delete,
    Archive,
    Unarchive,
    Reorder,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Add => "section_add",
            CommandKind::Update => "section_update",
            CommandKind::Move => "section_move",
            CommandKind::Delete => "section_delete",
            CommandKind::Archive => "section_archive",
            CommandKind::Unarchive => "section_unarchive",
            CommandKind::Reorder => "section_reorder",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific command payload. The variant decides the wire `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "args")]
pub enum CommandArgs {
    #[serde(rename = "section_add")]
    Add(Section),
    #[serde(rename = "section_update")]
    Update(Section),
    #[serde(rename = "section_move")]
    Move { id: Id, parent_id: Id },
    #[serde(rename = "section_delete")]
    Delete { id: Id },
    #[serde(rename = "section_archive")]
    Archive { id: Id },
    #[serde(rename = "section_unarchive")]
    Unarchive { id: Id },
    #[serde(rename = "section_reorder")]
    Reorder { projects: Vec<Section> },
}

impl CommandArgs {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandArgs::Add(_) => CommandKind::Add,
            CommandArgs::Update(_) => CommandKind::Update,
            CommandArgs::Move { .. } => CommandKind::Move,
            CommandArgs::Delete { .. } => CommandKind::Delete,
            CommandArgs::Archive { .. } => CommandKind::Archive,
            CommandArgs::Unarchive { .. } => CommandKind::Unarchive,
            CommandArgs::Reorder { .. } => CommandKind::Reorder,
        }
    }
}

/// A recorded intent to mutate remote state. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    temp_id: Option<Id>,
    #[serde(flatten)]
    args: CommandArgs,
}

impl Command {
    /// Builds a command under the idempotency token `uuid`. Add commands
    /// carry the added record's id as their temp id.
    pub fn new(uuid: Uuid, args: CommandArgs) -> Self {
        let temp_id = match &args {
            CommandArgs::Add(section) => Some(section.id().clone()),
            _ => None,
        };
        Self {
            uuid,
            temp_id,
            args,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.args.kind()
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn temp_id(&self) -> Option<&Id> {
        self.temp_id.as_ref()
    }

    pub fn args(&self) -> &CommandArgs {
        &self.args
    }
}

/// Unbounded FIFO of pending commands. Appends are serialized so order holds
/// across threads.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Mutex<Vec<Command>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: Command) {
        self.commands.lock().push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    pub fn last(&self) -> Option<Command> {
        self.commands.lock().last().cloned()
    }

    /// Copy of the pending commands in enqueue order.
    pub fn pending(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    /// Takes every pending command, leaving the queue empty.
    pub fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// Puts a drained batch back ahead of anything queued since, keeping its
    /// order.
    pub fn requeue_front(&self, batch: Vec<Command>) {
        let mut commands = self.commands.lock();
        commands.splice(0..0, batch);
    }
}

//! # Section Client
//!
//! [`SectionClient`] is the entry point for everything a caller does with
//! sections. It owns its [`Cache`] and [`CommandQueue`] and composes them with
//! a [`Transport`] for the one read that must hit the server.
//!
//! ## Mutations never touch the network
//!
//! `add`, `update`, `move_section`, `delete`, `archive`, `unarchive` and
//! `reorder` only record intent. Each appends one command under a fresh token
//! and returns immediately. Only `add` also writes the cache, so a newly built
//! section is visible to reads before the server has confirmed it. Every other
//! change lands in the cache when the server's answer is applied through
//! [`SectionClient::apply_sync_response`].
//!
//! ## Reads
//!
//! [`SectionClient::get`] is always a fresh round trip and leaves the cache
//! alone. `get_all`, `resolve`, `find_by_name` and `find_one_by_name` are served
//! from the cache.
//!
//! ## Flushing
//!
//! Transmission belongs to the caller's dispatch loop: [`drain_commands`]
//! hands over the pending batch in order, and the server's response goes back
//! in through [`apply_sync_response`]. A batch that could not be sent goes
//! back through [`requeue_commands`], ahead of anything queued meanwhile.
//!
//! [`drain_commands`]: SectionClient::drain_commands
//! [`requeue_commands`]: SectionClient::requeue_commands
//! [`apply_sync_response`]: SectionClient::apply_sync_response

use crate::cache::Cache;
use crate::commands::{Command, CommandArgs, CommandQueue};
use crate::error::{Result, SyncError};
use crate::id::{Id, RandomTokens, TempIdMap, TokenSource};
use crate::model::{Section, SECTION_MARKER};
use crate::sync::{self, SyncReport, SyncResponse};
use crate::transport::{decode_body, Method, Transport};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SECTIONS_GET: &str = "sections/get";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SectionGetResponse {
    #[serde(alias = "Section")]
    pub section: Section,
}

pub struct SectionClient<T: Transport> {
    transport: T,
    cache: Cache<Section>,
    queue: CommandQueue,
    tokens: Box<dyn TokenSource>,
}

impl<T: Transport> SectionClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_ids(transport, Arc::new(TempIdMap::new()))
    }

    /// Client whose cache resolves ids through `ids`, typically shared with
    /// the clients of other entity types.
    pub fn with_ids(transport: T, ids: Arc<TempIdMap>) -> Self {
        Self {
            transport,
            cache: Cache::new(ids),
            queue: CommandQueue::new(),
            tokens: Box::new(RandomTokens),
        }
    }

    /// Replaces the generator used for command tokens.
    pub fn with_tokens(mut self, tokens: impl TokenSource + 'static) -> Self {
        self.tokens = Box::new(tokens);
        self
    }

    pub fn add(&self, section: Section) -> Section {
        self.cache.store(section.clone());
        self.enqueue(CommandArgs::Add(section.clone()));
        section
    }

    pub fn update(&self, section: Section) -> Section {
        self.enqueue(CommandArgs::Update(section.clone()));
        section
    }

    pub fn move_section(&self, id: &Id, parent_id: &Id) {
        self.enqueue(CommandArgs::Move {
            id: id.clone(),
            parent_id: parent_id.clone(),
        });
    }

    pub fn delete(&self, id: &Id) {
        self.enqueue(CommandArgs::Delete { id: id.clone() });
    }

    pub fn archive(&self, id: &Id) {
        self.enqueue(CommandArgs::Archive { id: id.clone() });
    }

    pub fn unarchive(&self, id: &Id) {
        self.enqueue(CommandArgs::Unarchive { id: id.clone() });
    }

    /// One command for the whole list, in the given order.
    pub fn reorder(&self, sections: Vec<Section>) {
        self.enqueue(CommandArgs::Reorder { projects: sections });
    }

    fn enqueue(&self, args: CommandArgs) {
        let command = Command::new(self.tokens.next_token(), args);
        debug!(kind = %command.kind(), uuid = %command.uuid(), "queued command");
        self.queue.push(command);
    }

    /// Fetches one section from the server, bypassing the cache.
    pub async fn get(&self, cancel: &CancellationToken, id: &Id) -> Result<SectionGetResponse> {
        let section_id = id.to_string();
        let request = self.transport.new_request(
            Method::Get,
            SECTIONS_GET,
            &[("section_id", section_id.as_str())],
        )?;
        debug!(method = %request.method, url = %request.url, "sending request");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            response = self.transport.execute(request) => response?,
        };
        decode_body(&response)
    }

    pub fn get_all(&self) -> Arc<Vec<Section>> {
        self.cache.get_all()
    }

    pub fn resolve(&self, id: &Id) -> Option<Section> {
        self.cache.resolve(id)
    }

    /// Cached sections whose name contains `query` (case-sensitive), in
    /// insertion order. A leading `#` on the query is ignored.
    pub fn find_by_name(&self, query: &str) -> Vec<Section> {
        let needle = strip_marker(query);
        self.cache
            .get_all()
            .iter()
            .filter(|section| section.name.contains(needle))
            .cloned()
            .collect()
    }

    /// Exact name match if there is one, otherwise the first substring match.
    ///
    /// The exact comparison uses the query with its leading `#` removed, so
    /// `"#work"` picks a section named `work` over `workshop` instead of
    /// falling back to the first substring match.
    pub fn find_one_by_name(&self, query: &str) -> Option<Section> {
        let needle = strip_marker(query);
        let mut matches = self.find_by_name(query);
        let index = matches
            .iter()
            .position(|section| section.name == needle)
            .unwrap_or(0);
        if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(index))
        }
    }

    /// Pending commands in enqueue order, left in the queue.
    pub fn pending_commands(&self) -> Vec<Command> {
        self.queue.pending()
    }

    /// Takes the pending batch for transmission.
    pub fn drain_commands(&self) -> Vec<Command> {
        let batch = self.queue.drain();
        debug!(count = batch.len(), "drained command queue");
        batch
    }

    /// Returns an untransmitted batch to the front of the queue.
    pub fn requeue_commands(&self, batch: Vec<Command>) {
        debug!(count = batch.len(), "requeued command batch");
        self.queue.requeue_front(batch);
    }

    /// Folds the server's answer to a transmitted batch into the cache.
    pub fn apply_sync_response(&self, response: SyncResponse) -> SyncReport {
        sync::apply(response, &self.cache)
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn ids(&self) -> &Arc<TempIdMap> {
        self.cache.ids()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn strip_marker(query: &str) -> &str {
    query.strip_prefix(SECTION_MARKER).unwrap_or(query)
}

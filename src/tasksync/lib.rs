//! # Tasksync Architecture
//!
//! Tasksync is the **optimistic-mutation core** of a task-management sync client.
//! Callers change remote sections through local calls that return at once; the
//! network is involved only when a dispatch loop flushes the queued commands and
//! hands the server's answer back.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Client Layer (client.rs)                                   │
//! │  - SectionClient: mutations, cached reads, server `get`     │
//! │  - Flush hooks: drain_commands / apply_sync_response        │
//! └─────────────────────────────────────────────────────────────┘
//!            │                    │                    │
//!            ▼                    ▼                    ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │ cache.rs         │ │ commands.rs      │ │ transport/       │
//! │ copy-on-write    │ │ FIFO of pending  │ │ Transport trait, │
//! │ record snapshot  │ │ commands         │ │ decode_body      │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//!            │                    │
//!            ▼                    ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Domain (model.rs, id.rs)                                   │
//! │  - Section, Entity, the temp/permanent Id, TempIdMap        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Dual Id System
//!
//! A section built locally carries a temporary UUID until the server accepts its
//! `section_add` and assigns a permanent id. Both ids name the same entity; the
//! shared [`id::TempIdMap`] records the pairing so caches and callers can keep
//! using whichever form they hold. See `id.rs`.
//!
//! ## Key Principle: Mutations Are Infallible
//!
//! Once a [`model::Section`] is built (the only step that validates), every
//! mutation just appends to in-memory structures and cannot fail. Rejections
//! surface later, in the [`sync::SyncReport`] produced when the server's
//! response is applied. Only [`client::SectionClient::get`] returns transport
//! and decoding errors.
//!
//! ## Module Overview
//!
//! - [`client`]: `SectionClient`, the entry point for all section operations
//! - [`cache`]: copy-on-write local cache, generic over [`cache::Record`]
//! - [`commands`]: command payloads and the pending queue
//! - [`sync`]: applying server responses to the cache
//! - [`transport`]: request/response seam and an in-memory implementation
//! - [`model`]: `Section` and shared entity fields
//! - [`id`]: temp/permanent ids and token generation
//! - [`config`]: client configuration
//! - [`error`]: error types

pub mod cache;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod id;
pub mod model;
pub mod sync;
pub mod transport;

pub use client::{SectionClient, SectionGetResponse};
pub use error::{Result, SyncError};
pub use id::Id;
pub use model::{NewSectionOpts, Section};

// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types live in `engram-core::types` so they can cross
//! trait boundaries; this module re-exports them for convenience
//! within the storage crate.

pub use engram_core::types::{
    Observation, ObservationKind, PendingMessage, PendingStatus, Session, Summary, Tag,
};

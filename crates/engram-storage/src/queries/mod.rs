// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table family.

pub mod observations;
pub mod outbox;
pub mod sessions;
pub mod summaries;
pub mod tags;

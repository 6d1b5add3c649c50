// Copyright 2026 the Karst Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node storage, identity, and traversal.

mod id;
mod store;
mod table;
mod traverse;

pub use id::{CompactIndex, NodeHandle};
pub use store::{Hierarchy, NodeKind, Operation};
pub use traverse::{Ancestors, Children};

pub(crate) use id::INVALID;
pub(crate) use table::HandleTable;

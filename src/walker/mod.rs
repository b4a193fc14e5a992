//! Bounded-concurrency namespace walker
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │      TreeWalker         │
//!                     │  - list, visit, join    │
//!                     │  - post-order leave_dir │
//!                     └───────────┬─────────────┘
//!                                 │ subdirectory
//!                   ┌─────────────┴─────────────┐
//!                   │     BoundedDispatcher     │
//!                   │  slot free?               │
//!                   └──────┬─────────────┬──────┘
//!                      yes │             │ no
//!                ┌─────────▼───┐   ┌─────▼──────────┐
//!                │ walker-<ino>│   │ recurse inline │
//!                │ scoped thread   │ same thread    │
//!                └─────────────┘   └────────────────┘
//!
//!   WalkContext: fs id, epoch, K, cancel flag, first-error slot
//! ```

pub mod context;
pub mod dispatch;
pub mod tree;
pub mod visitor;

pub use context::WalkContext;
pub use dispatch::{BoundedDispatcher, DispatchStats, Slot};
pub use tree::TreeWalker;
pub use visitor::{DeleteVisitor, SeenSet, SummarizeVisitor, Summary, SummaryTotals, Visitor};

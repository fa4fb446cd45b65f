//! Tree scanning: controlled recursive traversal with typed callbacks.
//!
//! The [`TreeScanner`] walks a tree in deterministic pre-order (entries
//! are sorted by name, then kind) and hands every observation to a
//! [`TreeVisitor`] as a [`ScanEvent`] -- a closed sum type the visitor
//! matches exhaustively. Missing or damaged objects are *reported*, not
//! thrown: one corrupt path never blocks inspection of its siblings,
//! which is what makes the scanner usable as a diagnosis tool.
//!
//! Traversal cost on pathological trees is bounded two ways: an optional
//! depth limit (deeper entries surface as [`ScanEvent::Skipped`]) and a
//! cooperative cancellation token checked between entries.

pub mod event;
pub mod scanner;

pub use event::{ScanControl, ScanEvent, TreeVisitor};
pub use scanner::{ScanOptions, TreeScanner};

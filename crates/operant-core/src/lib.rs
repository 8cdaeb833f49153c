//! Operant Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every part of the engine:
//! - Identifiers (ChamberId)
//! - Time primitives (Timestamp, TaskTime)
//! - Events and metadata
//! - Hardware capability traits (components and sources)
//! - The event logger contract

pub mod id;
pub mod time;
pub mod metadata;
pub mod event;
pub mod component;
pub mod source;
pub mod logger;
pub mod error;

pub use id::*;
pub use time::*;
pub use metadata::*;
pub use event::*;
pub use component::*;
pub use source::*;
pub use logger::*;
pub use error::*;

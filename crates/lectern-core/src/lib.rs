//! Domain model for Lectern: catalog, listening progress, presence and
//! markers, plus the [`store::LectureStore`] trait backends implement.
//!
//! Nothing here touches HTTP or SQL.

pub mod catalog;
pub mod error;
pub mod marker;
pub mod naming;
pub mod presence;
pub mod progress;
pub mod store;
pub mod user;

pub use error::{Error, ErrorKind, Result};

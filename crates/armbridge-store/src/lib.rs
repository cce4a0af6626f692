//! `armbridge-store` – the interchange store.
//!
//! Independently-run stages hand batches to each other through a single
//! SQLite file holding named tables.  Each stage owns the tables it writes and
//! replaces them wholesale on every run.
//!
//! # Modules
//!
//! - [`interchange`] – [`InterchangeStore`][interchange::InterchangeStore]:
//!   named-table storage with whole-table replace semantics, plus the
//!   [`Table`][interchange::Table] / [`Cell`][interchange::Cell] grid model.
//! - [`schema`] – codecs between tables and the typed rows of each logical
//!   table (calibration, pixel, physical, joint angles).

pub mod interchange;
pub mod schema;

pub use interchange::{Cell, InterchangeStore, StoreError, Table};

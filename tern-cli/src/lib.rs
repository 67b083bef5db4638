//! Tern CLI library
//!
//! Pieces of the `tern` binary that are worth testing on their own: loading the
//! pending changeset from `setup.sql`/`teardown.sql`, and turning a diff into
//! printable steps.

pub mod pending;
pub mod report;

pub use pending::PendingChangeset;
pub use report::{plan, Action, Step};

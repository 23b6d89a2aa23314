//! Table and color helpers for human-readable output.

pub mod colors;
pub mod table;

pub use colors::{colorize_delegation, colorize_outcome, colorize_read};
pub use table::{list_table, render_list};

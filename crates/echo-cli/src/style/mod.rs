//! Terminal styling: semantic colors, message helpers, and tables.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod banner;
pub mod colors;
pub mod output;
pub mod table;

pub use output::*;
pub use table::*;

static PLAIN: AtomicBool = AtomicBool::new(false);

/// Turns coloring off for the rest of the process (`--no-color` / `NO_COLOR`).
pub fn set_no_color(value: bool) {
    PLAIN.store(value, Ordering::Relaxed);
}

pub fn no_color() -> bool {
    PLAIN.load(Ordering::Relaxed)
}

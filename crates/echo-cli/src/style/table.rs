//! comfy-table helpers for trace, conflict, and config listings.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Table with a highlighted header row.
pub fn styled_table<S: AsRef<str>>(columns: &[&str], rows: &[Vec<S>]) -> Table {
    let mut table = base_table();

    let plain = super::no_color();
    table.set_header(columns.iter().map(|name| {
        let cell = Cell::new(name);
        if plain {
            cell
        } else {
            cell.add_attribute(Attribute::Bold).fg(Color::Cyan)
        }
    }));

    for row in rows {
        table.add_row(row.iter().map(|value| Cell::new(value.as_ref())));
    }
    table
}

/// Two-column key/value table with dimmed keys.
pub fn info_table(entries: &[(&str, String)]) -> Table {
    let mut table = base_table();
    let plain = super::no_color();

    for (key, value) in entries {
        let key_cell = if plain {
            Cell::new(key)
        } else {
            Cell::new(key).fg(Color::DarkGrey)
        };
        table.add_row(vec![key_cell, Cell::new(value)]);
    }
    table
}

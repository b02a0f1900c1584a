use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::model::PipelineStatus;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn status_cell(status: PipelineStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        PipelineStatus::Success => cell.fg(TableColor::Green),
        PipelineStatus::Failed => cell.fg(TableColor::Red),
        PipelineStatus::Canceled | PipelineStatus::Skipped => cell.fg(TableColor::Yellow),
        _ => cell,
    }
}

pub fn flag_cell(ok: bool) -> Cell {
    if ok {
        Cell::new("yes").fg(TableColor::Green)
    } else {
        Cell::new("no").fg(TableColor::Red)
    }
}

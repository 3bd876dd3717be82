use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use varflow_stream::StreamStatus;

use crate::commands::{DepsRow, ReplayReport, TriggerRow};

pub fn print_triggers(rows: &[TriggerRow]) {
    if rows.is_empty() {
        println!("No triggers.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Trigger"),
        header_cell("Slot"),
        header_cell("Local"),
        header_cell("Kind"),
        header_cell("Uid"),
    ]);
    apply_table_style(&mut table);
    for index in 0..3 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    for row in rows {
        table.add_row(vec![
            Cell::new(row.trigger_index),
            Cell::new(row.variable_index),
            dim_cell(row.local_index),
            Cell::new(&row.kind),
            Cell::new(&row.uid).add_attribute(Attribute::Bold),
        ]);
    }
    println!("{table}");
}

pub fn print_deps(rows: &[DepsRow]) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Slot"),
        header_cell("Kind"),
        header_cell("Uid"),
        header_cell("Observed"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    for row in rows {
        let observed = match &row.observed {
            serde_json::Value::Array(items) if items.is_empty() => dim_cell("(none)"),
            other => Cell::new(other.to_string()),
        };
        table.add_row(vec![
            Cell::new(row.index),
            Cell::new(&row.kind),
            Cell::new(&row.uid).add_attribute(Attribute::Bold),
            observed,
        ]);
    }
    println!("{table}");
}

pub fn print_replay(report: &ReplayReport) {
    println!("Events: {} ({} skipped)", report.events, report.skipped);
    if !report.reconnect_delays_ms.is_empty() {
        let delays: Vec<String> = report
            .reconnect_delays_ms
            .iter()
            .map(|ms| format!("{ms}ms"))
            .collect();
        println!("Reconnect backoff: {}", delays.join(", "));
    }
    let mut table = Table::new();
    table.set_header(vec![header_cell("Status"), header_cell("Error"), header_cell("Value")]);
    apply_table_style(&mut table);
    table.add_row(vec![
        status_cell(report.status),
        report
            .error
            .as_deref()
            .map_or_else(|| dim_cell("-"), |e| Cell::new(e).fg(Color::Red)),
        report
            .value
            .as_ref()
            .map_or_else(|| dim_cell("(pending)"), |v| Cell::new(v.to_string())),
    ]);
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn status_cell(status: Option<StreamStatus>) -> Cell {
    match status {
        Some(StreamStatus::Connected) => Cell::new("connected").fg(Color::Green),
        Some(StreamStatus::Reconnecting) => Cell::new("reconnecting").fg(Color::Yellow),
        Some(StreamStatus::Error) => Cell::new("error")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        None => dim_cell("pending"),
    }
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

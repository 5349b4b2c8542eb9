//! Text rendering for the terminal

use colored::*;

use crate::codec::{self, Status};
use crate::domain::Member;
use crate::planner::WeekView;
use crate::session::SyncInfo;
use crate::sync::SyncState;
use crate::week::DayColumn;

const CELL_WIDTH: usize = 10;
const MIN_NAME_WIDTH: usize = 6;

/// Column header like `1/7(Sun)`
pub fn column_header(column: &DayColumn) -> String {
    format!("{}({})", column.date.format("%-m/%-d"), column.label)
}

fn paint_header(column: &DayColumn) -> ColoredString {
    let text = format!("{:^width$}", column_header(column), width = CELL_WIDTH);
    let text = if column.is_weekend { text.red() } else { text.normal() };
    if column.is_today { text.bold().underline() } else { text }
}

fn paint_cell(status: Option<Status>) -> ColoredString {
    let symbol = status.map(|s| s.symbol()).unwrap_or("-");
    let text = format!("{:^width$}", symbol, width = CELL_WIDTH);
    match status {
        Some(Status::Eating) => text.green(),
        Some(Status::NotEating) => text.red(),
        Some(Status::Undecided) => text.yellow(),
        None => text.dimmed(),
    }
}

fn pad_name(name: &str, width: usize) -> String {
    let len = name.chars().count();
    format!("{}{}", name, " ".repeat(width.saturating_sub(len)))
}

/// Seven-column grid, one row per member
pub fn render_week(view: &WeekView) -> String {
    let name_width = view
        .rows
        .iter()
        .map(|row| row.member.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(MIN_NAME_WIDTH);

    let mut out = String::new();
    out.push_str(&format!("Week of {}\n", codec::format_date(view.week_start).bold()));

    out.push_str(&" ".repeat(name_width));
    for column in &view.columns {
        out.push_str(&paint_header(column).to_string());
    }
    out.push('\n');

    if view.rows.is_empty() {
        out.push_str(&format!("{}\n", "No members yet. Add one with `tp member add <NAME>`".dimmed()));
        return out;
    }

    for row in &view.rows {
        out.push_str(&pad_name(&row.member.name, name_width).cyan().to_string());
        for cell in &row.cells {
            out.push_str(&paint_cell(*cell).to_string());
        }
        out.push('\n');
    }
    out
}

/// Member list with ids
pub fn render_members(members: &[Member]) -> String {
    if members.is_empty() {
        return "No members yet\n".to_string();
    }
    members
        .iter()
        .enumerate()
        .map(|(i, member)| format!("{:>2}. {}  {}\n", i + 1, member.name.cyan(), member.id.dimmed()))
        .collect()
}

/// Passphrase, channel and link state
pub fn render_sync_info(info: &SyncInfo) -> String {
    let state = match info.state {
        SyncState::Disconnected => info.state.to_string().dimmed(),
        SyncState::Subscribed => info.state.to_string().yellow(),
        SyncState::Synced => info.state.to_string().green(),
    };
    let mut out = format!("Backend:    {}\nState:      {}\n", info.backend, state);
    match (&info.secret, &info.channel) {
        (Some(secret), Some(channel)) => {
            out.push_str(&format!("Passphrase: {}\nChannel:    {}\n", secret, channel.as_str().cyan()));
        }
        _ => out.push_str("Passphrase: not set (use `tp sync set <PASSPHRASE>`)\n"),
    }
    out
}

//! Terminal output for the CLI
//!
//! Status lines are colored with crossterm; generated test files are listed
//! as a table.

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use utb_core::types::{Progress, TestSource};

fn print_prefixed(out: &mut impl Write, color: Color, symbol: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(symbol),
        Print(" "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Green check on stdout
pub fn print_success(msg: &str) {
    print_prefixed(&mut std::io::stdout(), Color::Green, "✓", msg);
}

/// Red cross on stderr
pub fn print_error(msg: &str) {
    print_prefixed(&mut std::io::stderr(), Color::Red, "✗", msg);
}

/// Yellow warning sign on stderr
pub fn print_warning(msg: &str) {
    print_prefixed(&mut std::io::stderr(), Color::Yellow, "⚠", msg);
}

/// Cyan info sign on stdout
pub fn print_info(msg: &str) {
    print_prefixed(&mut std::io::stdout(), Color::Cyan, "ℹ", msg);
}

/// One progress line, e.g. `[ 42%] Building project`
pub fn format_progress(progress: &Progress) -> String {
    let percent = progress.percent.clamp(0.0, 100.0).round() as u32;
    format!("[{:>3}%] {}", percent, progress.message)
}

/// Table of generated test files
pub fn format_test_sources(sources: &[TestSource]) -> String {
    if sources.is_empty() {
        return "No test files generated".to_string();
    }

    #[derive(Tabled)]
    struct SourceRow {
        #[tabled(rename = "FILE")]
        file: String,
        #[tabled(rename = "TESTS")]
        tests: u32,
    }

    let rows: Vec<SourceRow> = sources
        .iter()
        .map(|s| SourceRow {
            file: s.file_path.display().to_string(),
            tests: s.tests_count,
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .modify(Columns::last(), Alignment::right())
        .to_string()
}

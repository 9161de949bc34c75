// Terminal summary of a run: one table row per tool, failures in red, followed by a
// detail block for every failure with the full error text.
use colored::Colorize;
use prettytable::format::consts::FORMAT_BOX_CHARS;
use prettytable::{Attr, Cell, Row, Table, color};
use crate::schemas::results::{Status, ToolResult};

/// Builds the summary table for `results`.
///
/// # Arguments
/// * `results`: Per-tool results in input order.
///
/// # Returns
/// * `Table`: columns Tool, Status, Version, Details.
pub fn results_table(results: &[ToolResult]) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_BOX_CHARS);
    table.set_titles(Row::new(vec![
        Cell::new("Tool").with_style(Attr::Bold),
        Cell::new("Status").with_style(Attr::Bold),
        Cell::new("Version").with_style(Attr::Bold),
        Cell::new("Details").with_style(Attr::Bold),
    ]));

    for result in results {
        let details = match (&result.status, &result.path) {
            (Status::Success, Some(path)) => path.display().to_string(),
            _ => result.message.clone(),
        };
        let status = Cell::new(&result.status.to_string());
        let status = match result.status {
            Status::Success => status.with_style(Attr::ForegroundColor(color::GREEN)),
            Status::Skipped => status.with_style(Attr::ForegroundColor(color::YELLOW)),
            Status::Failed => status.with_style(Attr::ForegroundColor(color::RED)),
        };
        let mut row = Row::new(vec![
            Cell::new(&result.tool),
            status,
            Cell::new(if result.version.is_empty() { "-" } else { &result.version }),
            Cell::new(&details),
        ]);
        if result.status == Status::Failed {
            row = Row::new(
                row.iter()
                    .map(|cell| cell.clone().with_style(Attr::ForegroundColor(color::RED)))
                    .collect(),
            );
        }
        table.add_row(row);
    }
    table
}

/// Detail blocks for every failed tool, ready to print.
pub fn failure_details(results: &[ToolResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(|result| {
            let error = result.error.as_ref()?;
            Some(format!(
                "{} {} ({})\n  {}",
                "✗".red(),
                result.tool.bold(),
                error.kind().to_string().red(),
                error
            ))
        })
        .collect()
}

/// Prints the table and the failure details to stdout.
pub fn print(results: &[ToolResult]) {
    if results.is_empty() {
        return;
    }
    results_table(results).printstd();
    let details = failure_details(results);
    if !details.is_empty() {
        println!();
        for detail in details {
            println!("{detail}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::errors::Error;

    #[test]
    fn one_row_per_result_and_details_for_failures() {
        let results = vec![
            ToolResult::skipped("jq", "1.7", "already exists"),
            ToolResult::failed("gh", "", Error::UnknownSource("svn".into())),
        ];
        let table = results_table(&results);
        assert_eq!(table.len(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("already exists"));
        assert!(rendered.contains("usage error"));

        let details = failure_details(&results);
        assert_eq!(details.len(), 1);
        assert!(details[0].contains("unknown source type 'svn'"));
    }
}

use std::collections::BTreeMap;

use scraper::ElementRef;
use unit4_agent_table::{Table, dedupe_column_names};

use crate::extract::element_text;

const MAX_SPAN: usize = 1000;

struct RawCell {
    text: String,
    is_header: bool,
    rowspan: usize,
    colspan: usize,
}

struct RawRow {
    cells: Vec<RawCell>,
    in_thead: bool,
}

/// Parses an HTML `table` element, expanding row and column spans.
///
/// Returns `None` if the table has no rows.
pub(crate) fn parse_table(table: ElementRef<'_>) -> Option<Table> {
    let mut rows = vec![];
    collect_rows(table, false, &mut rows);
    if rows.iter().all(|row| row.cells.is_empty()) {
        return None;
    }

    let header_rows = count_header_rows(&rows);
    let grid = expand_spans(&rows);
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let (header, body) = grid.split_at(header_rows);
    let columns = if header.is_empty() {
        (0..width).map(|i| i.to_string()).collect()
    } else {
        join_headers(header, width)
    };
    Some(Table::new(columns, body.to_vec()))
}

fn collect_rows(
    parent: ElementRef<'_>,
    in_thead: bool,
    rows: &mut Vec<RawRow>,
) {
    for child in parent.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "thead" => collect_rows(child, true, rows),
            "tbody" | "tfoot" => collect_rows(child, in_thead, rows),
            "tr" => rows.push(RawRow {
                cells: collect_cells(child),
                in_thead,
            }),
            // Captions, column groups and nested tables.
            _ => {}
        }
    }
}

fn collect_cells(row: ElementRef<'_>) -> Vec<RawCell> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "th" | "td"))
        .map(|cell| RawCell {
            text: collapse_whitespace(&element_text(cell)),
            is_header: cell.value().name() == "th",
            rowspan: span(cell, "rowspan"),
            colspan: span(cell, "colspan"),
        })
        .collect()
}

fn span(cell: ElementRef<'_>, attr: &str) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|span| *span > 0)
        .unwrap_or(1)
        .min(MAX_SPAN)
}

/// `thead` rows if there are any, else the leading rows made only of `th`.
fn count_header_rows(rows: &[RawRow]) -> usize {
    let thead = rows.iter().take_while(|row| row.in_thead).count();
    if thead > 0 {
        return thead;
    }
    rows.iter()
        .take_while(|row| {
            !row.cells.is_empty() && row.cells.iter().all(|cell| cell.is_header)
        })
        .count()
}

fn expand_spans(rows: &[RawRow]) -> Vec<Vec<String>> {
    // Column -> (rows still covered, text).
    let mut pending: BTreeMap<usize, (usize, String)> = BTreeMap::new();
    let mut grid = Vec::with_capacity(rows.len());

    for row in rows {
        let mut out: Vec<String> = vec![];
        let mut cells = row.cells.iter();
        loop {
            if let Some(text) = take_pending(&mut pending, out.len()) {
                out.push(text);
                continue;
            }
            let Some(cell) = cells.next() else {
                break;
            };
            for _ in 0..cell.colspan {
                if cell.rowspan > 1 {
                    pending.insert(
                        out.len(),
                        (cell.rowspan - 1, cell.text.clone()),
                    );
                }
                out.push(cell.text.clone());
            }
        }

        // Cells spanning down from above, past the end of this row.
        if let Some(&last) = pending.keys().next_back() {
            while out.len() <= last {
                let text = take_pending(&mut pending, out.len());
                out.push(text.unwrap_or_default());
            }
        }
        grid.push(out);
    }
    grid
}

fn take_pending(
    pending: &mut BTreeMap<usize, (usize, String)>,
    col: usize,
) -> Option<String> {
    let (rows_left, text) = pending.get_mut(&col)?;
    *rows_left -= 1;
    let text = text.clone();
    if *rows_left == 0 {
        pending.remove(&col);
    }
    Some(text)
}

fn join_headers(header: &[Vec<String>], width: usize) -> Vec<String> {
    let names = (0..width)
        .map(|col| {
            let mut labels: Vec<&str> = vec![];
            for label in header.iter().filter_map(|row| row.get(col)) {
                if !label.is_empty() && labels.last() != Some(&label.as_str()) {
                    labels.push(label);
                }
            }
            if labels.is_empty() {
                col.to_string()
            } else {
                labels.join(" ")
            }
        })
        .collect();
    dedupe_column_names(names)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

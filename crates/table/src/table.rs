use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

const MIN_COLUMN_WIDTH: usize = 3;

/// A table of text cells with named columns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows, each exactly as long as `columns`.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a table, padding short rows with empty cells.
    ///
    /// A row longer than the header adds columns named by their position.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut columns = columns;
        let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
        while columns.len() < widest {
            columns.push(columns.len().to_string());
        }

        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(columns.len(), String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Number of rows, not counting the header.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Renders the table as a markdown pipe table.
    ///
    /// The first column is an unnamed row index. Numeric columns are
    /// aligned to the right, the others to the left.
    pub fn to_markdown(&self) -> String {
        let index = (0..self.rows.len()).map(|i| i.to_string()).collect();
        let mut columns = vec![Column::new(String::new(), index, Align::Right)];
        for (i, name) in self.columns.iter().enumerate() {
            let cells: Vec<String> = self
                .rows
                .iter()
                .map(|row| escape_cell(row.get(i).map_or("", String::as_str)))
                .collect();
            let numeric = cells.iter().any(|cell| !cell.is_empty())
                && cells.iter().all(|cell| cell.is_empty() || is_number(cell));
            let align = if numeric { Align::Right } else { Align::Left };
            columns.push(Column::new(escape_cell(name), cells, align));
        }

        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(render_row(columns.iter().map(|col| col.pad(&col.header))));
        lines.push(format!(
            "|{}|",
            columns
                .iter()
                .map(Column::separator)
                .collect::<Vec<_>>()
                .join("|")
        ));
        for i in 0..self.rows.len() {
            lines.push(render_row(
                columns.iter().map(|col| col.pad(&col.cells[i])),
            ));
        }
        lines.join("\n")
    }
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
}

struct Column {
    header: String,
    cells: Vec<String>,
    align: Align,
    width: usize,
}

impl Column {
    fn new(header: String, cells: Vec<String>, align: Align) -> Self {
        let width = cells
            .iter()
            .chain([&header])
            .map(|cell| cell.chars().count())
            .max()
            .unwrap_or(0)
            .max(MIN_COLUMN_WIDTH);
        Self {
            header,
            cells,
            align,
            width,
        }
    }

    fn pad(&self, text: &str) -> String {
        let width = self.width;
        match self.align {
            Align::Left => format!("{text:<width$}"),
            Align::Right => format!("{text:>width$}"),
        }
    }

    fn separator(&self) -> String {
        // Spans the padding on both sides of the cell.
        let dashes = "-".repeat(self.width + 1);
        match self.align {
            Align::Left => format!(":{dashes}"),
            Align::Right => format!("{dashes}:"),
        }
    }
}

fn render_row<I: Iterator<Item = String>>(cells: I) -> String {
    let mut line = String::from("|");
    for cell in cells {
        line.push(' ');
        line.push_str(&cell);
        line.push_str(" |");
    }
    line
}

/// Makes column names unique by suffixing repeats with `.1`, `.2`, ...
///
/// `["Name", "Name", "Name"]` becomes `["Name", "Name.1", "Name.2"]`. A
/// suffix never collides with a name that is already taken.
pub fn dedupe_column_names(names: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut repeats: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let mut unique = name.clone();
            while taken.contains(&unique) {
                let count = repeats.entry(name.clone()).or_insert(0);
                *count += 1;
                unique = format!("{name}.{count}");
            }
            taken.insert(unique.clone());
            unique
        })
        .collect()
}

fn escape_cell(text: &str) -> String {
    text.replace(['\r', '\n'], " ").replace('|', "\\|")
}

fn is_number(text: &str) -> bool {
    text.parse::<f64>().is_ok_and(f64::is_finite)
}

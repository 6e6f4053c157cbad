use std::borrow::Cow;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub title: String,
    pub align: Align,
}

impl Column {
    pub fn left(title: &str) -> Self {
        Self {
            title: title.to_string(),
            align: Align::Left,
        }
    }

    pub fn right(title: &str) -> Self {
        Self {
            title: title.to_string(),
            align: Align::Right,
        }
    }
}

/// Renders rows as aligned plain-text columns. Cells beyond the column count
/// are ignored; missing cells render empty.
pub fn render_table(columns: &[Column], rows: &[Vec<String>]) -> String {
    let mut widths = columns
        .iter()
        .map(|c| display_width(&c.title).max(3))
        .collect::<Vec<_>>();

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(columns.len()) {
            widths[idx] = widths[idx].max(display_width(&sanitize_cell(cell)));
        }
    }

    let mut output = String::new();
    let titles = columns.iter().map(|c| c.title.clone()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(columns, &titles, &widths));

    let separators = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(columns, &separators, &widths));

    for row in rows {
        let _ = writeln!(output, "{}", format_row(columns, row, &widths));
    }

    output
}

fn format_row(columns: &[Column], values: &[String], widths: &[usize]) -> String {
    let cells = columns
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (column, width))| {
            let value = values.get(idx).map(String::as_str).unwrap_or("");
            let sanitized = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&sanitized)));
            match column.align {
                Align::Left => format!("{sanitized}{padding}"),
                Align::Right => format!("{padding}{sanitized}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

/// Visible width; ANSI color sequences such as `\x1b[31m` take no space.
fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

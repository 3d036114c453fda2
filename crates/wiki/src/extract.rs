use scraper::{CaseSensitivity, ElementRef, Html, Node};
use unit4_agent_table::Table;

use crate::table::parse_table;

/// Text and tables extracted from a rendered Wikipedia page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WikiPage {
    /// Headings and paragraphs of the page, with `{{table_N}}` placeholders
    /// where the tables were.
    pub content: String,
    /// Parsed tables keyed `table_1`, `table_2`, ... in placeholder order.
    pub tables: Vec<(String, Table)>,
}

/// Extracts the content and tables from the HTML of a rendered page.
///
/// Infoboxes are numbered first, then the remaining `wikitable`s, both in
/// document order. A table without rows still takes a number, but has
/// neither an entry nor a placeholder.
pub fn extract_page(html: &str) -> WikiPage {
    let document = Html::parse_fragment(html);
    let root = document.root_element();

    let mut infoboxes = vec![];
    let mut wikitables = vec![];
    for element in root.descendants().filter_map(ElementRef::wrap) {
        if element.value().name() != "table" {
            continue;
        }
        let mut classes = element.value().classes();
        if classes.any(|class| class.contains("infobox")) {
            infoboxes.push(element);
        } else if element
            .value()
            .has_class("wikitable", CaseSensitivity::CaseSensitive)
        {
            wikitables.push(element);
        }
    }

    let mut tables = vec![];
    let mut placeholders = vec![];
    for (i, element) in infoboxes.into_iter().chain(wikitables).enumerate() {
        let key = format!("table_{}", i + 1);
        match parse_table(element) {
            Some(table) => {
                trace!(
                    "parsed {key}: {} columns, {} rows",
                    table.num_columns(),
                    table.num_rows()
                );
                placeholders.push((element, key.clone()));
                tables.push((key, table));
            }
            None => debug!("skipping {key}, it has no rows"),
        }
    }

    let mut parts = vec![];
    collect_parts(root, &placeholders, &mut parts);
    WikiPage {
        content: parts.join("\n\n"),
        tables,
    }
}

fn collect_parts(
    parent: ElementRef<'_>,
    placeholders: &[(ElementRef<'_>, String)],
    parts: &mut Vec<String>,
) {
    for child in parent.children().filter_map(ElementRef::wrap) {
        if is_dropped(child) {
            continue;
        }
        if let Some((_, key)) =
            placeholders.iter().find(|(table, _)| *table == child)
        {
            parts.push(format!("{{{{{key}}}}}"));
            continue;
        }

        let name = child.value().name();
        if let Some(level) = heading_level(name) {
            let text = element_text(child);
            let text = text.trim();
            if !text.is_empty() {
                parts.push(format!("\n{} {text}", "#".repeat(level)));
            }
        } else if name == "p" {
            let text = element_text(child);
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.to_owned());
            }
        } else {
            collect_parts(child, placeholders, parts);
        }
    }
}

fn heading_level(name: &str) -> Option<usize> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Reference marks, hatnotes, navigation boxes and edit links.
fn is_dropped(element: ElementRef<'_>) -> bool {
    let value = element.value();
    let has_class =
        |class: &str| value.has_class(class, CaseSensitivity::CaseSensitive);
    match value.name() {
        "sup" | "style" | "script" => true,
        "div" => has_class("hatnote") || has_class("navbox"),
        "span" => has_class("mw-editsection"),
        _ => false,
    }
}

/// Text of an element without the dropped parts. `br` becomes a space.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    push_text(element, &mut text);
    text
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_dropped(child) {
                    continue;
                }
                if child.value().name() == "br" {
                    out.push(' ');
                } else {
                    push_text(child, out);
                }
            }
            _ => {}
        }
    }
}

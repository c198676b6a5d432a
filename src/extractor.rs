use log::debug;
use scraper::{ElementRef, Html, Selector};

use crate::table::{Header, Row};

/// What one page's results table yielded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageTable {
    /// Empty when the table had neither a `<thead>` row nor any row at all.
    pub header: Header,
    pub rows: Vec<Row>,
}

pub struct Extractor {
    table_selector: Selector,
}

/// Attribute selector for the marker id. Unlike `#id` it also accepts ids
/// that are not CSS identifiers, such as ones starting with a digit.
pub fn marker_selector(marker_id: &str) -> Result<String, String> {
    if marker_id.is_empty() || marker_id.contains(['"', '\\']) {
        return Err(format!("unusable marker id {marker_id:?}"));
    }
    Ok(format!("[id=\"{marker_id}\"]"))
}

impl Extractor {
    pub fn new(marker_id: &str) -> Result<Self, String> {
        let table_selector = Selector::parse(&format!("table{}", marker_selector(marker_id)?))
            .map_err(|e| format!("bad marker selector for {marker_id:?}: {e:?}"))?;
        Ok(Extractor { table_selector })
    }

    /// `None` when the page carries no marker table.
    pub fn extract(&self, html: &str) -> Option<PageTable> {
        let document = Html::parse_document(html);
        let table = document.select(&self.table_selector).next()?;

        let head_rows: Vec<ElementRef> = children_named(table, "thead")
            .into_iter()
            .flat_map(|thead| children_named(thead, "tr"))
            .collect();
        let mut body_rows = body_rows(table);

        let header_cells = match head_rows.first() {
            Some(tr) => row_cells(*tr),
            // No distinct head section: the first row is the header.
            None if !body_rows.is_empty() => row_cells(body_rows.remove(0)),
            None => Vec::new(),
        };

        let rows: Vec<Row> = body_rows
            .into_iter()
            .map(|tr| Row::new(row_cells(tr)))
            .filter(|row| !row.is_empty())
            .collect();
        debug!(
            "Extracted header of {} cells and {} data rows",
            header_cells.len(),
            rows.len()
        );

        Some(PageTable {
            header: Header::new(header_cells),
            rows,
        })
    }
}

fn children_named<'a>(element: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == name)
        .collect()
}

/// Rows of every `<tbody>`, plus any `<tr>` sitting directly in the table,
/// in document order. Nested tables are not descended into.
fn body_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tbody" => rows.extend(children_named(child, "tr")),
            "tr" => rows.push(child),
            _ => {}
        }
    }
    rows
}

fn row_cells(tr: ElementRef<'_>) -> Vec<String> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .map(cell_text)
        .collect()
}

/// Trimmed text nodes of the cell, concatenated.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

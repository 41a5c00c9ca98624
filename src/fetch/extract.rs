// src/fetch/extract.rs

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

/// The listing table inside the rendered page.
pub const TABLE_SELECTOR: &str = "div.table-container table";

/// `data-testid-header` values of columns that never make it into the table.
pub const EXCLUDED_HEADERS: &[&str] = &["sparkline", "fiftyTwoWeekRange"];

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(TABLE_SELECTOR).expect("table selector should parse"));
static HEADER_CELLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("thead th").expect("header selector should parse"));
static BODY_ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr").expect("row selector should parse"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("cell selector should parse"));
static FIRST_CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody tr td").expect("first cell selector should parse"));

/// Column names kept from the header row plus the positions that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderLayout {
    pub columns: Vec<String>,
    pub excluded: Vec<usize>,
}

/// Visible text of an element, whitespace collapsed.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn listing_table(doc: &Html) -> Result<ElementRef<'_>> {
    doc.select(&TABLE)
        .next()
        .with_context(|| format!("no element matches {TABLE_SELECTOR:?}"))
}

/// Whether the snapshot contains the listing table yet.
pub fn has_table(html: &str) -> bool {
    Html::parse_document(html).select(&TABLE).next().is_some()
}

/// Read the header cells, skipping denylisted columns.
pub fn read_headers(html: &str) -> Result<HeaderLayout> {
    let doc = Html::parse_document(html);
    let table = listing_table(&doc)?;

    let mut layout = HeaderLayout::default();
    for (idx, th) in table.select(&HEADER_CELLS).enumerate() {
        let test_id = th.value().attr("data-testid-header").map(str::trim);
        if test_id.is_some_and(|id| EXCLUDED_HEADERS.contains(&id)) {
            layout.excluded.push(idx);
            continue;
        }
        layout.columns.push(text_of(th));
    }
    Ok(layout)
}

/// Read body rows, dropping cells at the excluded positions. Rows without
/// any `td` are skipped.
pub fn read_rows(html: &str, layout: &HeaderLayout) -> Result<Vec<Vec<String>>> {
    let doc = Html::parse_document(html);
    let table = listing_table(&doc)?;

    Ok(table
        .select(&BODY_ROWS)
        .filter_map(|tr| {
            let cells: Vec<String> = tr
                .select(&CELLS)
                .enumerate()
                .filter(|(idx, _)| !layout.excluded.contains(idx))
                .map(|(_, td)| text_of(td))
                .collect();
            let had_cells = tr.select(&CELLS).next().is_some();
            had_cells.then_some(cells)
        })
        .collect())
}

/// Text of the first body cell; used to tell one page from the next.
pub fn first_cell_text(html: &str) -> Option<String> {
    Html::parse_document(html)
        .select(&FIRST_CELL)
        .next()
        .map(text_of)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="table-container">
            <table>
              <thead><tr>
                <th data-testid-header="ticker">Symbol</th>
                <th data-testid-header="companyshortname">Name</th>
                <th data-testid-header="sparkline"></th>
                <th data-testid-header=" intradayprice ">Price <span>(Intraday)</span></th>
                <th data-testid-header="fiftyTwoWeekRange">52 Wk Range</th>
              </tr></thead>
              <tbody>
                <tr><td>NVDA</td><td>NVIDIA   Corporation</td><td><svg></svg></td><td> 1,250.50 </td><td>100 - 200</td></tr>
                <tr><th>section break</th></tr>
                <tr><td>AAPL</td><td>Apple Inc.</td><td></td><td>190.10</td><td>150 - 210</td></tr>
              </tbody>
            </table>
          </div>
        </body></html>
    "#;

    #[test]
    fn headers_skip_denylisted_columns() {
        let layout = read_headers(PAGE).unwrap();
        assert_eq!(layout.columns, vec!["Symbol", "Name", "Price (Intraday)"]);
        assert_eq!(layout.excluded, vec![2, 4]);
    }

    #[test]
    fn rows_drop_the_same_positions() {
        let layout = read_headers(PAGE).unwrap();
        let rows = read_rows(PAGE, &layout).unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["NVDA", "NVIDIA Corporation", "1,250.50"],
                vec!["AAPL", "Apple Inc.", "190.10"],
            ]
        );
    }

    #[test]
    fn first_cell_identifies_the_page() {
        assert_eq!(first_cell_text(PAGE).as_deref(), Some("NVDA"));
        assert_eq!(first_cell_text("<p>loading</p>"), None);
    }

    #[test]
    fn missing_table_is_an_error() {
        assert!(!has_table("<div class=\"table-container\"></div>"));
        assert!(read_headers("<div class=\"table-container\"></div>").is_err());
        assert!(has_table(PAGE));
    }
}

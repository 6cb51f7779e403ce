use crate::selection::SelectionEntry;
use chrono::NaiveDate;

pub const CSV_HEADER: [&str; 3] = ["Word", "Definition (native)", "Definition (foreign)"];
/// Lets spreadsheet tools pick UTF-8 so umlauts and ß display correctly.
pub const UTF8_BOM: &str = "\u{feff}";
pub const EMPTY_SET_MESSAGE: &str = "Dein Vokabel-Set ist leer!";

/// Quotes a field only when it contains a comma, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut row = fields.into_iter().map(csv_field).collect::<Vec<_>>().join(",");
    row.push('\n');
    row
}

/// Header plus one row per entry, in selection order. `None` for an empty set.
pub fn selection_to_csv(entries: &[SelectionEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let mut csv = csv_row(CSV_HEADER);
    for entry in entries {
        csv.push_str(&csv_row([
            entry.word.as_str(),
            entry.definition_native.as_str(),
            entry.definition_foreign.as_str(),
        ]));
    }
    Some(csv)
}

/// Download body: BOM followed by the table.
pub fn csv_bytes_with_bom(entries: &[SelectionEntry]) -> Option<Vec<u8>> {
    selection_to_csv(entries).map(|csv| format!("{UTF8_BOM}{csv}").into_bytes())
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("vocab_set_{}.csv", date.format("%Y-%m-%d"))
}

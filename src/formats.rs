//! Parsing the downloader's `--list-formats` table output.

use serde::Serialize;

/// One selectable stream option from a format-listing query. Value type,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDescriptor {
    pub id: String,
    pub description: String,
    pub extension: String,
    pub resolution: String,
    pub note: String,
}

/// Phrase marking the header row of the format table.
const HEADER_MARKER: &str = "format code";

/// Parse the tabular `--list-formats` output. Rows before the header (and
/// rows with fewer than four whitespace-delimited fields) are skipped.
pub fn parse_format_table(output: &str) -> Vec<FormatDescriptor> {
    let lines: Vec<&str> = output.lines().collect();
    let Some(header_idx) = lines.iter().position(|line| line.contains(HEADER_MARKER)) else {
        return Vec::new();
    };

    lines[header_idx + 1..]
        .iter()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let id = fields[0].to_string();
            let extension = fields[1].to_string();
            let resolution = fields[2].to_string();
            let note = fields[3..].join(" ");
            let description = format!("{id} \u{2022} {resolution} \u{2022} {note}");
            Some(FormatDescriptor { id, description, extension, resolution, note })
        })
        .collect()
}

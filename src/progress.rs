//! Progress parsing for the downloader's line-oriented output.

use std::path::PathBuf;

/// Structured event derived from one output line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// Download progress, normalized to [0, 1], with an optional ETA.
    Progress { fraction: f64, eta_seconds: Option<u64> },
    /// The downloader announced the file it is writing.
    Destination(PathBuf),
}

const DESTINATION_MARKER: &str = "Destination:";

/// Map one output line to an event, or `None` for the (frequent) lines
/// that carry neither progress nor a destination.
///
/// Progress lines contain a whitespace token like "42.5%"; an "ETA" token
/// followed by a colon-separated time ("00:03", "01:02:03") adds the ETA.
pub fn parse_line(line: &str) -> Option<LineEvent> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    if let Some(fraction) = tokens.iter().find_map(|token| parse_percent_token(token)) {
        let eta_seconds = tokens
            .iter()
            .position(|token| *token == "ETA")
            .and_then(|idx| tokens.get(idx + 1))
            .and_then(|token| parse_eta_seconds(token));
        return Some(LineEvent::Progress { fraction, eta_seconds });
    }

    if let Some(idx) = line.find(DESTINATION_MARKER) {
        let path = line[idx + DESTINATION_MARKER.len()..].trim();
        if !path.is_empty() {
            return Some(LineEvent::Destination(PathBuf::from(path)));
        }
    }

    None
}

/// Accept tokens of the shape `<digits>.<digits>%` and normalize to [0, 1].
fn parse_percent_token(token: &str) -> Option<f64> {
    let number = token.strip_suffix('%')?;
    let (whole, frac) = number.split_once('.')?;
    if whole.is_empty() || frac.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse::<f64>().ok().map(|percent| (percent / 100.0).clamp(0.0, 1.0))
}

/// Parse 1-3 colon-separated components, most significant first:
/// "45" = 45s, "02:03" = 2m3s, "01:02:03" = 1h2m3s.
fn parse_eta_seconds(token: &str) -> Option<u64> {
    let components: Vec<&str> = token.split(':').collect();
    if components.is_empty() || components.len() > 3 {
        return None;
    }
    let mut total: u64 = 0;
    for component in &components {
        let value = component.parse::<u64>().ok()?;
        total = total * 60 + value;
    }
    Some(total)
}

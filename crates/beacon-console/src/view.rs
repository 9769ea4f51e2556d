//! Terminal rendering of aggregated match records.

use beacon_core::{MatchRecord, Source};

pub fn print_match_table(records: &[MatchRecord]) {
    print!("{}", render_table(records));
}

fn render_table(records: &[MatchRecord]) -> String {
    if records.is_empty() {
        return "No matches.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<20} {:>6} {:>5}  {:<16} {:<19}  {:<19}\n",
        "NAME", "CONF", "SEEN", "SOURCES", "FIRST SEEN", "LAST SEEN"
    ));
    for record in records {
        out.push_str(&format!(
            "{:<20} {:>6.1} {:>5}  {:<16} {:<19}  {:<19}\n",
            record.name,
            record.confidence,
            record.count,
            format_sources(&record.sources),
            record.first_seen.format("%Y-%m-%d %H:%M:%S").to_string(),
            record.last_seen.format("%Y-%m-%d %H:%M:%S").to_string(),
        ));
    }
    out
}

fn format_sources(sources: &[Source]) -> String {
    if sources.is_empty() {
        return "-".to_string();
    }
    sources
        .iter()
        .map(Source::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

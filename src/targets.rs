//! Target list loading: link pairs from a CSV file, page URLs from a plain
//! text file. These are the external inputs; they are read once at startup
//! and never re-read while the watcher runs.

use std::fs;
use std::io;
use std::path::Path;

use crate::signals::Target;

/// Read `(source, target)` pairs from a two-column CSV. A leading
/// `source,target` header row is skipped; otherwise rows are positional.
pub fn read_links_csv<P: AsRef<Path>>(path: P) -> io::Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = split_csv_line(line).into_iter();
        let source = fields.next().unwrap_or_default();
        let target = fields.next().unwrap_or_default();

        if source.eq_ignore_ascii_case("source") && target.eq_ignore_ascii_case("target") {
            continue;
        }
        if source.is_empty() && target.is_empty() {
            continue;
        }
        pairs.push((source, target));
    }

    Ok(pairs)
}

/// Read page URLs, one per line. A header-ish leading `url` line is skipped.
pub fn read_pages_file<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.to_ascii_lowercase().starts_with("url"))
        .map(str::to_string)
        .collect())
}

/// Validate raw inputs into the scheduling target list. Invalid entries are
/// logged once and dropped; they never reach the scheduler.
pub fn build_targets(
    links: Vec<(String, String)>,
    pages: Vec<String>,
    strict: bool,
) -> Vec<Target> {
    let mut targets = Vec::new();

    for (source, target) in links {
        if valid_url(&source, strict) && valid_url(&target, strict) {
            targets.push(Target::Link { source, target });
        } else {
            tracing::warn!(source = %source, target = %target, "rejected link pair");
        }
    }

    for url in pages {
        if valid_url(&url, strict) {
            targets.push(Target::Page { url });
        } else {
            tracing::warn!(url = %url, "rejected page URL");
        }
    }

    targets
}

fn valid_url(s: &str, strict: bool) -> bool {
    !s.is_empty() && (!strict || s.starts_with("http"))
}

/// Split one CSV line on commas that sit outside double quotes. URLs are
/// allowed to contain commas when the field is quoted; a doubled quote
/// inside a quoted field is an escaped literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn links_csv_skips_header_and_blank_lines() {
        let file = write_temp("source,target\nhttps://a/,https://b/\n\nhttps://c/,https://d/\n");
        let pairs = read_links_csv(file.path()).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("https://a/".to_string(), "https://b/".to_string()),
                ("https://c/".to_string(), "https://d/".to_string()),
            ]
        );
    }

    #[test]
    fn links_csv_without_header_reads_positionally() {
        let file = write_temp("\"https://a/\",\"https://b/\"\n");
        let pairs = read_links_csv(file.path()).unwrap();
        assert_eq!(pairs, vec![("https://a/".to_string(), "https://b/".to_string())]);
    }

    #[test]
    fn links_csv_keeps_commas_inside_quoted_fields() {
        let file = write_temp(
            "source,target\n\"https://a.example/page?ids=1,2,3\",https://b.example/\n",
        );
        let pairs = read_links_csv(file.path()).unwrap();
        assert_eq!(
            pairs,
            vec![(
                "https://a.example/page?ids=1,2,3".to_string(),
                "https://b.example/".to_string(),
            )]
        );
    }

    #[test]
    fn pages_file_skips_url_header() {
        let file = write_temp("url\nhttps://a.example/\nhttps://b.example/\n");
        let pages = read_pages_file(file.path()).unwrap();
        assert_eq!(pages, vec!["https://a.example/", "https://b.example/"]);
    }

    #[test]
    fn build_targets_drops_incomplete_pairs() {
        let targets = build_targets(
            vec![
                ("https://a/".to_string(), "https://b/".to_string()),
                ("https://a/".to_string(), "".to_string()),
            ],
            vec!["https://p/".to_string(), "".to_string()],
            false,
        );
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn strict_mode_requires_http_prefix() {
        let targets = build_targets(
            vec![("ftp://a/".to_string(), "https://b/".to_string())],
            vec!["mailto:x@example.com".to_string(), "http://ok/".to_string()],
            true,
        );
        assert_eq!(
            targets,
            vec![Target::Page {
                url: "http://ok/".to_string()
            }]
        );
    }
}

use serde::Serialize;

use crate::signals::SignalPayload;

/// Compare the two most recent payloads for a subject, field by field.
///
/// Returns one line per changed field, in the fixed field order for the
/// payload's kind. Equality is exact: sequences compare by value and order,
/// with no normalization.
pub fn detect_changes(older: &SignalPayload, newer: &SignalPayload) -> Vec<String> {
    let mut changes = Vec::new();

    match (older, newer) {
        (SignalPayload::Link(old), SignalPayload::Link(new)) => {
            push_change(&mut changes, "link_path", &old.link_path, &new.link_path);
            push_change(
                &mut changes,
                "hrefs_resolved",
                &old.hrefs_resolved,
                &new.hrefs_resolved,
            );
            push_change(
                &mut changes,
                "rel_attribute",
                &old.rel_attribute,
                &new.rel_attribute,
            );
            push_change(&mut changes, "robots_meta", &old.robots_meta, &new.robots_meta);
            push_change(
                &mut changes,
                "x_robots_tag",
                &old.x_robots_tag,
                &new.x_robots_tag,
            );
            push_change(&mut changes, "anchor_text", &old.anchor_text, &new.anchor_text);
            push_change(&mut changes, "parent_text", &old.parent_text, &new.parent_text);
            push_change(
                &mut changes,
                "robots_allowed",
                &old.robots_allowed,
                &new.robots_allowed,
            );
        }
        (SignalPayload::Page(old), SignalPayload::Page(new)) => {
            push_change(&mut changes, "titles", &old.titles, &new.titles);
            push_change(&mut changes, "descriptions", &old.descriptions, &new.descriptions);
            push_change(
                &mut changes,
                "heading_counts",
                &old.heading_counts,
                &new.heading_counts,
            );
            push_change(
                &mut changes,
                "heading_contents",
                &old.heading_contents,
                &new.heading_contents,
            );
            push_change(&mut changes, "robots_meta", &old.robots_meta, &new.robots_meta);
            push_change(
                &mut changes,
                "x_robots_tag",
                &old.x_robots_tag,
                &new.x_robots_tag,
            );
            push_change(
                &mut changes,
                "robots_allowed",
                &old.robots_allowed,
                &new.robots_allowed,
            );
        }
        // Observations are fetched by (kind, subject_key), so kinds always agree
        _ => {}
    }

    changes
}

/// Join change lines into the stored difference summary.
pub fn summarize(changes: &[String]) -> String {
    changes.join("; ")
}

fn push_change<T: PartialEq + Serialize>(out: &mut Vec<String>, field: &str, old: &T, new: &T) {
    if old != new {
        out.push(format!(
            "{} changed from {} to {}",
            field,
            render(old),
            render(new)
        ));
    }
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

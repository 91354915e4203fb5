use anyhow::{Result, bail};

use crate::diary::DiaryRow;
use crate::frontmatter::split_document;
use crate::note::{self, Viewing, WATCH_HISTORY_HEADING};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Changed(String),
    DuplicateDate,
}

/// Record one more viewing in an existing note. A non-empty date that
/// already has a history sub-heading leaves the note untouched; otherwise
/// the watch counter goes up (2 when absent), the poster is added only when
/// missing, and the new entry lands right under the history heading.
pub fn append_viewing(
    existing: &str,
    viewing: &Viewing,
    poster_url: Option<&str>,
) -> Result<MergeOutcome> {
    let document = split_document(existing)?;

    let date = viewing.watched_date.as_deref().unwrap_or("");
    if !date.is_empty() && has_history_entry(&document.body, date) {
        return Ok(MergeOutcome::DuplicateDate);
    }

    let Some(mut front) = document.front_matter else {
        bail!("existing note has no front matter block");
    };

    let watches = match front.get_u64(note::WATCHES_KEY) {
        Some(count) => count.saturating_add(1),
        None => 2,
    };
    front.set_u64(note::WATCHES_KEY, watches);

    if let Some(url) = poster_url
        && !url.is_empty()
        && !front.contains(note::POSTER_KEY)
    {
        front.set_string(note::POSTER_KEY, url);
    }

    let entry = note::watch_entry(viewing);
    let body = insert_history_entry(&document.body, &entry);

    let mut output = front.render();
    output.push_str(&body);
    Ok(MergeOutcome::Changed(output))
}

/// Regenerate the front matter from the latest row, keep the existing watch
/// history byte-for-byte, and replace everything before it.
pub fn update_note(
    existing: &str,
    row: &DiaryRow,
    poster_url: Option<&str>,
    tags: &[String],
) -> Result<String> {
    let document = split_document(existing)?;
    let prior_watches = document
        .front_matter
        .as_ref()
        .and_then(|front| front.get_u64(note::WATCHES_KEY))
        .unwrap_or(0);

    let front = note::build_front_matter(row, poster_url, prior_watches.saturating_add(1), tags);

    let mut output = front.render();
    output.push('\n');
    let content = row.get(note::CONTENT_COLUMN).unwrap_or("");
    output.push_str(content);
    if let Some(history) = capture_history(&document.body) {
        if !content.is_empty() {
            output.push_str("\n\n");
        }
        output.push_str(history);
    }
    Ok(output)
}

fn has_history_entry(body: &str, date: &str) -> bool {
    let heading = format!("### {date}");
    body.lines().any(|line| line.trim_end() == heading)
}

fn capture_history(body: &str) -> Option<&str> {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if line.trim_end() == WATCH_HISTORY_HEADING {
            return Some(&body[start..]);
        }
    }
    None
}

/// Insert a new entry right after the history heading, creating the section
/// at the end of the body when no heading exists yet.
fn insert_history_entry(body: &str, entry: &str) -> String {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end() != WATCH_HISTORY_HEADING {
            continue;
        }
        let mut output = String::with_capacity(body.len() + entry.len() + 2);
        output.push_str(&body[..offset]);
        if !output.ends_with('\n') {
            output.push('\n');
        }
        output.push('\n');
        output.push_str(entry);
        let rest = &body[offset..];
        output.push_str(rest.strip_prefix('\n').unwrap_or(rest));
        return output;
    }
    format!("{body}\n\n{WATCH_HISTORY_HEADING}\n\n{entry}")
}

use anyhow::{Result, bail};

#[derive(Debug, Clone)]
pub struct DiaryRow {
    entries: Vec<(String, String)>,
}

impl DiaryRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn first_non_empty(&self, columns: &[&str]) -> Option<&str> {
        columns.iter().find_map(|column| {
            let value = self.get(column)?;
            if value.is_empty() { None } else { Some(value) }
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedDiary {
    pub headers: Vec<String>,
    pub rows: Vec<DiaryRow>,
    // One entry per line dropped for a field count mismatch.
    pub dropped: Vec<String>,
}

pub fn parse_diary(text: &str) -> Result<ParsedDiary> {
    let non_empty_lines = text.lines().filter(|line| !line.trim().is_empty()).count();
    if non_empty_lines < 2 {
        bail!(
            "diary export must contain a header row and at least one data row (found {non_empty_lines} non-empty lines)"
        );
    }

    let mut headers: Vec<String> = Vec::new();
    let mut saw_header = false;
    let mut rows = Vec::new();
    let mut dropped = Vec::new();

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let values = split_fields(line);
        if !saw_header {
            headers = values;
            saw_header = true;
            continue;
        }
        if values.len() != headers.len() {
            dropped.push(format!(
                "line {}: expected {} fields, found {}",
                index + 1,
                headers.len(),
                values.len()
            ));
            continue;
        }
        let entries = headers.iter().cloned().zip(values).collect();
        rows.push(DiaryRow { entries });
    }

    Ok(ParsedDiary {
        headers,
        rows,
        dropped,
    })
}

/// Split one line into fields. A `"` toggles quoting unless doubled inside
/// quotes (which emits a literal `"`); a `,` outside quotes ends the field.
/// Fields are trimmed after unquoting.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                current.push('"');
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if ch == ',' && !in_quotes {
            fields.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    fields.push(current.trim().to_string());
    fields
}

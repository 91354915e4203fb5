use anyhow::{Context, Result, bail};
use serde_yaml::{Mapping, Value};

/// A note split into its front-matter block (if any) and the body text that
/// follows the closing marker, kept byte-for-byte as found.
#[derive(Debug, Clone)]
pub struct NoteDocument {
    pub front_matter: Option<FrontMatter>,
    pub body: String,
}

/// Ordered front-matter model. Entries keep the order they were parsed or
/// inserted in, so re-serialized notes stay stable across merges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    entries: Vec<(String, Value)>,
}

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the inner text of a front-matter block (without the `---`
    /// markers) into an ordered mapping.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let mapping: Mapping =
            serde_yaml::from_str(text).context("failed to parse front matter block")?;
        let mut entries = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let Some(key) = scalar_key(&key) else {
                bail!("front matter key is not a scalar");
            };
            entries.push((key, value));
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Read an integer entry, tolerating a quoted numeric string.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Replace an existing entry in place, or append a new one at the end.
    pub fn set(&mut self, key: &str, value: Value) {
        for entry in &mut self.entries {
            if entry.0 == key {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((key.to_string(), value));
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.set(key, Value::String(value.to_string()));
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.set(key, Value::Number(value.into()));
    }

    pub fn set_string_list(&mut self, key: &str, items: &[String]) {
        let sequence = items
            .iter()
            .map(|item| Value::String(item.clone()))
            .collect();
        self.set(key, Value::Sequence(sequence));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Render the block including both `---` marker lines. Strings are
    /// single-quoted with embedded quotes doubled; lists print one item per
    /// line; multi-line strings become literal block scalars.
    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        for (key, value) in &self.entries {
            write_entry(&mut out, 0, key, value);
        }
        out.push_str("---\n");
        out
    }
}

/// Split a note into front matter and body. A block starts with a `---` line
/// at the top of the text and runs to the next `---` line; without both
/// markers the whole text is body.
pub fn split_document(text: &str) -> Result<NoteDocument> {
    let mut offset = 0;
    let mut inner_start: Option<usize> = None;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        match inner_start {
            None => {
                if line.trim_end() != "---" {
                    break;
                }
                inner_start = Some(offset);
            }
            Some(start) => {
                if line.trim_end() == "---" {
                    let front_matter = FrontMatter::parse(&text[start..line_start])?;
                    return Ok(NoteDocument {
                        front_matter: Some(front_matter),
                        body: text[offset..].to_string(),
                    });
                }
            }
        }
    }
    Ok(NoteDocument {
        front_matter: None,
        body: text.to_string(),
    })
}

fn scalar_key(key: &Value) -> Option<String> {
    match key {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn write_entry(out: &mut String, indent: usize, key: &str, value: &Value) {
    let pad = " ".repeat(indent);
    match value {
        Value::Sequence(items) if !items.is_empty() => {
            out.push_str(&format!("{pad}{}:\n", render_key(key)));
            for item in items {
                write_sequence_item(out, indent + 2, item);
            }
        }
        Value::Mapping(mapping) if !mapping.is_empty() => {
            out.push_str(&format!("{pad}{}:\n", render_key(key)));
            for (sub_key, sub_value) in mapping {
                let sub_key = scalar_key(sub_key).unwrap_or_default();
                write_entry(out, indent + 2, &sub_key, sub_value);
            }
        }
        Value::String(text) if text.contains('\n') => {
            write_block_scalar(out, indent, &format!("{}:", render_key(key)), text);
        }
        Value::Null => {
            out.push_str(&format!("{pad}{}:\n", render_key(key)));
        }
        other => {
            out.push_str(&format!("{pad}{}: {}\n", render_key(key), scalar_text(other)));
        }
    }
}

fn write_sequence_item(out: &mut String, indent: usize, item: &Value) {
    let pad = " ".repeat(indent);
    match item {
        Value::Sequence(items) if !items.is_empty() => {
            out.push_str(&format!("{pad}-\n"));
            for sub_item in items {
                write_sequence_item(out, indent + 2, sub_item);
            }
        }
        Value::Mapping(mapping) if !mapping.is_empty() => {
            out.push_str(&format!("{pad}-\n"));
            for (sub_key, sub_value) in mapping {
                let sub_key = scalar_key(sub_key).unwrap_or_default();
                write_entry(out, indent + 2, &sub_key, sub_value);
            }
        }
        Value::String(text) if text.contains('\n') => {
            write_block_scalar(out, indent, "-", text);
        }
        Value::Null => {
            out.push_str(&format!("{pad}-\n"));
        }
        other => {
            out.push_str(&format!("{pad}- {}\n", scalar_text(other)));
        }
    }
}

fn write_block_scalar(out: &mut String, indent: usize, lead: &str, text: &str) {
    let pad = " ".repeat(indent);
    let style = if text.ends_with('\n') { "|" } else { "|-" };
    out.push_str(&format!("{pad}{lead} {style}\n"));
    for line in text.trim_end_matches('\n').split('\n') {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&format!("{pad}  {line}\n"));
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote_single(text),
        Value::Sequence(_) => "[]".to_string(),
        Value::Mapping(_) => "{}".to_string(),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
    }
}

fn render_key(key: &str) -> String {
    let needs_quoting = key.is_empty()
        || key != key.trim()
        || key.contains(':')
        || key.contains('#')
        || key.starts_with('-')
        || key.starts_with('\'')
        || key.starts_with('"');
    if needs_quoting {
        quote_single(key)
    } else {
        key.to_string()
    }
}

fn quote_single(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

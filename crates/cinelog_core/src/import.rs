use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::DuplicateHandling;
use crate::diary::parse_diary;
use crate::library::{Library, note_relative_path};
use crate::merge::{self, MergeOutcome};
use crate::note::{self, Viewing};
use crate::tmdb::PosterApi;

pub const PROGRESS_INTERVAL: usize = 10;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub output_folder: String,
    pub duplicate_handling: DuplicateHandling,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportProgress {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub posters_found: usize,
    pub request_count: usize,
    pub warnings: Vec<String>,
}

/// Import a diary export into the library, one row at a time.
///
/// A row failure (missing title, poster lookup error, malformed existing
/// note) skips that row and records a warning; an unreadable diary or a
/// library I/O failure aborts the run. `progress` fires after every
/// `PROGRESS_INTERVAL` created or updated notes.
pub fn run_import(
    diary_text: &str,
    options: &ImportOptions,
    mut poster_api: Option<&mut dyn PosterApi>,
    library: &mut dyn Library,
    progress: &mut dyn FnMut(ImportProgress),
) -> Result<ImportReport> {
    let diary = parse_diary(diary_text)?;

    let mut report = ImportReport {
        total_rows: diary.rows.len(),
        ..ImportReport::default()
    };
    report.warnings.extend(
        diary
            .dropped
            .iter()
            .map(|detail| format!("dropped row: {detail}")),
    );

    for (index, row) in diary.rows.iter().enumerate() {
        let Some(viewing) = Viewing::from_row(row) else {
            report.skipped += 1;
            report
                .warnings
                .push(format!("row {}: missing film title", index + 1));
            continue;
        };

        let mut poster_url = None;
        if let Some(api) = poster_api.as_mut() {
            match api.poster_url(&viewing.title) {
                Ok(url) => {
                    if url.is_some() {
                        report.posters_found += 1;
                    }
                    poster_url = url;
                }
                Err(error) => {
                    report.warnings.push(format!(
                        "poster lookup failed for {}: {error}",
                        viewing.title
                    ));
                }
            }
            report.request_count = api.request_count();
        }

        let path = note_relative_path(
            &options.output_folder,
            &viewing.title,
            viewing.year.as_deref(),
        );

        let before = report.created + report.updated;
        if !library.exists(&path) {
            let text = note::synthesize(row, &viewing, poster_url.as_deref(), &options.tags);
            library
                .write(&path, &text)
                .with_context(|| format!("failed to write {path}"))?;
            report.created += 1;
        } else {
            match options.duplicate_handling {
                DuplicateHandling::Skip => {
                    report.skipped += 1;
                }
                DuplicateHandling::Append => {
                    let existing = library.read(&path)?;
                    match merge::append_viewing(&existing, &viewing, poster_url.as_deref()) {
                        Ok(MergeOutcome::Changed(text)) => {
                            library
                                .write(&path, &text)
                                .with_context(|| format!("failed to write {path}"))?;
                            report.updated += 1;
                        }
                        Ok(MergeOutcome::DuplicateDate) => {
                            report.skipped += 1;
                        }
                        Err(error) => {
                            report.skipped += 1;
                            report.warnings.push(format!("{path}: {error}"));
                        }
                    }
                }
                DuplicateHandling::Update => {
                    let existing = library.read(&path)?;
                    match merge::update_note(&existing, row, poster_url.as_deref(), &options.tags)
                    {
                        Ok(text) => {
                            library
                                .write(&path, &text)
                                .with_context(|| format!("failed to write {path}"))?;
                            report.updated += 1;
                        }
                        Err(error) => {
                            report.skipped += 1;
                            report.warnings.push(format!("{path}: {error}"));
                        }
                    }
                }
            }
        }

        let changed = report.created + report.updated;
        if changed > before && changed % PROGRESS_INTERVAL == 0 {
            progress(ImportProgress {
                processed: changed,
                total: report.total_rows,
            });
        }
    }

    Ok(report)
}

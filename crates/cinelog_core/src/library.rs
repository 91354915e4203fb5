use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use walkdir::WalkDir;

const FILENAME_SANITIZE: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

// Note storage addressed by forward-slash relative paths.
pub trait Library {
    fn exists(&self, path: &str) -> bool;
    fn read(&self, path: &str) -> Result<String>;
    fn write(&mut self, path: &str, text: &str) -> Result<()>;
    fn list(&self, folder: &str) -> Result<Vec<String>>;
}

/// Reject paths that would land outside the library root.
pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("note path is empty");
    }
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        bail!("note path must be relative: {path}");
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => bail!("note path escapes the library root: {path}"),
        }
    }
    Ok(())
}

pub fn sanitize_filename(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| if FILENAME_SANITIZE.contains(&c) { '-' } else { c })
        .collect();
    replaced.trim().to_string()
}

pub fn note_filename(title: &str, year: Option<&str>) -> String {
    let base = sanitize_filename(title);
    match year {
        Some(year) if !year.is_empty() => format!("{base} ({}).md", sanitize_filename(year)),
        _ => format!("{base}.md"),
    }
}

pub fn note_relative_path(folder: &str, title: &str, year: Option<&str>) -> String {
    let filename = note_filename(title, year);
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        filename
    } else {
        format!("{folder}/{filename}")
    }
}

#[derive(Debug, Clone)]
pub struct FsLibrary {
    root: PathBuf,
}

impl FsLibrary {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_relative_path(path)?;
        Ok(self.root.join(path))
    }
}

impl Library for FsLibrary {
    fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => full.exists(),
            Err(_) => false,
        }
    }

    fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        fs::read_to_string(&full).with_context(|| format!("failed to read {}", full.display()))
    }

    fn write(&mut self, path: &str, text: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&full, text).with_context(|| format!("failed to write {}", full.display()))
    }

    fn list(&self, folder: &str) -> Result<Vec<String>> {
        let base = if folder.is_empty() {
            self.root.clone()
        } else {
            self.resolve(folder)?
        };
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&base).follow_links(false) {
            let entry = entry.with_context(|| format!("failed to walk {}", base.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).with_context(|| {
                format!(
                    "failed to derive relative path from root {} for {}",
                    self.root.display(),
                    entry.path().display()
                )
            })?;
            paths.push(relative.to_string_lossy().replace('\\', "/"));
        }
        paths.sort();
        Ok(paths)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    files: BTreeMap<String, String>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, text: &str) -> Self {
        self.files.insert(path.to_string(), text.to_string());
        self
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Library for MemoryLibrary {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &str) -> Result<String> {
        match self.files.get(path) {
            Some(text) => Ok(text.clone()),
            None => bail!("no such note: {path}"),
        }
    }

    fn write(&mut self, path: &str, text: &str) -> Result<()> {
        validate_relative_path(path)?;
        self.files.insert(path.to_string(), text.to_string());
        Ok(())
    }

    fn list(&self, folder: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .keys()
            .filter(|path| in_folder(path, folder) && path.ends_with(".md"))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedWrite {
    pub path: String,
    pub previous: Option<String>,
    pub text: String,
}

/// Records writes instead of applying them, while reads observe the
/// pending state. Backs `--dry-run`.
pub struct PreviewLibrary<'a> {
    inner: &'a dyn Library,
    overlay: BTreeMap<String, String>,
    writes: Vec<PlannedWrite>,
}

impl<'a> PreviewLibrary<'a> {
    pub fn new(inner: &'a dyn Library) -> Self {
        Self {
            inner,
            overlay: BTreeMap::new(),
            writes: Vec::new(),
        }
    }

    pub fn writes(&self) -> &[PlannedWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<PlannedWrite> {
        self.writes
    }
}

impl Library for PreviewLibrary<'_> {
    fn exists(&self, path: &str) -> bool {
        self.overlay.contains_key(path) || self.inner.exists(path)
    }

    fn read(&self, path: &str) -> Result<String> {
        match self.overlay.get(path) {
            Some(text) => Ok(text.clone()),
            None => self.inner.read(path),
        }
    }

    fn write(&mut self, path: &str, text: &str) -> Result<()> {
        validate_relative_path(path)?;
        let previous = match self.overlay.get(path) {
            Some(text) => Some(text.clone()),
            None if self.inner.exists(path) => Some(self.inner.read(path)?),
            None => None,
        };
        self.writes.push(PlannedWrite {
            path: path.to_string(),
            previous,
            text: text.to_string(),
        });
        self.overlay.insert(path.to_string(), text.to_string());
        Ok(())
    }

    fn list(&self, folder: &str) -> Result<Vec<String>> {
        let mut paths = self.inner.list(folder)?;
        for path in self.overlay.keys() {
            if in_folder(path, folder) && !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn in_folder(path: &str, folder: &str) -> bool {
    folder.is_empty()
        || path
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("What If...?"), "What If...-");
        assert_eq!(sanitize_filename(r#"a\b/c*d?e:f"g<h>i|j"#), "a-b-c-d-e-f-g-h-i-j");
        assert_eq!(sanitize_filename("  Heat  "), "Heat");
    }

    #[test]
    fn filename_includes_year_when_present() {
        assert_eq!(note_filename("Heat", Some("1995")), "Heat (1995).md");
        assert_eq!(note_filename("Heat", None), "Heat.md");
        assert_eq!(note_filename("Heat", Some("")), "Heat.md");
    }

    #[test]
    fn relative_path_joins_folder_and_filename() {
        assert_eq!(
            note_relative_path("Films", "Heat", Some("1995")),
            "Films/Heat (1995).md"
        );
        assert_eq!(note_relative_path("", "Heat", None), "Heat.md");
        assert_eq!(
            note_relative_path("Films/", "Alien", Some("1979")),
            "Films/Alien (1979).md"
        );
    }

    #[test]
    fn relative_path_validation() {
        assert!(validate_relative_path("Films/Heat (1995).md").is_ok());
        assert!(validate_relative_path("Heat.md").is_ok());
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("../outside.md").is_err());
        assert!(validate_relative_path("Films/../../outside.md").is_err());
    }

    #[test]
    fn fs_library_roundtrip_creates_parent_directories() {
        let temp = tempdir().expect("tempdir");
        let mut library = FsLibrary::new(temp.path());

        assert!(!library.exists("Films/Heat (1995).md"));
        library
            .write("Films/Heat (1995).md", "note text\n")
            .expect("write");
        assert!(library.exists("Films/Heat (1995).md"));
        assert_eq!(
            library.read("Films/Heat (1995).md").expect("read"),
            "note text\n"
        );
    }

    #[test]
    fn fs_library_list_returns_sorted_markdown_paths() {
        let temp = tempdir().expect("tempdir");
        let mut library = FsLibrary::new(temp.path());
        library.write("Films/Zodiac (2007).md", "z").expect("write");
        library.write("Films/Alien (1979).md", "a").expect("write");
        library
            .write("Films/Classics/Heat (1995).md", "h")
            .expect("write");
        std::fs::write(temp.path().join("Films").join("notes.txt"), "not a note")
            .expect("write txt");

        let paths = library.list("Films").expect("list");
        assert_eq!(
            paths,
            vec![
                "Films/Alien (1979).md",
                "Films/Classics/Heat (1995).md",
                "Films/Zodiac (2007).md",
            ]
        );
    }

    #[test]
    fn fs_library_list_of_missing_folder_is_empty() {
        let temp = tempdir().expect("tempdir");
        let library = FsLibrary::new(temp.path());
        assert!(library.list("Films").expect("list").is_empty());
    }

    #[test]
    fn fs_library_rejects_escaping_paths() {
        let temp = tempdir().expect("tempdir");
        let mut library = FsLibrary::new(temp.path());
        let error = library
            .write("../outside.md", "text")
            .expect_err("must fail");
        assert!(error.to_string().contains("escapes the library root"));
    }

    #[test]
    fn memory_library_roundtrip() {
        let mut library = MemoryLibrary::new().with_file("Films/Heat (1995).md", "seeded");
        assert!(library.exists("Films/Heat (1995).md"));
        assert_eq!(
            library.read("Films/Heat (1995).md").expect("read"),
            "seeded"
        );
        library
            .write("Films/Alien (1979).md", "written")
            .expect("write");
        assert_eq!(
            library.list("Films").expect("list"),
            vec!["Films/Alien (1979).md", "Films/Heat (1995).md"]
        );
        assert!(library.read("Films/Missing.md").is_err());
    }

    #[test]
    fn preview_library_records_writes_without_applying_them() {
        let inner = MemoryLibrary::new().with_file("Films/Heat (1995).md", "original");
        let mut preview = PreviewLibrary::new(&inner);

        preview
            .write("Films/Heat (1995).md", "changed")
            .expect("write");
        preview
            .write("Films/Alien (1979).md", "brand new")
            .expect("write");

        assert_eq!(
            preview.read("Films/Heat (1995).md").expect("read"),
            "changed"
        );
        assert_eq!(inner.file("Films/Heat (1995).md"), Some("original"));

        let writes = preview.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].path, "Films/Heat (1995).md");
        assert_eq!(writes[0].previous.as_deref(), Some("original"));
        assert_eq!(writes[0].text, "changed");
        assert_eq!(writes[1].previous, None);
    }

    #[test]
    fn preview_library_chains_previous_text_across_writes() {
        let inner = MemoryLibrary::new();
        let mut preview = PreviewLibrary::new(&inner);
        preview.write("Films/Heat (1995).md", "first").expect("write");
        preview.write("Films/Heat (1995).md", "second").expect("write");

        let writes = preview.into_writes();
        assert_eq!(writes[1].previous.as_deref(), Some("first"));
        assert_eq!(writes[1].text, "second");
    }

    #[test]
    fn preview_library_list_merges_overlay_and_inner() {
        let inner = MemoryLibrary::new().with_file("Films/Heat (1995).md", "original");
        let mut preview = PreviewLibrary::new(&inner);
        preview
            .write("Films/Alien (1979).md", "planned")
            .expect("write");

        assert_eq!(
            preview.list("Films").expect("list"),
            vec!["Films/Alien (1979).md", "Films/Heat (1995).md"]
        );
        assert!(preview.list("Other").expect("list").is_empty());
    }
}

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use toml::Value;

use crate::library::{FsLibrary, Library};

pub const CONFIG_FILE_NAME: &str = "cinelog.toml";
pub const DEFAULT_OUTPUT_FOLDER: &str = "Films";

const STARTER_CONFIG: &str = "# cinelog configuration (materialized by `cinelog init`)\n\n[tmdb]\n# api_key = \"your-tmdb-api-key\"\n# image_size = \"w185\"\n\n[import]\noutput_folder = \"Films\"\nduplicate_handling = \"append\"\n# tags = [\"movies\"]\n";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub tmdb: TmdbSection,
    #[serde(default)]
    pub import: ImportSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct TmdbSection {
    pub api_key: Option<String>,
    pub image_size: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ImportSection {
    pub output_folder: Option<String>,
    pub duplicate_handling: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    W92,
    W154,
    W185,
    W342,
    W500,
    Original,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::W185
    }
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W92 => "w92",
            Self::W154 => "w154",
            Self::W185 => "w185",
            Self::W342 => "w342",
            Self::W500 => "w500",
            Self::Original => "original",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("w92") {
            return Ok(Self::W92);
        }
        if value.eq_ignore_ascii_case("w154") {
            return Ok(Self::W154);
        }
        if value.eq_ignore_ascii_case("w185") {
            return Ok(Self::W185);
        }
        if value.eq_ignore_ascii_case("w342") {
            return Ok(Self::W342);
        }
        if value.eq_ignore_ascii_case("w500") {
            return Ok(Self::W500);
        }
        if value.eq_ignore_ascii_case("original") {
            return Ok(Self::Original);
        }
        bail!("unsupported image size: {value} (expected w92|w154|w185|w342|w500|original)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateHandling {
    Append,
    Update,
    Skip,
}

impl Default for DuplicateHandling {
    fn default() -> Self {
        Self::Append
    }
}

impl DuplicateHandling {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Update => "update",
            Self::Skip => "skip",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("append") {
            return Ok(Self::Append);
        }
        if value.eq_ignore_ascii_case("update") {
            return Ok(Self::Update);
        }
        if value.eq_ignore_ascii_case("skip") {
            return Ok(Self::Skip);
        }
        bail!("unsupported duplicate handling: {value} (expected append|update|skip)")
    }
}

impl Config {
    /// Resolve the TMDB API key: env > config > None.
    pub fn api_key(&self) -> Option<String> {
        for key in ["CINELOG_TMDB_API_KEY", "TMDB_API_KEY"] {
            if let Ok(value) = env::var(key) {
                let trimmed = value.trim().to_string();
                if !trimmed.is_empty() {
                    return Some(trimmed);
                }
            }
        }
        self.tmdb
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
    }

    /// Resolve the poster size: env CINELOG_IMAGE_SIZE > config > w185.
    pub fn image_size(&self) -> Result<ImageSize> {
        match env_override("CINELOG_IMAGE_SIZE").or_else(|| self.tmdb.image_size.clone()) {
            Some(value) => ImageSize::parse(&value),
            None => Ok(ImageSize::default()),
        }
    }

    /// Resolve the notes folder: env CINELOG_OUTPUT_FOLDER > config > "Films".
    pub fn output_folder(&self) -> String {
        env_override("CINELOG_OUTPUT_FOLDER")
            .or_else(|| self.import.output_folder.clone())
            .unwrap_or_else(|| DEFAULT_OUTPUT_FOLDER.to_string())
    }

    /// Resolve the merge policy: env CINELOG_DUPLICATE_HANDLING > config > append.
    pub fn duplicate_handling(&self) -> Result<DuplicateHandling> {
        match env_override("CINELOG_DUPLICATE_HANDLING")
            .or_else(|| self.import.duplicate_handling.clone())
        {
            Some(value) => DuplicateHandling::parse(&value),
            None => Ok(DuplicateHandling::default()),
        }
    }

    /// Resolve default note tags: env CINELOG_TAGS (comma-separated) > config.
    pub fn tags(&self) -> Vec<String> {
        if let Some(value) = env_override("CINELOG_TAGS") {
            return split_tags(&value);
        }
        self.import.tags.clone()
    }
}

/// Comma-separated tag list, trimmed, empty entries dropped.
pub fn split_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Load and parse a Config from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    pub set_api_key: Option<String>,
    pub set_image_size: Option<ImageSize>,
    pub set_output_folder: Option<String>,
    pub set_duplicate_handling: Option<DuplicateHandling>,
    pub set_tags: Option<Vec<String>>,
}

impl ConfigPatch {
    fn is_empty(&self) -> bool {
        self.set_api_key.is_none()
            && self.set_image_size.is_none()
            && self.set_output_folder.is_none()
            && self.set_duplicate_handling.is_none()
            && self.set_tags.is_none()
    }
}

/// Update selected keys under `[tmdb]` and `[import]` while preserving all
/// other config sections. Returns `true` when a write occurred.
pub fn patch_config(config_path: &Path, patch: &ConfigPatch) -> Result<bool> {
    if patch.is_empty() {
        return Ok(false);
    }

    let mut root = if config_path.exists() {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        toml::from_str::<Value>(&content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?
    } else {
        Value::Table(Default::default())
    };
    let original = root.clone();

    let root_table = root.as_table_mut().ok_or_else(|| {
        anyhow::anyhow!(
            "top-level TOML must be a table in {}",
            config_path.display()
        )
    })?;

    if patch.set_api_key.is_some() || patch.set_image_size.is_some() {
        let tmdb_table = section_table(root_table, "tmdb", config_path)?;
        if let Some(api_key) = &patch.set_api_key {
            tmdb_table.insert("api_key".to_string(), Value::String(api_key.clone()));
        }
        if let Some(size) = patch.set_image_size {
            tmdb_table.insert(
                "image_size".to_string(),
                Value::String(size.as_str().to_string()),
            );
        }
    }

    if patch.set_output_folder.is_some()
        || patch.set_duplicate_handling.is_some()
        || patch.set_tags.is_some()
    {
        let import_table = section_table(root_table, "import", config_path)?;
        if let Some(folder) = &patch.set_output_folder {
            import_table.insert("output_folder".to_string(), Value::String(folder.clone()));
        }
        if let Some(mode) = patch.set_duplicate_handling {
            import_table.insert(
                "duplicate_handling".to_string(),
                Value::String(mode.as_str().to_string()),
            );
        }
        if let Some(tags) = &patch.set_tags {
            if tags.is_empty() {
                import_table.remove("tags");
            } else {
                let array = tags.iter().map(|tag| Value::String(tag.clone())).collect();
                import_table.insert("tags".to_string(), Value::Array(array));
            }
        }
    }

    if root == original {
        return Ok(false);
    }

    let parent = config_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", config_path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    let rendered = toml::to_string_pretty(&root).context("failed to serialize config TOML")?;
    fs::write(config_path, rendered)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}

fn section_table<'a>(
    root: &'a mut toml::map::Map<String, Value>,
    name: &str,
    config_path: &Path,
) -> Result<&'a mut toml::map::Map<String, Value>> {
    let entry = root
        .entry(name.to_string())
        .or_insert_with(|| Value::Table(Default::default()));
    entry
        .as_table_mut()
        .ok_or_else(|| anyhow::anyhow!("[{name}] must be a table in {}", config_path.display()))
}

/// Write `content` to `path` unless the file already exists and `force` is
/// not set. Returns `true` when a write occurred.
pub fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_library_dir: bool,
    pub created_output_dir: bool,
    pub wrote_config: bool,
}

/// Materialize the library layout: the root directory, a starter config,
/// and the notes output folder.
pub fn init_library(library_root: &Path, config_path: &Path, force: bool) -> Result<InitReport> {
    let mut created_library_dir = false;
    if !library_root.exists() {
        fs::create_dir_all(library_root)
            .with_context(|| format!("failed to create {}", library_root.display()))?;
        created_library_dir = true;
    }

    let wrote_config = write_text_file(config_path, STARTER_CONFIG, force)?;

    let config = load_config(config_path)?;
    let output_dir = library_root.join(config.output_folder());
    let mut created_output_dir = false;
    if !output_dir.exists() {
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        created_output_dir = true;
    }

    Ok(InitReport {
        created_library_dir,
        created_output_dir,
        wrote_config,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryStatus {
    pub library_root: String,
    pub config_path: String,
    pub config_exists: bool,
    pub api_key_configured: bool,
    pub image_size: String,
    pub output_folder: String,
    pub duplicate_handling: String,
    pub tags: Vec<String>,
    pub note_count: usize,
    pub warnings: Vec<String>,
}

/// Snapshot of the resolved configuration and the library contents.
/// Invalid enum values fall back to defaults and surface as warnings.
pub fn library_status(library_root: &Path, config_path: &Path) -> Result<LibraryStatus> {
    let config = load_config(config_path)?;
    let mut warnings = Vec::new();

    let image_size = match config.image_size() {
        Ok(size) => size,
        Err(error) => {
            warnings.push(error.to_string());
            ImageSize::default()
        }
    };
    let duplicate_handling = match config.duplicate_handling() {
        Ok(mode) => mode,
        Err(error) => {
            warnings.push(error.to_string());
            DuplicateHandling::default()
        }
    };

    let output_folder = config.output_folder();
    let library = FsLibrary::new(library_root);
    let note_count = library.list(&output_folder)?.len();

    Ok(LibraryStatus {
        library_root: library_root.to_string_lossy().replace('\\', "/"),
        config_path: config_path.to_string_lossy().replace('\\', "/"),
        config_exists: config_path.exists(),
        api_key_configured: config.api_key().is_some(),
        image_size: image_size.as_str().to_string(),
        output_folder,
        duplicate_handling: duplicate_handling.as_str().to_string(),
        tags: config.tags(),
        note_count,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_resolves_defaults() {
        let config = Config::default();
        assert_eq!(config.output_folder(), "Films");
        assert_eq!(config.image_size().expect("size"), ImageSize::W185);
        assert_eq!(
            config.duplicate_handling().expect("mode"),
            DuplicateHandling::Append
        );
        assert!(config.tags().is_empty());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/cinelog.toml")).expect("load config");
        assert!(config.tmdb.api_key.is_none());
        assert!(config.import.output_folder.is_none());
    }

    #[test]
    fn load_config_parses_both_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("cinelog.toml");
        fs::write(
            &config_path,
            r#"
[tmdb]
api_key = "abc123"
image_size = "w342"

[import]
output_folder = "Movies"
duplicate_handling = "update"
tags = ["movies", "diary"]
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.api_key().is_some());
        assert_eq!(config.image_size().expect("size"), ImageSize::W342);
        assert_eq!(config.output_folder(), "Movies");
        assert_eq!(
            config.duplicate_handling().expect("mode"),
            DuplicateHandling::Update
        );
        assert_eq!(config.tags(), vec!["movies", "diary"]);
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("cinelog.toml");
        fs::write(&config_path, "[tmdb]\nimage_size = \"w92\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.image_size().expect("size"), ImageSize::W92);
        assert_eq!(config.output_folder(), "Films");
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("cinelog.toml");
        fs::write(&config_path, "[tmdb\napi_key = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn image_size_parse_accepts_known_sizes() {
        assert_eq!(ImageSize::parse("w500").expect("parse"), ImageSize::W500);
        assert_eq!(
            ImageSize::parse("ORIGINAL").expect("parse"),
            ImageSize::Original
        );
        let error = ImageSize::parse("poster").expect_err("must fail");
        assert!(error.to_string().contains("unsupported image size"));
    }

    #[test]
    fn duplicate_handling_parse_accepts_known_modes() {
        assert_eq!(
            DuplicateHandling::parse("Skip").expect("parse"),
            DuplicateHandling::Skip
        );
        let error = DuplicateHandling::parse("merge").expect_err("must fail");
        assert!(error.to_string().contains("unsupported duplicate handling"));
    }

    #[test]
    fn split_tags_drops_empty_entries() {
        assert_eq!(
            split_tags("movies, diary,,  letterboxd "),
            vec!["movies", "diary", "letterboxd"]
        );
        assert!(split_tags("  ").is_empty());
    }

    #[test]
    fn starter_config_parses_with_expected_defaults() {
        let config: Config = toml::from_str(STARTER_CONFIG).expect("parse starter");
        assert_eq!(config.output_folder(), "Films");
        assert_eq!(
            config.duplicate_handling().expect("mode"),
            DuplicateHandling::Append
        );
        assert!(config.tmdb.api_key.is_none());
    }

    #[test]
    fn patch_config_updates_both_sections_and_preserves_others() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("cinelog.toml");
        fs::write(&config_path, "[notes]\ntheme = \"dark\"\n").expect("write config");

        let wrote = patch_config(
            &config_path,
            &ConfigPatch {
                set_api_key: Some("abc123".to_string()),
                set_image_size: Some(ImageSize::W500),
                set_output_folder: Some("Movies".to_string()),
                set_duplicate_handling: Some(DuplicateHandling::Skip),
                set_tags: Some(vec!["movies".to_string()]),
            },
        )
        .expect("patch");
        assert!(wrote);

        let raw = fs::read_to_string(&config_path).expect("read config");
        assert!(raw.contains("[notes]"));
        assert!(raw.contains("theme = \"dark\""));

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.tmdb.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.image_size().expect("size"), ImageSize::W500);
        assert_eq!(config.output_folder(), "Movies");
        assert_eq!(
            config.duplicate_handling().expect("mode"),
            DuplicateHandling::Skip
        );
        assert_eq!(config.tags(), vec!["movies"]);
    }

    #[test]
    fn patch_config_is_a_noop_when_nothing_changes() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("cinelog.toml");

        let patch = ConfigPatch {
            set_output_folder: Some("Movies".to_string()),
            ..ConfigPatch::default()
        };
        assert!(patch_config(&config_path, &patch).expect("patch"));
        assert!(!patch_config(&config_path, &patch).expect("repatch"));
        assert!(!patch_config(&config_path, &ConfigPatch::default()).expect("empty patch"));
    }

    #[test]
    fn patch_config_empty_tags_removes_key() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("cinelog.toml");
        fs::write(&config_path, "[import]\ntags = [\"movies\"]\n").expect("write config");

        let wrote = patch_config(
            &config_path,
            &ConfigPatch {
                set_tags: Some(Vec::new()),
                ..ConfigPatch::default()
            },
        )
        .expect("patch");
        assert!(wrote);
        let config = load_config(&config_path).expect("load config");
        assert!(config.tags().is_empty());
    }

    #[test]
    fn write_text_file_respects_existing_files() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("cinelog.toml");

        assert!(write_text_file(&path, "first\n", false).expect("write"));
        assert!(!write_text_file(&path, "second\n", false).expect("rewrite"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "first\n");
        assert!(write_text_file(&path, "third\n", true).expect("force"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "third\n");
    }

    #[test]
    fn init_library_materializes_layout_once() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("library");
        let config_path = root.join(CONFIG_FILE_NAME);

        let report = init_library(&root, &config_path, false).expect("init");
        assert!(report.created_library_dir);
        assert!(report.created_output_dir);
        assert!(report.wrote_config);
        assert!(root.join("Films").is_dir());

        let rerun = init_library(&root, &config_path, false).expect("rerun");
        assert!(!rerun.created_library_dir);
        assert!(!rerun.created_output_dir);
        assert!(!rerun.wrote_config);

        let forced = init_library(&root, &config_path, true).expect("force");
        assert!(forced.wrote_config);
    }

    #[test]
    fn library_status_reports_config_and_note_count() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("library");
        let config_path = root.join(CONFIG_FILE_NAME);
        init_library(&root, &config_path, false).expect("init");
        fs::write(root.join("Films").join("Heat (1995).md"), "note\n").expect("write note");

        let status = library_status(&root, &config_path).expect("status");
        assert!(status.config_exists);
        assert_eq!(status.output_folder, "Films");
        assert_eq!(status.image_size, "w185");
        assert_eq!(status.duplicate_handling, "append");
        assert_eq!(status.note_count, 1);
        assert!(status.warnings.is_empty());
    }

    #[test]
    fn library_status_flags_invalid_enum_values() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("library");
        let config_path = root.join(CONFIG_FILE_NAME);
        fs::create_dir_all(&root).expect("create root");
        fs::write(
            &config_path,
            "[tmdb]\nimage_size = \"huge\"\n\n[import]\nduplicate_handling = \"merge\"\n",
        )
        .expect("write config");

        let status = library_status(&root, &config_path).expect("status");
        assert_eq!(status.image_size, "w185");
        assert_eq!(status.duplicate_handling, "append");
        assert_eq!(status.warnings.len(), 2);
    }
}

use std::env;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use cinelog_core::config::{
    CONFIG_FILE_NAME, ConfigPatch, DuplicateHandling, ImageSize, init_library, library_status,
    load_config, patch_config, split_tags,
};
use cinelog_core::import::{ImportOptions, ImportProgress, ImportReport, run_import};
use cinelog_core::library::{FsLibrary, PlannedWrite, PreviewLibrary};
use cinelog_core::tmdb::{PosterApi, TmdbClient, TmdbClientConfig};
use clap::{Args, CommandFactory, Parser, Subcommand};
use similar::TextDiff;
use zip::ZipArchive;

#[derive(Debug, Parser)]
#[command(
    name = "cinelog",
    version,
    about = "Import film diary CSV exports into a Markdown film library"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    library: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    library: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            library: cli.library.clone(),
            config: cli.config.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    Import(ImportArgs),
    Config(ConfigArgs),
    Status,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing cinelog.toml")]
    force: bool,
}

#[derive(Debug, Args)]
struct ImportArgs {
    file: PathBuf,
    #[arg(
        long,
        value_name = "MODE",
        help = "Duplicate handling: append, update, or skip"
    )]
    mode: Option<String>,
    #[arg(
        long,
        value_name = "TAGS",
        help = "Comma-separated tags for new front matter"
    )]
    tags: Option<String>,
    #[arg(long, help = "Skip poster lookups")]
    no_posters: bool,
    #[arg(long, help = "Show planned writes without touching the library")]
    dry_run: bool,
    #[arg(long, help = "Print unified diffs of planned writes (implies --dry-run)")]
    diff: bool,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    Show,
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Import(args)) => run_import_command(&runtime, args),
        Some(Commands::Config(ConfigArgs { command })) => match command {
            ConfigSubcommand::Show => run_config_show(&runtime),
            ConfigSubcommand::Set { key, value } => run_config_set(&runtime, &key, &value),
        },
        Some(Commands::Status) => run_status(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_library_paths(runtime)?;
    let report = init_library(&paths.root, &paths.config_path, args.force)?;
    let config = load_config(&paths.config_path)?;

    println!("Initialized cinelog library");
    println!("library_root: {}", normalize_path(&paths.root));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("output_folder: {}", config.output_folder());
    println!("created_library_dir: {}", report.created_library_dir);
    println!("created_output_dir: {}", report.created_output_dir);
    println!("wrote_config: {}", report.wrote_config);

    Ok(())
}

fn run_import_command(runtime: &RuntimeOptions, args: ImportArgs) -> Result<()> {
    let paths = resolve_library_paths(runtime)?;
    let config = load_config(&paths.config_path)?;

    let duplicate_handling = match &args.mode {
        Some(raw) => DuplicateHandling::parse(raw)?,
        None => config.duplicate_handling()?,
    };
    let tags = match &args.tags {
        Some(raw) => split_tags(raw),
        None => config.tags(),
    };
    let options = ImportOptions {
        output_folder: config.output_folder(),
        duplicate_handling,
        tags,
    };

    let mut client = if args.no_posters {
        None
    } else {
        let Some(api_key) = config.api_key() else {
            bail!(
                "no TMDB API key configured; set CINELOG_TMDB_API_KEY, run `cinelog config set api-key <key>`, or pass --no-posters"
            );
        };
        let image_size = config.image_size()?;
        let client = TmdbClient::new(TmdbClientConfig::from_env(&api_key, image_size.as_str()))?;
        Some(client)
    };
    let posters = client.is_some();
    let poster_api = client.as_mut().map(|client| client as &mut dyn PosterApi);

    let diary_text = read_diary_text(&args.file)?;
    let dry_run = args.dry_run || args.diff;

    let mut library = FsLibrary::new(&paths.root);
    let (label, report, planned) = if dry_run {
        let mut preview = PreviewLibrary::new(&library);
        let report = run_import(
            &diary_text,
            &options,
            poster_api,
            &mut preview,
            &mut print_progress,
        )?;
        ("import preview", report, preview.into_writes())
    } else {
        let report = run_import(
            &diary_text,
            &options,
            poster_api,
            &mut library,
            &mut print_progress,
        )?;
        ("import complete", report, Vec::new())
    };

    println!("{label}");
    println!("file: {}", normalize_path(&args.file));
    println!("library_root: {}", normalize_path(&paths.root));
    println!("output_folder: {}", options.output_folder);
    println!("duplicate_handling: {}", options.duplicate_handling.as_str());
    println!("posters: {}", format_flag(posters));
    print_import_report(&report);
    if dry_run {
        print_planned_writes(&planned, args.diff);
    }

    Ok(())
}

fn run_config_show(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_library_paths(runtime)?;
    let config = load_config(&paths.config_path)?;

    println!("config");
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("config_exists: {}", format_flag(paths.config_path.exists()));
    println!(
        "api_key_configured: {}",
        format_flag(config.api_key().is_some())
    );
    println!("image_size: {}", config.image_size()?.as_str());
    println!(
        "duplicate_handling: {}",
        config.duplicate_handling()?.as_str()
    );
    println!("output_folder: {}", config.output_folder());
    println!("tags: {}", format_list(&config.tags()));

    Ok(())
}

fn run_config_set(runtime: &RuntimeOptions, key: &str, value: &str) -> Result<()> {
    let paths = resolve_library_paths(runtime)?;
    let patch = build_config_patch(key, value)?;
    let wrote = patch_config(&paths.config_path, &patch)?;

    println!("config set");
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("key: {key}");
    println!("wrote: {}", format_flag(wrote));

    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_library_paths(runtime)?;
    let status = library_status(&paths.root, &paths.config_path)?;

    println!("library status");
    println!("library_root: {}", status.library_root);
    println!("config_path: {}", status.config_path);
    println!("config_exists: {}", format_flag(status.config_exists));
    println!(
        "api_key_configured: {}",
        format_flag(status.api_key_configured)
    );
    println!("image_size: {}", status.image_size);
    println!("output_folder: {}", status.output_folder);
    println!("duplicate_handling: {}", status.duplicate_handling);
    println!("tags: {}", format_list(&status.tags));
    println!("note_count: {}", status.note_count);
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

fn print_import_report(report: &ImportReport) {
    println!("total_rows: {}", report.total_rows);
    println!("created: {}", report.created);
    println!("updated: {}", report.updated);
    println!("skipped: {}", report.skipped);
    println!("posters_found: {}", report.posters_found);
    println!("request_count: {}", report.request_count);
    if !report.warnings.is_empty() {
        println!("warnings:");
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }
}

fn print_planned_writes(writes: &[PlannedWrite], show_diff: bool) {
    println!("planned_writes: {}", writes.len());
    for write in writes {
        let action = if write.previous.is_some() {
            "update"
        } else {
            "create"
        };
        println!("  {action}: {}", write.path);
        if show_diff {
            let previous = write.previous.as_deref().unwrap_or("");
            let diff = TextDiff::from_lines(previous, write.text.as_str());
            print!(
                "{}",
                diff.unified_diff()
                    .context_radius(2)
                    .header("before", "after")
            );
        }
    }
}

fn print_progress(progress: ImportProgress) {
    println!(
        "Processed {}/{} films...",
        progress.processed, progress.total
    );
}

fn build_config_patch(key: &str, value: &str) -> Result<ConfigPatch> {
    let mut patch = ConfigPatch::default();
    match key {
        "api-key" => patch.set_api_key = Some(value.to_string()),
        "image-size" => patch.set_image_size = Some(ImageSize::parse(value)?),
        "output-folder" => patch.set_output_folder = Some(value.to_string()),
        "duplicate-handling" => {
            patch.set_duplicate_handling = Some(DuplicateHandling::parse(value)?);
        }
        "tags" => patch.set_tags = Some(split_tags(value)),
        _ => bail!(
            "unsupported config key: {key} (expected api-key|image-size|output-folder|duplicate-handling|tags)"
        ),
    }
    Ok(patch)
}

#[derive(Debug, Clone)]
struct LibraryPaths {
    root: PathBuf,
    config_path: PathBuf,
}

fn resolve_library_paths(runtime: &RuntimeOptions) -> Result<LibraryPaths> {
    dotenvy::dotenv().ok();

    let root = resolve_library_root(runtime)?;
    let library_env = root.join(".env");
    if library_env.exists() {
        let _ = dotenvy::from_path_override(&library_env);
    }
    let root = resolve_library_root(runtime)?;

    let config_path = if let Some(path) = &runtime.config {
        absolutize(path)?
    } else if let Some(path) = env_path("CINELOG_CONFIG") {
        absolutize(&path)?
    } else {
        root.join(CONFIG_FILE_NAME)
    };

    Ok(LibraryPaths { root, config_path })
}

fn resolve_library_root(runtime: &RuntimeOptions) -> Result<PathBuf> {
    if let Some(path) = &runtime.library {
        return absolutize(path);
    }
    if let Some(path) = env_path("CINELOG_LIBRARY") {
        return absolutize(&path);
    }
    env::current_dir().context("failed to resolve current directory")
}

fn env_path(key: &str) -> Option<PathBuf> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    Ok(cwd.join(path))
}

fn read_diary_text(path: &Path) -> Result<String> {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    if extension.eq_ignore_ascii_case("zip") {
        return read_diary_from_zip(path);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

// Prefers a diary.csv member at any depth; a lone .csv member of another
// name is accepted as a fallback.
fn read_diary_from_zip(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read zip archive {}", path.display()))?;

    let mut diary_member = None;
    let mut csv_members = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read zip archive {}", path.display()))?;
        if !entry.is_file() {
            continue;
        }
        let name = entry.name().to_string();
        let filename = name.rsplit('/').next().unwrap_or("").to_string();
        if filename.eq_ignore_ascii_case("diary.csv") {
            diary_member = Some(name);
            break;
        }
        if filename.to_ascii_lowercase().ends_with(".csv") {
            csv_members.push(name);
        }
    }

    let member = match diary_member {
        Some(name) => name,
        None if csv_members.len() == 1 => csv_members.remove(0),
        None if csv_members.is_empty() => {
            bail!("no diary.csv member found in {}", path.display())
        }
        None => bail!(
            "no diary.csv member found in {} ({} .csv members, cannot pick one)",
            path.display(),
            csv_members.len()
        ),
    };

    let mut text = String::new();
    archive
        .by_name(&member)
        .with_context(|| format!("failed to read {member} from {}", path.display()))?
        .read_to_string(&mut text)
        .with_context(|| format!("failed to read {member} from {}", path.display()))?;
    Ok(text)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn format_list(values: &[String]) -> String {
    if values.is_empty() {
        "<none>".to_string()
    } else {
        values.join(", ")
    }
}

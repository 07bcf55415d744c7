use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_QUEUE_CAPACITY: usize = 128;
pub const DEFAULT_THUMBNAIL_MAX_DIM: u32 = 200;
pub const DATABASE_FILE_NAME: &str = "shoebox.db";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source_root: Option<PathBuf>,
    #[serde(default)]
    pub dest_root: Option<PathBuf>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_thumbnail_max_dim")]
    pub thumbnail_max_dim: u32,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_thumbnail_max_dim() -> u32 {
    DEFAULT_THUMBNAIL_MAX_DIM
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_root: None,
            dest_root: None,
            database_path: None,
            ignore_patterns: Vec::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            thumbnail_max_dim: DEFAULT_THUMBNAIL_MAX_DIM,
        }
    }
}

impl AppConfig {
    /// Database location: explicit `database_path`, else `<dest_root>/shoebox.db`,
    /// else `shoebox.db` in the working directory.
    pub fn resolved_database_path(&self) -> PathBuf {
        match (&self.database_path, &self.dest_root) {
            (Some(path), _) => path.clone(),
            (None, Some(dest)) => dest.join(DATABASE_FILE_NAME),
            (None, None) => PathBuf::from(DATABASE_FILE_NAME),
        }
    }
}

impl AppConfig {
    /// Database a scan into `dest_root` reads and writes: explicit
    /// `database_path`, else the catalog inside that library.
    pub fn database_path_for(&self, dest_root: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| dest_root.join(DATABASE_FILE_NAME))
    }
}

/// Reads `Shoebox.toml` (optional) and `SHOEBOX_*` environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Shoebox").required(false))
        .add_source(
            Environment::with_prefix("SHOEBOX")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Returns true when `dest` is `src` itself or nested below it.
pub fn dest_within_source(src: &Path, dest: &Path) -> bool {
    normalized(dest).starts_with(normalized(src))
}

pub fn same_location(src: &Path, dest: &Path) -> bool {
    normalized(src) == normalized(dest)
}

fn normalized(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

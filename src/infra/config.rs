use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::flatten::VisitPolicy;
use crate::core::root::RootConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Directory names never descended into while scanning a revision
    pub blocked_dirs: Vec<String>,

    /// Extra glob patterns to ignore (matched on revision-relative paths)
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links while scanning a revision
    pub follow_symlinks: bool,

    /// Default input/output locations and worker pool sizing
    pub pipeline: PipelineConfig,

    /// Include resolution settings
    pub flatten: FlattenConfig,

    /// Root file scoring table and canonical names
    pub root: RootConfig,

    /// Sentence splitting settings
    pub segment: SegmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig
{
    pub data_raw: PathBuf,
    pub data_output: PathBuf,

    /// Worker threads for the paper pool; None means one per CPU
    pub workers: Option<usize>,

    /// File name of the per-paper hierarchy artifact
    pub output_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenConfig
{
    pub visit_policy: VisitPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig
{
    /// Extra abbreviations that never end a sentence, e.g. "Thm." or "Lem."
    pub abbreviations: Vec<String>,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            blocked_dirs: vec![
                ".git".to_string(),
                "images".to_string(),
                "figures".to_string(),
                "__pycache__".to_string(),
                "node_modules".to_string(),
                "media".to_string(),
            ],
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            pipeline: PipelineConfig::default(),
            flatten: FlattenConfig::default(),
            root: RootConfig::default(),
            segment: SegmentConfig::default(),
        }
    }
}

impl Default for PipelineConfig
{
    fn default() -> Self
    {
        Self {
            data_raw: PathBuf::from("data_raw"),
            data_output: PathBuf::from("data_output"),
            workers: None,
            output_file: "hierarchy.json".to_string(),
        }
    }
}

pub fn load_config() -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["texweave.toml", "texweave.yaml", "texweave.json", ".texweave.toml"];

    for path in &config_paths
    {
        if Path::new(path).exists()
        {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // TEXWEAVE_PIPELINE__WORKERS=4 style overrides
    builder = builder.add_source(config::Environment::with_prefix("TEXWEAVE").separator("__"));

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("texweave.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        if !ctx.quiet
        {
            println!("Would write {} bytes to {}", toml_string.len(), config_path.display());
        }
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

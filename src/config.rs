//! Layered configuration.
//!
//! Defaults, then an optional JSON config file, then `PROOFREAD_*` environment
//! variables, then CLI flags. Later layers win.
use crate::prompt::DEFAULT_TEMPLATE;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_COMMAND: &str = "claude";
pub const DEFAULT_MODEL: &str = "sonnet";
pub const DEFAULT_OUTPUT_FILE: &str = "replacements.json";

/// On-disk config file shape. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    command: Option<String>,
    model: Option<String>,
    output_file: Option<String>,
    prompt_template: Option<String>,
    prompt_template_path: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    default_dir: Option<PathBuf>,
}

/// Flag values that override everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub command: Option<String>,
    pub model: Option<String>,
    pub output_file: Option<String>,
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct ProofreadConfig {
    /// LM command words, split with shell quoting rules.
    pub command: Vec<String>,
    pub model: String,
    /// Side-file name placed next to the source document.
    pub output_file: String,
    pub prompt_template: String,
    /// Holds the run marker and saved raw output.
    pub state_dir: PathBuf,
    /// Side-file directory for text that did not come from a file.
    pub default_dir: PathBuf,
}

impl Default for ProofreadConfig {
    fn default() -> Self {
        Self {
            command: vec![DEFAULT_COMMAND.to_string()],
            model: DEFAULT_MODEL.to_string(),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            prompt_template: DEFAULT_TEMPLATE.to_string(),
            state_dir: default_state_dir(),
            default_dir: default_data_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(env::temp_dir)
        .join("proofread")
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("proofread")
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("proofread").join("config.json"))
}

/// Resolve the configuration for this invocation.
pub fn load_config(overrides: &Overrides) -> Result<ProofreadConfig> {
    let mut config = ProofreadConfig::default();

    let file_path = match overrides.config_path.as_ref() {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.is_file()),
    };
    if let Some(path) = file_path {
        let file = read_config_file(&path)?;
        apply_file(&mut config, file, &path)?;
        tracing::debug!(path = %path.display(), "loaded config file");
    }

    if let Ok(raw) = env::var("PROOFREAD_COMMAND") {
        config.command = parse_command(&raw).context("parse PROOFREAD_COMMAND")?;
    }
    if let Ok(model) = env::var("PROOFREAD_MODEL") {
        config.model = model;
    }
    if let Ok(name) = env::var("PROOFREAD_OUTPUT_FILE") {
        config.output_file = name;
    }
    if let Some(dir) = env::var_os("PROOFREAD_STATE_DIR") {
        config.state_dir = PathBuf::from(dir);
    }

    if let Some(raw) = overrides.command.as_deref() {
        config.command = parse_command(raw).context("parse --command")?;
    }
    if let Some(model) = overrides.model.as_ref() {
        config.model = model.clone();
    }
    if let Some(name) = overrides.output_file.as_ref() {
        config.output_file = name.clone();
    }

    validate_output_file(&config.output_file)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse config {}", path.display()))
}

fn apply_file(config: &mut ProofreadConfig, file: ConfigFile, path: &Path) -> Result<()> {
    if let Some(raw) = file.command {
        config.command = parse_command(&raw).context("parse config command")?;
    }
    if let Some(model) = file.model {
        config.model = model;
    }
    if let Some(name) = file.output_file {
        config.output_file = name;
    }
    match (file.prompt_template, file.prompt_template_path) {
        (Some(_), Some(_)) => {
            return Err(anyhow!(
                "config {} sets both prompt_template and prompt_template_path",
                path.display()
            ));
        }
        (Some(template), None) => config.prompt_template = template,
        (None, Some(template_path)) => {
            let template_path = resolve_relative(path, &template_path);
            config.prompt_template = fs::read_to_string(&template_path).with_context(|| {
                format!("read prompt template {}", template_path.display())
            })?;
        }
        (None, None) => {}
    }
    if let Some(dir) = file.state_dir {
        config.state_dir = resolve_relative(path, &dir);
    }
    if let Some(dir) = file.default_dir {
        config.default_dir = resolve_relative(path, &dir);
    }
    Ok(())
}

/// Relative paths in a config file are relative to the file itself.
fn resolve_relative(config_path: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        return value.to_path_buf();
    }
    config_path
        .parent()
        .map(|dir| dir.join(value))
        .unwrap_or_else(|| value.to_path_buf())
}

fn parse_command(raw: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(raw).with_context(|| format!("split command: {raw}"))?;
    if argv.is_empty() {
        return Err(anyhow!("LM command is empty"));
    }
    Ok(argv)
}

fn validate_output_file(name: &str) -> Result<()> {
    let path = Path::new(name);
    if name.is_empty() || path.file_name().map(|f| f.len()) != Some(name.len()) {
        return Err(anyhow!(
            "output file must be a bare file name, got {name:?}"
        ));
    }
    Ok(())
}

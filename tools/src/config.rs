use std::path::{Path, PathBuf};

use cond_dataset::{CondModality, DatasetConfig, Split, ANNOTATION_CANVAS};
use serde::Deserialize;

const DEFAULT_CONFIG_NAME: &str = "cond-tools.toml";
const CONFIG_ENV: &str = "COND_TOOLS_CONFIG";

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub dataset_root: PathBuf,
    pub train_modality: CondModality,
    pub val_modality: CondModality,
    pub mask_canvas: u32,
    pub probe_size_limit: Option<u64>,
    pub show_progress: bool,
    pub log_filter: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("data/imagenet"),
            train_modality: CondModality::Depth,
            val_modality: CondModality::Depth,
            mask_canvas: ANNOTATION_CANVAS,
            probe_size_limit: None,
            show_progress: true,
            log_filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ToolConfigFile {
    dataset_root: Option<String>,
    modality: Option<ModalitySection>,
    index: Option<IndexSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ModalitySection {
    train: Option<CondModality>,
    val: Option<CondModality>,
    mask_canvas: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct IndexSection {
    probe_size_limit: Option<u64>,
    progress: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingSection {
    filter: Option<String>,
}

impl ToolConfig {
    /// Load from `$COND_TOOLS_CONFIG`, else `./cond-tools.toml`, else defaults.
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME));
        let cfg = Self::from_path(&path).unwrap_or_default();
        cfg.warn_if_invalid();
        cfg
    }

    /// Load a specific file, falling back to the default lookup when `None`.
    pub fn load_from(path: Option<&Path>) -> Self {
        match path {
            Some(p) => {
                let cfg = Self::from_path(p).unwrap_or_else(|| {
                    eprintln!("tools config: could not load {}; using defaults", p.display());
                    Self::default()
                });
                cfg.warn_if_invalid();
                cfg
            }
            None => Self::load(),
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let raw = std::fs::read_to_string(path).ok()?;
        match toml::from_str::<ToolConfigFile>(&raw) {
            Ok(file) => Some(Self::from_file(file)),
            Err(e) => {
                eprintln!("tools config: failed to parse {}: {e}", path.display());
                None
            }
        }
    }

    fn from_file(file: ToolConfigFile) -> Self {
        let defaults = Self::default();
        let modality = file.modality.unwrap_or_default();
        let index = file.index.unwrap_or_default();
        ToolConfig {
            dataset_root: file
                .dataset_root
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.dataset_root),
            train_modality: modality.train.unwrap_or(defaults.train_modality),
            val_modality: modality.val.unwrap_or(defaults.val_modality),
            mask_canvas: modality.mask_canvas.unwrap_or(defaults.mask_canvas),
            probe_size_limit: index.probe_size_limit,
            show_progress: index.progress.unwrap_or(defaults.show_progress),
            log_filter: file
                .logging
                .and_then(|l| l.filter)
                .filter(|f| !f.trim().is_empty())
                .unwrap_or(defaults.log_filter),
        }
    }

    /// Dataset settings for `split`, rooted at `root` when given.
    pub fn dataset_config(&self, root: Option<&Path>, split: Split) -> DatasetConfig {
        let mut cfg = DatasetConfig::new(
            root.map(Path::to_path_buf)
                .unwrap_or_else(|| self.dataset_root.clone()),
            split,
        );
        cfg.train_modality = self.train_modality;
        cfg.val_modality = self.val_modality;
        cfg.mask_canvas = self.mask_canvas;
        cfg.probe_size_limit = self.probe_size_limit;
        cfg.show_progress = self.show_progress;
        cfg
    }

    fn warn_if_invalid(&self) {
        if self.dataset_root.as_os_str().is_empty() {
            eprintln!("tools config: dataset_root is empty; pass --root explicitly");
        }
        if self.mask_canvas == 0 {
            eprintln!("tools config: modality.mask_canvas is 0; mask rendering will fail");
        }
        if self.probe_size_limit == Some(0) {
            eprintln!("tools config: index.probe_size_limit is 0; no files will be probed");
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

fn expand_env(input: &str) -> String {
    let mut out = String::new();
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&format!("${{{}}}", key)),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

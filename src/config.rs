use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::metrics::LayoutConstants;

pub const DEFAULT_CONFIG_FILENAME: &str = "hwpx-cert-editor.toml";
pub const CONFIG_ENV_VAR: &str = "HWPX_CERT_EDITOR_CONFIG";

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub layout: LayoutConstants,
    #[serde(default)]
    pub download: DownloadSection,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownloadSection {
    /// Output file is named `<filename_prefix>_<applicant>.hwpx`.
    pub filename_prefix: String,

    /// Refuse to produce the edited archive until the applicant has been verified.
    pub require_verification: bool,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            filename_prefix: "해촉증명서".to_string(),
            require_verification: true,
        }
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# hwpx-cert-editor configuration

[download]
filename_prefix = "해촉증명서"
# Set to false to allow downloads without identity verification (offline use).
require_verification = true

# Address re-flow geometry, calibrated to the certificate template.
# Widths are in character weight units (Hangul = 2.0, other = 1.1),
# positions and sizes in HWP units.
[layout]
label_marker = "주소지"
weight_per_line = 84.0
label_weight = 20.0
line_height = 1600
line_box_height = 1000
paragraph_gap = 600
continuation_flags = 1441792
base_horz_pos = 0
base_horz_size = 42520
separator_lookback = 20
"#;

/// Walks from `start_dir` towards the root looking for `filename`.
pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    parse_config(&text).with_context(|| format!("config: {}", path.display()))
}

pub fn parse_config(text: &str) -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(text).context("parse config toml")?;
    cfg.layout.validate()?;
    Ok(cfg)
}

/// Explicit path, then the environment variable, then an upward search. No file at all means
/// built-in defaults; a named file that does not exist is an error.
pub fn resolve_config(
    explicit: Option<PathBuf>,
    workdir: &Path,
) -> anyhow::Result<(AppConfig, Option<PathBuf>)> {
    let named = explicit.or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));
    if let Some(p) = named {
        let cfg = load_config(&p)?;
        return Ok((cfg, Some(p)));
    }
    match find_default_config(workdir, DEFAULT_CONFIG_FILENAME) {
        Some(p) => Ok((load_config(&p)?, Some(p))),
        None => Ok((AppConfig::default(), None)),
    }
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "hwpx-cert-editor-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let cfg = parse_config(DEFAULT_CONFIG_TOML).expect("parse");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let cfg = parse_config(
            "[layout]\nweight_per_line = 70.0\n\n[download]\nrequire_verification = false\n",
        )
        .expect("parse");
        assert_eq!(cfg.layout.weight_per_line, 70.0);
        assert_eq!(cfg.layout.label_weight, 20.0);
        assert_eq!(cfg.layout.label_marker, "주소지");
        assert!(!cfg.download.require_verification);
        assert_eq!(cfg.download.filename_prefix, "해촉증명서");

        assert_eq!(parse_config("").expect("empty"), AppConfig::default());
        assert!(parse_config("[layout]\nline_height = \"tall\"\n").is_err());
    }

    #[test]
    fn rejects_unusable_layout() {
        let bad = [
            "[layout]\nweight_per_line = 20.0\nlabel_weight = 20.0\n",
            "[layout]\nweight_per_line = 21.5\nlabel_weight = 20.0\n",
            "[layout]\nline_height = 0\n",
            "[layout]\nbase_horz_size = -1\n",
            "[layout]\nlabel_marker = \"\"\n",
        ];
        for text in bad {
            let err = parse_config(text).expect_err(text);
            assert!(format!("{err:#}").contains("layout."), "{err:#}");
        }
        assert!(parse_config("[layout]\nweight_per_line = 22.5\nlabel_weight = 20.0\n").is_ok());
    }

    #[test]
    fn init_then_find_upwards() {
        let root = scratch_dir("init");
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).expect("nested");

        let written = init_default_config(&root, false).expect("init");
        assert_eq!(written, root.join(DEFAULT_CONFIG_FILENAME));
        assert_eq!(
            find_file_upwards(&nested, DEFAULT_CONFIG_FILENAME, 4),
            Some(written.clone())
        );
        assert_eq!(find_file_upwards(&nested, DEFAULT_CONFIG_FILENAME, 1), None);

        std::fs::write(&written, "[download]\nfilename_prefix = \"x\"\n").expect("edit");
        init_default_config(&root, false).expect("init again");
        assert_eq!(load_config(&written).expect("load").download.filename_prefix, "x");
        init_default_config(&root, true).expect("force");
        assert_eq!(load_config(&written).expect("load"), AppConfig::default());

        let _ = std::fs::remove_dir_all(&root);
    }
}

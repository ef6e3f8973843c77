use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Ceiling on matches a single rule may produce in one document
    pub max_matches_per_rule: usize,
    /// Whether `*` and `**` also match path segments starting with a dot
    pub match_dotfiles: bool,
    pub descriptions: bool,
    pub buttons: bool,
}

impl Settings {
    pub fn new(root_dir: &Path) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/linksmith/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.linksmith",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("max_matches_per_rule", DEFAULT_MAX_MATCHES_PER_RULE as i64)?
            .set_default("match_dotfiles", true)?
            .set_default("descriptions", true)?
            .set_default("buttons", true)?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }
}

pub const DEFAULT_MAX_MATCHES_PER_RULE: usize = 10_000;

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_matches_per_rule: DEFAULT_MAX_MATCHES_PER_RULE,
            match_dotfiles: true,
            descriptions: true,
            buttons: true,
        }
    }
}

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::ExecutorConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::surface::{self, Control, ControlSelectors, SelectorSet};

const CONFIG_FILENAME: &str = "config.toml";
pub const CONFIG_DIR: &str = ".sweep";
const LOG_DIR: &str = "logs";

fn default_poll_interval_ms() -> u64 {
    150
}

fn default_removal_poll_interval_ms() -> u64 {
    100
}

fn default_delete_timeout_ms() -> u64 {
    7000
}

fn default_confirm_timeout_ms() -> u64 {
    7000
}

fn default_removal_timeout_ms() -> u64 {
    15_000
}

fn default_settle_delay_ms() -> u64 {
    150
}

fn default_recovery_delay_ms() -> u64 {
    100
}

fn default_start_delay_ms() -> u64 {
    500
}

fn default_yield_every() -> usize {
    20
}

fn default_yield_pause_ms() -> u64 {
    10
}

fn default_watchdog_timeout_ms() -> u64 {
    30_000
}

fn default_terminal_hold_ms() -> u64 {
    2200
}

fn default_execution_log() -> bool {
    true
}

/// Step timings, all in milliseconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TimingSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_removal_poll_interval_ms")]
    pub removal_poll_interval_ms: u64,
    #[serde(default = "default_delete_timeout_ms")]
    pub delete_timeout_ms: u64,
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_removal_timeout_ms")]
    pub removal_timeout_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_recovery_delay_ms")]
    pub recovery_delay_ms: u64,
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    #[serde(default = "default_yield_every")]
    pub yield_every: usize,
    #[serde(default = "default_yield_pause_ms")]
    pub yield_pause_ms: u64,
    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,
    #[serde(default = "default_terminal_hold_ms")]
    pub terminal_hold_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            removal_poll_interval_ms: default_removal_poll_interval_ms(),
            delete_timeout_ms: default_delete_timeout_ms(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            removal_timeout_ms: default_removal_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            recovery_delay_ms: default_recovery_delay_ms(),
            start_delay_ms: default_start_delay_ms(),
            yield_every: default_yield_every(),
            yield_pause_ms: default_yield_pause_ms(),
            watchdog_timeout_ms: default_watchdog_timeout_ms(),
            terminal_hold_ms: default_terminal_hold_ms(),
        }
    }
}

/// Candidate selectors per control role, tried in order.
///
/// ```toml
/// [selectors]
/// delete_control = ['button[data-test-id="delete-button"]', "button.delete-btn"]
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SelectorSettings {
    #[serde(default = "surface::default_menu_trigger")]
    pub menu_trigger: Vec<String>,
    #[serde(default = "surface::default_overlay")]
    pub overlay: Vec<String>,
    #[serde(default = "surface::default_delete_control")]
    pub delete_control: Vec<String>,
    #[serde(default = "surface::default_confirm_control")]
    pub confirm_control: Vec<String>,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            menu_trigger: surface::default_menu_trigger(),
            overlay: surface::default_overlay(),
            delete_control: surface::default_delete_control(),
            confirm_control: surface::default_confirm_control(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LogSettings {
    #[serde(default = "default_execution_log")]
    pub execution_log: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            execution_log: default_execution_log(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub selectors: SelectorSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl ProjectConfig {
    /// Search upward from `start` for a `.sweep/config.toml` file and load it.
    /// Returns the default config if no file is found.
    pub fn load(start: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = Self::find_config_file(start) {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: ProjectConfig = toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid config {}", path.display()))?;
            Ok((config, Some(path)))
        } else {
            Ok((ProjectConfig::default(), None))
        }
    }

    /// Poll intervals must be non-zero; a zero interval would spin on the
    /// surface until the step timeout.
    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        for (name, value) in [
            ("poll_interval_ms", t.poll_interval_ms),
            ("removal_poll_interval_ms", t.removal_poll_interval_ms),
        ] {
            if value == 0 {
                bail!("timing.{name} must be at least 1");
            }
        }
        Ok(())
    }

    fn find_config_file(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Where execution logs go: next to the config file when one was found,
    /// otherwise under `start`.
    pub fn log_dir(start: &Path, config_path: Option<&Path>) -> PathBuf {
        config_path
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| start.join(CONFIG_DIR))
            .join(LOG_DIR)
    }

    pub fn control_selectors(&self) -> ControlSelectors {
        let s = &self.selectors;
        ControlSelectors {
            menu_trigger: SelectorSet::new(Control::MenuTrigger, s.menu_trigger.clone()),
            overlay: SelectorSet::new(Control::Overlay, s.overlay.clone()),
            delete_control: SelectorSet::new(Control::DeleteControl, s.delete_control.clone()),
            confirm_control: SelectorSet::new(Control::ConfirmControl, s.confirm_control.clone()),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let t = &self.timing;
        let ms = Duration::from_millis;
        OrchestratorConfig {
            executor: ExecutorConfig {
                selectors: self.control_selectors(),
                poll_interval: ms(t.poll_interval_ms),
                removal_poll_interval: ms(t.removal_poll_interval_ms),
                delete_timeout: ms(t.delete_timeout_ms),
                confirm_timeout: ms(t.confirm_timeout_ms),
                removal_timeout: ms(t.removal_timeout_ms),
                settle_delay: ms(t.settle_delay_ms),
                recovery_delay: ms(t.recovery_delay_ms),
            },
            watchdog_timeout: ms(t.watchdog_timeout_ms),
            start_delay: ms(t.start_delay_ms),
            yield_every: t.yield_every,
            yield_pause: ms(t.yield_pause_ms),
            terminal_hold: ms(t.terminal_hold_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn default_config_values() {
        let config = ProjectConfig::default();
        assert_eq!(config.timing.poll_interval_ms, 150);
        assert_eq!(config.timing.removal_poll_interval_ms, 100);
        assert_eq!(config.timing.delete_timeout_ms, 7000);
        assert_eq!(config.timing.confirm_timeout_ms, 7000);
        assert_eq!(config.timing.removal_timeout_ms, 15_000);
        assert_eq!(config.timing.settle_delay_ms, 150);
        assert_eq!(config.timing.start_delay_ms, 500);
        assert_eq!(config.timing.yield_every, 20);
        assert_eq!(config.timing.watchdog_timeout_ms, 30_000);
        assert_eq!(config.timing.terminal_hold_ms, 2200);
        assert!(config.log.execution_log);
        assert_eq!(config.selectors.overlay[0], "div.cdk-overlay-container");
    }

    #[test]
    fn defaults_match_runtime_defaults() {
        assert_eq!(
            ProjectConfig::default().orchestrator_config(),
            OrchestratorConfig::default()
        );
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[timing]
poll_interval_ms = 50
removal_poll_interval_ms = 25
delete_timeout_ms = 3000
confirm_timeout_ms = 4000
removal_timeout_ms = 9000
settle_delay_ms = 80
recovery_delay_ms = 60
start_delay_ms = 0
yield_every = 10
yield_pause_ms = 5
watchdog_timeout_ms = 120000
terminal_hold_ms = 1000

[selectors]
menu_trigger = ["button.more"]
overlay = [".layer"]
delete_control = ["button.remove"]
confirm_control = ["button.yes", "button.ok"]

[log]
execution_log = false
"#;
        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.timing.poll_interval_ms, 50);
        assert_eq!(config.timing.yield_every, 10);
        assert_eq!(config.selectors.confirm_control, vec!["button.yes", "button.ok"]);
        assert!(!config.log.execution_log);

        let runtime = config.orchestrator_config();
        assert_eq!(runtime.executor.poll_interval, Duration::from_millis(50));
        assert_eq!(runtime.executor.removal_timeout, Duration::from_secs(9));
        assert_eq!(runtime.watchdog_timeout, Duration::from_secs(120));
        assert_eq!(runtime.start_delay, Duration::ZERO);
        assert_eq!(runtime.executor.selectors.menu_trigger.control, Control::MenuTrigger);
        assert_eq!(runtime.executor.selectors.overlay.candidates, vec![".layer"]);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[timing]
watchdog_timeout_ms = 60000
"#;
        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.timing.watchdog_timeout_ms, 60_000);
        assert_eq!(config.timing.poll_interval_ms, 150);
        assert_eq!(config.selectors, SelectorSettings::default());
        assert!(config.log.execution_log);
    }

    #[test]
    fn rejects_wrong_types() {
        let err = toml::from_str::<ProjectConfig>("[timing]\npoll_interval_ms = \"fast\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn load_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let sweep_dir = tmp.path().join(".sweep");
        fs::create_dir_all(&sweep_dir).unwrap();
        fs::write(
            sweep_dir.join("config.toml"),
            r#"
[timing]
settle_delay_ms = 300

[log]
execution_log = false
"#,
        )
        .unwrap();

        let (config, path) = ProjectConfig::load(tmp.path()).unwrap();
        assert_eq!(path, Some(sweep_dir.join("config.toml")));
        assert_eq!(config.timing.settle_delay_ms, 300);
        assert!(!config.log.execution_log);
    }

    #[test]
    fn load_returns_default_when_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (config, path) = ProjectConfig::load(tmp.path()).unwrap();
        assert!(path.is_none());
        assert_eq!(config, ProjectConfig::default());
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let sweep_dir = tmp.path().join(".sweep");
        fs::create_dir_all(&sweep_dir).unwrap();
        fs::write(sweep_dir.join("config.toml"), "[timing\n").unwrap();

        let err = ProjectConfig::load(tmp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn load_rejects_zero_poll_intervals() {
        let tmp = tempfile::tempdir().unwrap();
        let sweep_dir = tmp.path().join(".sweep");
        fs::create_dir_all(&sweep_dir).unwrap();

        fs::write(sweep_dir.join("config.toml"), "[timing]\npoll_interval_ms = 0\n").unwrap();
        let err = format!("{:#}", ProjectConfig::load(tmp.path()).unwrap_err());
        assert!(err.contains("config.toml"));
        assert!(err.contains("timing.poll_interval_ms"));

        fs::write(
            sweep_dir.join("config.toml"),
            "[timing]\nremoval_poll_interval_ms = 0\n",
        )
        .unwrap();
        let err = format!("{:#}", ProjectConfig::load(tmp.path()).unwrap_err());
        assert!(err.contains("timing.removal_poll_interval_ms"));

        fs::write(sweep_dir.join("config.toml"), "[timing]\npoll_interval_ms = 1\n").unwrap();
        let (config, _) = ProjectConfig::load(tmp.path()).unwrap();
        assert_eq!(config.timing.poll_interval_ms, 1);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ProjectConfig::default().validate().is_ok());
    }

    #[test]
    fn load_walks_up_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let sweep_dir = tmp.path().join(".sweep");
        fs::create_dir_all(&sweep_dir).unwrap();
        fs::write(sweep_dir.join("config.toml"), "[timing]\nyield_every = 7\n").unwrap();

        let nested = tmp.path().join("src").join("deep").join("nested");
        fs::create_dir_all(&nested).unwrap();

        let (config, path) = ProjectConfig::load(&nested).unwrap();
        assert!(path.is_some());
        assert_eq!(config.timing.yield_every, 7);
    }

    #[test]
    fn log_dir_follows_config_location() {
        let start = Path::new("/work/project/sub");
        let config = Path::new("/work/project/.sweep/config.toml");
        assert_eq!(
            ProjectConfig::log_dir(start, Some(config)),
            PathBuf::from("/work/project/.sweep/logs")
        );
        assert_eq!(
            ProjectConfig::log_dir(start, None),
            PathBuf::from("/work/project/sub/.sweep/logs")
        );
    }
}

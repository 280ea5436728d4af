use std::{
    env,
    path::{Path, PathBuf},
};

use capflow_util::{expand_tilde, split_path_list};

/// Environment variable overriding the automations directory.
pub const AUTOMATIONS_DIR_ENV: &str = "CAPFLOW_DIR";
/// Environment variable listing extra provider roots, scanned before the defaults.
pub const PROVIDERS_PATH_ENV: &str = "CAPFLOW_PROVIDERS";
/// Directory (inside the automations directory) holding run logs.
pub const LOGS_DIR_NAME: &str = ".logs";

/// Provider roots relative to the working directory, scanned after the environment list.
const RELATIVE_PROVIDER_ROOTS: [&str; 2] = ["providers", "skills"];
/// Well-known absolute provider roots used by hosted agent workspaces.
const ABSOLUTE_PROVIDER_ROOTS: [&str; 3] = ["/data/skills", "/data/clawd/skills", "/app/skills"];

/// Directories the tool reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationPaths {
    /// Where installed automation documents live.
    pub automations_dir: PathBuf,
    /// Provider roots in scan order; earlier roots win capability collisions.
    pub provider_dirs: Vec<PathBuf>,
}

impl AutomationPaths {
    /// Resolve paths from an optional `--dir` override, the environment, and the working directory.
    pub fn resolve(dir_override: Option<&Path>) -> Self {
        let working_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve_in(dir_override, &working_dir)
    }

    /// Resolve paths relative to an explicit working directory.
    pub fn resolve_in(dir_override: Option<&Path>, working_dir: &Path) -> Self {
        let automations_dir = match dir_override {
            Some(path) => path.to_path_buf(),
            None => match env::var(AUTOMATIONS_DIR_ENV) {
                Ok(path) if !path.trim().is_empty() => expand_tilde(&path),
                _ => working_dir.join("automations"),
            },
        };

        let mut provider_dirs = match env::var(PROVIDERS_PATH_ENV) {
            Ok(raw) => split_path_list(&raw),
            Err(_) => Vec::new(),
        };
        provider_dirs.extend(RELATIVE_PROVIDER_ROOTS.iter().map(|root| working_dir.join(root)));
        provider_dirs.extend(ABSOLUTE_PROVIDER_ROOTS.iter().map(PathBuf::from));

        Self {
            automations_dir,
            provider_dirs,
        }
    }

    /// Root of the run-log store.
    pub fn logs_dir(&self) -> PathBuf {
        self.automations_dir.join(LOGS_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_environment() {
        temp_env::with_vars(
            [(AUTOMATIONS_DIR_ENV, Some("/env/automations")), (PROVIDERS_PATH_ENV, None)],
            || {
                let paths = AutomationPaths::resolve_in(Some(Path::new("/cli/automations")), Path::new("/work"));
                assert_eq!(paths.automations_dir, PathBuf::from("/cli/automations"));
                assert_eq!(paths.logs_dir(), PathBuf::from("/cli/automations/.logs"));
            },
        );
    }

    #[test]
    fn environment_then_working_directory_defaults() {
        temp_env::with_vars(
            [(AUTOMATIONS_DIR_ENV, Some("/env/automations")), (PROVIDERS_PATH_ENV, None)],
            || {
                let paths = AutomationPaths::resolve_in(None, Path::new("/work"));
                assert_eq!(paths.automations_dir, PathBuf::from("/env/automations"));
            },
        );
        temp_env::with_vars([(AUTOMATIONS_DIR_ENV, None::<&str>), (PROVIDERS_PATH_ENV, None)], || {
            let paths = AutomationPaths::resolve_in(None, Path::new("/work"));
            assert_eq!(paths.automations_dir, PathBuf::from("/work/automations"));
        });
    }

    #[cfg(unix)]
    #[test]
    fn provider_roots_list_environment_entries_first() {
        temp_env::with_vars(
            [(AUTOMATIONS_DIR_ENV, None), (PROVIDERS_PATH_ENV, Some("/team/providers:/shared/providers"))],
            || {
                let paths = AutomationPaths::resolve_in(None, Path::new("/work"));
                assert_eq!(
                    paths.provider_dirs,
                    vec![
                        PathBuf::from("/team/providers"),
                        PathBuf::from("/shared/providers"),
                        PathBuf::from("/work/providers"),
                        PathBuf::from("/work/skills"),
                        PathBuf::from("/data/skills"),
                        PathBuf::from("/data/clawd/skills"),
                        PathBuf::from("/app/skills"),
                    ]
                );
            },
        );
    }
}

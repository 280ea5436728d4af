//! Installed automation documents.
//!
//! Automations live as `<name>.yaml` (or `.yml`) files in the automations directory. YAML is a
//! superset of JSON, so JSON documents decode through the same path.

use std::{
    fs,
    path::{Path, PathBuf},
};

use capflow_types::Automation;
use thiserror::Error;
use tracing::debug;

const DOCUMENT_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

#[derive(Debug, Error)]
pub enum AutomationStoreError {
    #[error("automation '{name}' not found in {}", directory.display())]
    NotFound { name: String, directory: PathBuf },
    #[error("failed to read automation at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid automation document {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A decoded automation together with where it came from.
#[derive(Debug, Clone)]
pub struct InstalledAutomation {
    /// File stem; used as the run-log directory name and the display-name fallback.
    pub key: String,
    pub path: PathBuf,
    pub automation: Automation,
}

impl InstalledAutomation {
    pub fn display_name(&self) -> &str {
        self.automation.display_name(&self.key)
    }
}

/// One row of [`AutomationStore::list`]; documents that fail to decode are kept with their error.
#[derive(Debug)]
pub struct ListedAutomation {
    pub key: String,
    pub path: PathBuf,
    pub automation: Result<Automation, AutomationStoreError>,
}

/// Decode an automation document from YAML or JSON text.
pub fn parse_automation(content: &str) -> Result<Automation, serde_yaml::Error> {
    serde_yaml::from_str(content)
}

/// Read-only view over the automations directory.
#[derive(Debug, Clone)]
pub struct AutomationStore {
    root: PathBuf,
}

impl AutomationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a name (or a direct document path) to an existing file.
    pub fn locate(&self, name: &str) -> Result<PathBuf, AutomationStoreError> {
        let direct = Path::new(name);
        if has_document_extension(direct) && direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        DOCUMENT_EXTENSIONS
            .iter()
            .map(|extension| self.root.join(format!("{name}.{extension}")))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| AutomationStoreError::NotFound {
                name: name.to_string(),
                directory: self.root.clone(),
            })
    }

    pub fn load(&self, name: &str) -> Result<InstalledAutomation, AutomationStoreError> {
        let path = self.locate(name)?;
        let automation = read_document(&path)?;
        debug!(path = %path.display(), steps = automation.steps.len(), "automation loaded");
        Ok(InstalledAutomation {
            key: document_key(&path),
            path,
            automation,
        })
    }

    /// Every document in the automations directory, sorted by file name.
    ///
    /// A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<ListedAutomation>, AutomationStoreError> {
        let listing = match fs::read_dir(&self.root) {
            Ok(listing) => listing,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AutomationStoreError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut paths: Vec<PathBuf> = listing
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && has_document_extension(path))
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| ListedAutomation {
                key: document_key(&path),
                automation: read_document(&path),
                path,
            })
            .collect())
    }
}

fn read_document(path: &Path) -> Result<Automation, AutomationStoreError> {
    let content = fs::read_to_string(path).map_err(|source| AutomationStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_automation(&content).map_err(|source| AutomationStoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn has_document_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| DOCUMENT_EXTENSIONS.contains(&extension))
}

fn document_key(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DIGEST: &str = "name: Daily digest\ndescription: Summarize feeds\ntrigger:\n  schedule: \"0 8 * * *\"\nrequires:\n  - feeds\nsteps:\n  - name: fetch\n    capability: feeds\n    method: list\n";

    #[test]
    fn loads_by_name_preferring_yaml() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("digest.yaml"), DIGEST).unwrap();
        fs::write(dir.path().join("digest.yml"), "name: shadowed\n").unwrap();

        let store = AutomationStore::new(dir.path());
        let installed = store.load("digest").unwrap();
        assert_eq!(installed.key, "digest");
        assert_eq!(installed.display_name(), "Daily digest");
        assert_eq!(installed.automation.trigger.unwrap().schedule.as_deref(), Some("0 8 * * *"));
    }

    #[test]
    fn accepts_direct_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("adhoc.yml");
        fs::write(&path, "steps:\n  - action: notify\n    message: hi\n").unwrap();

        let store = AutomationStore::new(dir.path().join("elsewhere"));
        let installed = store.load(path.to_str().unwrap()).unwrap();
        assert_eq!(installed.key, "adhoc");
        assert_eq!(installed.display_name(), "adhoc");
    }

    #[test]
    fn missing_automation_is_not_found() {
        let dir = tempdir().unwrap();
        let store = AutomationStore::new(dir.path());
        assert!(matches!(store.load("ghost"), Err(AutomationStoreError::NotFound { .. })));
    }

    #[test]
    fn decode_errors_carry_the_path() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.yaml"), "steps:\n  - action: launch\n").unwrap();
        let store = AutomationStore::new(dir.path());
        let error = store.load("bad").unwrap_err();
        assert!(matches!(error, AutomationStoreError::Decode { .. }));
        assert!(error.to_string().contains("bad.yaml"));
    }

    #[test]
    fn lists_documents_sorted_and_keeps_failures() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("zeta.yaml"), DIGEST).unwrap();
        fs::write(dir.path().join("alpha.yml"), "steps: 5\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not an automation").unwrap();
        fs::create_dir_all(dir.path().join(".logs")).unwrap();

        let listed = AutomationStore::new(dir.path()).list().unwrap();
        let keys: Vec<_> = listed.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
        assert!(listed[0].automation.is_err());
        assert!(listed[1].automation.is_ok());
    }

    #[test]
    fn json_documents_decode() {
        let automation = parse_automation(r#"{"name": "j", "steps": [{"action": "evaluate", "expression": "1"}]}"#).unwrap();
        assert_eq!(automation.steps.len(), 1);
    }
}

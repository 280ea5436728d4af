//! Capability index built by scanning provider directories.
//!
//! Each provider root holds one subdirectory per provider. A provider declares the capabilities it
//! fulfills through [`CAPABILITY_MANIFEST_FILE`] and/or the front matter of
//! [`PROVIDER_DESCRIPTOR_FILE`]. The first provider to declare a capability wins; later
//! declarations of the same name are ignored without a diagnostic.
//!
//! Scanning never fails: missing roots, unreadable directories, and missing files only yield
//! fewer entries.

use std::{
    fs,
    path::{Path, PathBuf},
};

use capflow_types::Requirement;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::manifest::{extract_method_instructions, parse_front_matter_provides, parse_provides};

pub const CAPABILITY_MANIFEST_FILE: &str = "CAPABILITY.md";
pub const PROVIDER_DESCRIPTOR_FILE: &str = "SKILL.md";

/// The provider that fulfills a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEntry {
    /// Provider directory name.
    pub provider_id: String,
    /// Absolute or root-relative provider directory.
    pub location: PathBuf,
    /// Contents of `CAPABILITY.md`, read once at scan time.
    pub manifest: Option<String>,
}

impl ProviderEntry {
    /// Instructions an operator follows to fulfill `method` with this provider.
    pub fn instructions_for(&self, capability: &str, method: &str) -> String {
        match self.manifest.as_deref() {
            Some(manifest) => extract_method_instructions(manifest, method),
            None => format!(
                "Use the {} provider to perform {capability}.{method} with the given arguments.",
                self.provider_id
            ),
        }
    }
}

/// Mapping from capability name to the first provider that declared it.
#[derive(Debug, Clone, Default)]
pub struct CapabilityIndex {
    entries: IndexMap<String, ProviderEntry>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every root in order and index the capabilities their providers declare.
    pub fn resolve<P: AsRef<Path>>(provider_roots: &[P]) -> Self {
        let mut index = Self::new();
        for root in provider_roots {
            index.scan_root(root.as_ref());
        }
        debug!(capabilities = index.len(), "capability index built");
        index
    }

    fn scan_root(&mut self, root: &Path) {
        let listing = match fs::read_dir(root) {
            Ok(listing) => listing,
            Err(error) => {
                trace!(root = %root.display(), %error, "skipping provider root");
                return;
            }
        };

        let mut providers: Vec<PathBuf> = listing
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        providers.sort();

        for location in providers {
            self.scan_provider(location);
        }
    }

    fn scan_provider(&mut self, location: PathBuf) {
        let Some(provider_id) = location.file_name().and_then(|name| name.to_str()).map(str::to_string) else {
            return;
        };
        let manifest = fs::read_to_string(location.join(CAPABILITY_MANIFEST_FILE)).ok();
        let descriptor = fs::read_to_string(location.join(PROVIDER_DESCRIPTOR_FILE)).ok();

        let mut declared = manifest.as_deref().map(parse_provides).unwrap_or_default();
        declared.extend(descriptor.as_deref().map(parse_front_matter_provides).unwrap_or_default());
        if declared.is_empty() {
            return;
        }

        let provider = ProviderEntry {
            provider_id,
            location,
            manifest,
        };
        for capability in declared {
            if !self.declare(capability.clone(), provider.clone()) {
                trace!(%capability, provider = %provider.provider_id, "capability already provided");
            }
        }
    }

    /// Record a provider for `capability` unless one is already known.
    ///
    /// Returns `true` when the provider was recorded.
    pub fn declare(&mut self, capability: impl Into<String>, provider: ProviderEntry) -> bool {
        let capability = capability.into();
        if self.entries.contains_key(&capability) {
            return false;
        }
        self.entries.insert(capability, provider);
        true
    }

    pub fn get(&self, capability: &str) -> Option<&ProviderEntry> {
        self.entries.get(capability)
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.entries.contains_key(capability)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capabilities in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProviderEntry)> {
        self.entries.iter().map(|(name, provider)| (name.as_str(), provider))
    }

    /// Partition requirements into those with a known provider and those without.
    pub fn check_requirements(&self, requirements: &[Requirement]) -> RequirementCheck {
        let mut check = RequirementCheck::default();
        for requirement in requirements {
            let capability = requirement.capability().to_string();
            if self.contains(&capability) {
                check.satisfied.insert(capability);
            } else {
                check.missing.insert(capability);
            }
        }
        check
    }
}

/// Result of [`CapabilityIndex::check_requirements`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementCheck {
    pub satisfied: IndexSet<String>,
    pub missing: IndexSet<String>,
}

impl RequirementCheck {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_provider(root: &Path, id: &str, manifest: Option<&str>, descriptor: Option<&str>) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        if let Some(manifest) = manifest {
            fs::write(dir.join(CAPABILITY_MANIFEST_FILE), manifest).unwrap();
        }
        if let Some(descriptor) = descriptor {
            fs::write(dir.join(PROVIDER_DESCRIPTOR_FILE), descriptor).unwrap();
        }
    }

    #[test]
    fn indexes_manifest_and_descriptor_declarations() {
        let root = tempdir().unwrap();
        write_provider(root.path(), "youtube", Some("Provides: youtube-data\n"), None);
        write_provider(
            root.path(),
            "slack",
            None,
            Some("---\nprovides:\n  - capability: chat\n  - capability: notifications\n---\n"),
        );
        write_provider(root.path(), "empty", None, None);

        let index = CapabilityIndex::resolve(&[root.path()]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("youtube-data").unwrap().provider_id, "youtube");
        assert_eq!(index.get("chat").unwrap().provider_id, "slack");
        assert!(index.get("youtube-data").unwrap().manifest.is_some());
        assert!(index.get("chat").unwrap().manifest.is_none());
    }

    #[test]
    fn first_declaration_wins_across_roots() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write_provider(first.path(), "zeta", Some("Provides: mail\n"), None);
        write_provider(second.path(), "alpha", Some("Provides: mail, calendar\n"), None);

        let index = CapabilityIndex::resolve(&[first.path(), second.path()]);
        assert_eq!(index.get("mail").unwrap().provider_id, "zeta");
        assert_eq!(index.get("calendar").unwrap().provider_id, "alpha");
    }

    #[test]
    fn providers_within_a_root_scan_lexicographically() {
        let root = tempdir().unwrap();
        write_provider(root.path(), "b-provider", Some("Provides: mail\n"), None);
        write_provider(root.path(), "a-provider", Some("Provides: mail\n"), None);

        let index = CapabilityIndex::resolve(&[root.path()]);
        assert_eq!(index.get("mail").unwrap().provider_id, "a-provider");
    }

    #[test]
    fn missing_roots_are_skipped() {
        let root = tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let index = CapabilityIndex::resolve(&[missing]);
        assert!(index.is_empty());
    }

    #[test]
    fn requirement_check_partitions_names() {
        let mut index = CapabilityIndex::new();
        index.declare(
            "chat",
            ProviderEntry {
                provider_id: "slack".into(),
                location: PathBuf::from("/providers/slack"),
                manifest: None,
            },
        );
        let requirements = vec![Requirement::Name("chat".into()), Requirement::Name("zzz".into())];

        let check = index.check_requirements(&requirements);
        assert!(!check.is_satisfied());
        assert!(check.satisfied.contains("chat"));
        assert!(check.missing.contains("zzz"));
    }

    #[test]
    fn instructions_fall_back_without_manifest() {
        let provider = ProviderEntry {
            provider_id: "slack".into(),
            location: PathBuf::from("/providers/slack"),
            manifest: None,
        };
        assert_eq!(
            provider.instructions_for("chat", "post"),
            "Use the slack provider to perform chat.post with the given arguments."
        );
    }
}

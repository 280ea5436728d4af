//! Registry crate for locating automations and the providers that fulfill their capabilities.
//!
//! - [`config`] resolves the automations, provider, and run-log directories.
//! - [`capabilities`] scans provider directories into a [`CapabilityIndex`].
//! - [`manifest`] extracts declared capabilities and operator instructions from provider files.
//! - [`automations`] reads installed automation documents.

pub mod automations;
pub mod capabilities;
pub mod config;
pub mod manifest;

pub use automations::{AutomationStore, AutomationStoreError, InstalledAutomation, ListedAutomation, parse_automation};
pub use capabilities::{CAPABILITY_MANIFEST_FILE, CapabilityIndex, PROVIDER_DESCRIPTOR_FILE, ProviderEntry, RequirementCheck};
pub use config::AutomationPaths;
pub use manifest::extract_method_instructions;

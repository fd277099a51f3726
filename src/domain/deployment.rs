//! Typed view of the deployment descriptor: which services run on which machines.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde_yaml::Value;

use crate::loader::descriptor::{DescriptorRead, read_section, scalar_text, string_list};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedService {
    pub name: String,
    pub version: String,
    pub description: String,
    pub assigned_machines: Vec<String>,
}

impl DeployedService {
    fn from_node(node: &Value) -> Result<Self, String> {
        if !node.is_mapping() {
            return Err("service entry is not a mapping".to_string());
        }

        let text = |key: &str| node.get(key).and_then(scalar_text).unwrap_or_default().trim().to_string();

        let name = text("name");
        if name.is_empty() {
            return Err("service entry has no 'name'".to_string());
        }

        Ok(DeployedService {
            version: text("version"),
            description: text("description"),
            assigned_machines: node.get("deployment").and_then(|d| d.get("machines")).map(string_list).unwrap_or_default(),
            name,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    XSmall,
    Small,
    Medium,
    Large,
}

impl SizeClass {
    /// `(cpu_cores, memory_gb)`, used for display only.
    pub fn resources(&self) -> (u32, u32) {
        match self {
            SizeClass::XSmall => (1, 2),
            SizeClass::Small => (2, 4),
            SizeClass::Medium => (4, 8),
            SizeClass::Large => (8, 16),
        }
    }
}

impl FromStr for SizeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x-small" | "xsmall" | "x_small" => Ok(SizeClass::XSmall),
            "small" => Ok(SizeClass::Small),
            "medium" => Ok(SizeClass::Medium),
            "large" => Ok(SizeClass::Large),
            other => Err(format!("unknown size class '{}'", other)),
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SizeClass::XSmall => "x-small",
            SizeClass::Small => "small",
            SizeClass::Medium => "medium",
            SizeClass::Large => "large",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineDescriptor {
    pub hostname: String,
    pub size_class: SizeClass,
}

impl MachineDescriptor {
    fn from_node(node: &Value) -> Result<Self, String> {
        let hostname = node.get("hostname").and_then(scalar_text).map(|h| h.trim().to_string()).filter(|h| !h.is_empty()).ok_or("machine entry has no 'hostname'")?;
        let size_raw = node.get("size").and_then(scalar_text).ok_or_else(|| format!("machine '{}' has no 'size'", hostname))?;
        let size_class = size_raw.parse::<SizeClass>().map_err(|e| format!("machine '{}': {}", hostname, e))?;

        Ok(MachineDescriptor { hostname, size_class })
    }
}

pub fn read_services_outcome(descriptor_path: &Path) -> DescriptorRead<DeployedService> {
    read_section(descriptor_path, "services", DeployedService::from_node)
}

pub fn read_machines_outcome(descriptor_path: &Path) -> DescriptorRead<MachineDescriptor> {
    read_section(descriptor_path, "machines", MachineDescriptor::from_node)
}

/// Declared services. Empty when the file is missing or has no `services:` section.
pub fn read_services(descriptor_path: &Path) -> Vec<DeployedService> {
    read_services_outcome(descriptor_path).into_items()
}

/// Declared machines. Empty when the file is missing or has no `machines:` section.
pub fn read_machines(descriptor_path: &Path) -> Vec<MachineDescriptor> {
    read_machines_outcome(descriptor_path).into_items()
}

/// Services named in `names`, in deployment order, and the names that matched nothing.
pub fn select_services(services: &[DeployedService], names: &[String]) -> (Vec<DeployedService>, Vec<String>) {
    let wanted: Vec<&str> = names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();

    let selected = services.iter().filter(|s| wanted.contains(&s.name.as_str())).cloned().collect();
    let unknown = wanted.iter().filter(|n| !services.iter().any(|s| s.name == **n)).map(|n| n.to_string()).collect();
    (selected, unknown)
}

/// Deployment text with every `services` entry named `service` dropped. The rest of the
/// document is kept as is, minus comments and formatting.
pub fn without_service(text: &str, service: &str) -> crate::error::Result<String> {
    let mut document: Value = serde_yaml::from_str(text)?;
    if let Some(Value::Sequence(services)) = document.get_mut("services") {
        services.retain(|entry| entry.get("name").and_then(scalar_text).as_deref() != Some(service));
    }
    Ok(serde_yaml::to_string(&document)?)
}

/// How the current service list differs from a reference list, by service name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentDiff {
    pub removed: Vec<String>,
    pub added: Vec<String>,

    /// Present in both, modified or not.
    pub kept: Vec<String>,

    /// Present in both but with a different version or description.
    pub modified: Vec<String>,
}

impl DeploymentDiff {
    pub fn between(original: &[DeployedService], current: &[DeployedService]) -> Self {
        let current_by_name: HashMap<&str, &DeployedService> = current.iter().map(|s| (s.name.as_str(), s)).collect();
        let original_names: HashMap<&str, &DeployedService> = original.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut diff = DeploymentDiff::default();
        for service in original {
            let Some(now) = current_by_name.get(service.name.as_str()) else {
                diff.removed.push(service.name.clone());
                continue;
            };
            diff.kept.push(service.name.clone());
            if now.version != service.version || now.description != service.description {
                diff.modified.push(service.name.clone());
            }
        }
        diff.added = current.iter().filter(|s| !original_names.contains_key(s.name.as_str())).map(|s| s.name.clone()).collect();
        diff
    }

    /// Problems that make this more than a clean removal of `service`.
    pub fn violations_for_single_removal(&self, service: &str) -> Vec<String> {
        let mut problems = Vec::new();

        if self.kept.iter().any(|s| s == service) {
            problems.push(format!("'{}' is still deployed", service));
        } else if !self.removed.iter().any(|s| s == service) {
            problems.push(format!("'{}' was not present in the original deployment snapshot, so its removal cannot be verified", service));
        }
        for other in self.removed.iter().filter(|s| *s != service) {
            problems.push(format!("'{}' was removed but is still required", other));
        }
        for name in &self.added {
            problems.push(format!("'{}' was added", name));
        }
        for name in &self.modified {
            problems.push(format!("'{}' was modified", name));
        }
        problems
    }
}

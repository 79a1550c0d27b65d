//! Ground-truth datasets for OS validation

use crate::core::error::{ReconError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistributionInfo {
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub architecture: Vec<String>,
}

/// `distribution -> {versions[], architecture[]}`, names compared lowercase
#[derive(Debug, Clone, Default)]
pub struct OsCatalogue {
    distributions: BTreeMap<String, DistributionInfo>,
}

impl OsCatalogue {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, DistributionInfo> = serde_json::from_str(content)?;
        Ok(Self {
            distributions: raw
                .into_iter()
                .map(|(name, info)| (name.to_lowercase(), info))
                .collect(),
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReconError::MissingFile(path.to_path_buf()));
        }
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn distribution(&self, name: &str) -> Option<&DistributionInfo> {
        self.distributions.get(&name.to_lowercase())
    }

    pub fn has_version(&self, name: &str, version: &str) -> bool {
        self.distribution(name)
            .map(|d| d.versions.iter().any(|v| v == version))
            .unwrap_or(false)
    }

    /// Architecture check; without a known distribution any listed
    /// architecture is accepted
    pub fn has_architecture(&self, name: &str, arch: &str) -> bool {
        match self.distribution(name) {
            Some(d) => d.architecture.iter().any(|a| a.eq_ignore_ascii_case(arch)),
            None => self
                .distributions
                .values()
                .any(|d| d.architecture.iter().any(|a| a.eq_ignore_ascii_case(arch))),
        }
    }

    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}

/// Known kernel versions
#[derive(Debug, Clone, Default)]
pub struct KernelList {
    versions: Vec<String>,
}

impl KernelList {
    pub fn new(versions: Vec<String>) -> Self {
        Self { versions }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(content)?))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReconError::MissingFile(path.to_path_buf()));
        }
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Exact match, or a listed release extending the given version
    /// (`5.4.0` matches `5.4.0-42-generic`)
    pub fn contains(&self, kernel: &str) -> bool {
        self.versions.iter().any(|v| {
            v == kernel
                || v
                    .strip_prefix(kernel)
                    .map(|rest| rest.starts_with(['-', '+']))
                    .unwrap_or(false)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOGUE: &str = r#"{
        "Ubuntu": {"versions": ["8.04", "20.04"], "architecture": ["x86_64", "i386"]},
        "debian": {"versions": ["10"], "architecture": ["amd64"]}
    }"#;

    #[test]
    fn test_catalogue_lookup() {
        let cat = OsCatalogue::from_json_str(CATALOGUE).unwrap();
        assert_eq!(cat.len(), 2);
        assert!(cat.has_version("ubuntu", "20.04"));
        assert!(!cat.has_version("ubuntu", "21.10"));
        assert!(cat.has_architecture("Ubuntu", "X86_64"));
        assert!(!cat.has_architecture("debian", "x86_64"));
        assert!(cat.has_architecture("unknown", "amd64"));
    }

    #[test]
    fn test_kernel_prefix_match() {
        let kernels = KernelList::new(vec!["2.6.24".into(), "5.4.0-42-generic".into()]);
        assert!(kernels.contains("2.6.24"));
        assert!(kernels.contains("5.4.0"));
        assert!(!kernels.contains("5.4"));
        assert!(!kernels.contains("4.15.0"));
    }

    #[test]
    fn test_missing_file() {
        let err = OsCatalogue::from_json_file(Path::new("/nonexistent/os.json")).unwrap_err();
        assert!(matches!(err, ReconError::MissingFile(_)));
    }
}

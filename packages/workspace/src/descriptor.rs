//! External project descriptor loading.
//!
//! Build tooling writes a JSON descriptor per project (configuration,
//! root namespace, tag metadata, declared documents). A malformed or
//! missing descriptor resets the in-memory project to defaults; a bad
//! external write must never take the server down.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use weft_state::{FileKind, ProjectConfiguration, TagDescriptor};

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed descriptor: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DescriptorFileKind {
    Ordinary,
    Component,
}

impl From<DescriptorFileKind> for FileKind {
    fn from(kind: DescriptorFileKind) -> Self {
        match kind {
            DescriptorFileKind::Ordinary => FileKind::Ordinary,
            DescriptorFileKind::Component => FileKind::Component,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorDocument {
    pub file_path: PathBuf,
    pub target_path: PathBuf,
    pub kind: DescriptorFileKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorTag {
    pub name: String,
    pub assembly: String,
}

/// The persisted project descriptor, as written by build tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub project_file_path: PathBuf,
    pub configuration_name: String,
    #[serde(default)]
    pub root_namespace: Option<String>,
    #[serde(default)]
    pub tags: Vec<DescriptorTag>,
    #[serde(default)]
    pub documents: Vec<DescriptorDocument>,
}

impl ProjectDescriptor {
    /// Default descriptor used when external data is missing or bad.
    pub fn reset_for(project_file_path: impl Into<PathBuf>) -> Self {
        Self {
            project_file_path: project_file_path.into(),
            configuration_name: "default".to_string(),
            root_namespace: None,
            tags: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn configuration(&self) -> ProjectConfiguration {
        ProjectConfiguration {
            configuration_name: self.configuration_name.clone(),
            root_namespace: self.root_namespace.clone(),
        }
    }

    pub fn tag_descriptors(&self) -> Vec<TagDescriptor> {
        self.tags
            .iter()
            .map(|t| TagDescriptor {
                name: t.name.clone(),
                assembly: t.assembly.clone(),
            })
            .collect()
    }
}

fn try_load(path: &Path) -> Result<ProjectDescriptor, DescriptorError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Load the descriptor at `path`, resetting to defaults on any failure.
pub fn load_descriptor(path: &Path, project_file_path: &Path) -> ProjectDescriptor {
    match try_load(path) {
        Ok(descriptor) => descriptor,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                %err,
                "failed to load project descriptor; resetting to defaults"
            );
            ProjectDescriptor::reset_for(project_file_path)
        }
    }
}

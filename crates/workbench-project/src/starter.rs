//! Starter projects for first-time users

use crate::model::MAX_NAME_LEN;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use workbench_common::{Actor, ServiceTag, WorkbenchError};

/// Predefined "getting started" project kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarterKind {
    Spark,
    Streaming,
    DeepLearning,
}

impl StarterKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spark => "spark",
            Self::Streaming => "streaming",
            Self::DeepLearning => "deep_learning",
        }
    }

    /// Services the demo is created with
    pub fn services(&self) -> &'static [ServiceTag] {
        match self {
            Self::Spark => &[ServiceTag::Jobs, ServiceTag::Notebook],
            Self::Streaming => &[ServiceTag::Jobs, ServiceTag::Streaming],
            Self::DeepLearning => &[ServiceTag::Jobs, ServiceTag::Notebook, ServiceTag::Serving],
        }
    }

    /// `demo_<kind>_<username>`, always a valid project name
    ///
    /// Characters outside `[A-Za-z0-9_]` become `_`, runs of `_` collapse to
    /// one and the result is cut at [`MAX_NAME_LEN`].
    pub fn project_name(&self, actor: &Actor) -> String {
        let mut name = format!("demo_{}_", self.as_str());
        for c in actor.username.chars() {
            if name.len() >= MAX_NAME_LEN {
                break;
            }
            let c = if c.is_ascii_alphanumeric() { c } else { '_' };
            if c == '_' && name.ends_with('_') {
                continue;
            }
            name.push(c);
        }
        name
    }

    /// Project description of the demo
    pub fn description(&self) -> String {
        format!("A demo project for getting started with {}", self.as_str())
    }
}

impl fmt::Display for StarterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StarterKind {
    type Err = WorkbenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spark" => Ok(Self::Spark),
            "streaming" | "kafka" => Ok(Self::Streaming),
            "deep_learning" => Ok(Self::DeepLearning),
            other => Err(WorkbenchError::InvalidDefinition(format!(
                "unknown starter project kind: {}",
                other
            ))),
        }
    }
}

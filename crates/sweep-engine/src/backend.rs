use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a sweep runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    CpuSequential,
    #[default]
    CpuParallel,
    Gpu,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::CpuSequential, Backend::CpuParallel, Backend::Gpu];

    pub fn name(self) -> &'static str {
        match self {
            Backend::CpuSequential => "cpu-sequential",
            Backend::CpuParallel => "cpu-parallel",
            Backend::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = String;

    /// Accepts the kebab-case names plus `cpu`, `seq`, `sequential`,
    /// `parallel` and `cuda`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "cpu-sequential" | "sequential" | "seq" => Ok(Backend::CpuSequential),
            "cpu-parallel" | "parallel" | "cpu" => Ok(Backend::CpuParallel),
            "gpu" | "cuda" => Ok(Backend::Gpu),
            other => Err(format!(
                "unknown backend '{other}' (expected one of cpu-sequential, cpu-parallel, gpu)"
            )),
        }
    }
}

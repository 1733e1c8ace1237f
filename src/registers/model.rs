use crate::error::{Result, SolarmapError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inverter model family a register applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InverterModel {
    #[serde(rename = "H1")]
    H1,
    #[serde(rename = "AC1")]
    Ac1,
    #[serde(rename = "AIO-H1")]
    AioH1,
    #[serde(rename = "KH")]
    Kh,
}

impl InverterModel {
    pub const ALL: [InverterModel; 4] = [
        InverterModel::H1,
        InverterModel::Ac1,
        InverterModel::AioH1,
        InverterModel::Kh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InverterModel::H1 => "H1",
            InverterModel::Ac1 => "AC1",
            InverterModel::AioH1 => "AIO-H1",
            InverterModel::Kh => "KH",
        }
    }
}

impl fmt::Display for InverterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InverterModel {
    type Err = SolarmapError;

    fn from_str(s: &str) -> Result<Self> {
        InverterModel::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SolarmapError::config(format!("Unknown inverter model: {}", s)))
    }
}

//! Shared domain enumerations aligned with the demo API wire format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreeningStatus {
    Open,
    Closed,
}

impl ScreeningStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScreeningStatus::Open => "open",
            ScreeningStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assignee {
    Adam,
    Joe,
}

impl Assignee {
    pub fn as_str(self) -> &'static str {
        match self {
            Assignee::Adam => "adam",
            Assignee::Joe => "joe",
        }
    }
}

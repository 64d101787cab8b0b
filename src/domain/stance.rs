// ============================================================
// Layer 3 - Stance Domain Type
// ============================================================
// The four classes a (headline, body) pair can belong to.
// Index order is fixed: it is the order of the model's output
// logits and of the integer labels in the data files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StanceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Agree,
    Disagree,
    Discuss,
    Unrelated,
}

impl Stance {
    /// All stances in label-index order
    pub const ALL: [Stance; 4] = [
        Stance::Agree,
        Stance::Disagree,
        Stance::Discuss,
        Stance::Unrelated,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        match self {
            Stance::Agree     => 0,
            Stance::Disagree  => 1,
            Stance::Discuss   => 2,
            Stance::Unrelated => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Agree, disagree and discuss all say the body is about the headline.
    pub fn is_related(self) -> bool {
        self != Stance::Unrelated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stance::Agree     => "agree",
            Stance::Disagree  => "disagree",
            Stance::Discuss   => "discuss",
            Stance::Unrelated => "unrelated",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts either the label index ("2") or its name ("discuss").
impl FromStr for Stance {
    type Err = StanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Self::from_index(index)
                .ok_or_else(|| StanceError::UnknownStance(s.to_string()));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StanceError::UnknownStance(s.to_string()))
    }
}

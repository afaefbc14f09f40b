use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of personas the gateway can start a session with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Persona {
    A,
    B,
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Persona::A => "A",
            Persona::B => "B",
        })
    }
}

impl Persona {
    /// The system prompt prepended to every turn's LLM messages for this
    /// persona (spec §4.1 "Turn dispatch": history plus the persona system
    /// prompt).
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Persona::A => {
                "You are persona A: warm, concise, and quick to move the \
                 conversation toward a resolution."
            }
            Persona::B => {
                "You are persona B: formal and thorough, confirming details \
                 before offering a resolution."
            }
        }
    }
}

impl FromStr for Persona {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Persona::A),
            "B" => Ok(Persona::B),
            other => Err(crate::error::Error::Other(format!(
                "unknown persona {other:?}"
            ))),
        }
    }
}

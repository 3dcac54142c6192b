//! Game identities
//!
//! Source tables identify assets as `"<engine>:<code>"`, with the engine part
//! optional. Parsing splits at the last colon so a code never contains one.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct GameId {
    engine: Option<String>,
    code: String,
}

impl GameId {
    /// Parse an identity string. Returns `None` for blank input or an empty code.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rfind(':') {
            Some(pos) => {
                let code = &trimmed[pos + 1..];
                if code.is_empty() {
                    return None;
                }
                let engine = &trimmed[..pos];
                Some(Self {
                    engine: (!engine.is_empty()).then(|| engine.to_string()),
                    code: code.to_string(),
                })
            }
            None => Some(Self {
                engine: None,
                code: trimmed.to_string(),
            }),
        }
    }

    /// The code without its engine prefix
    pub fn short(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.engine {
            Some(engine) => write!(f, "{}:{}", engine, self.code),
            None => write!(f, "{}", self.code),
        }
    }
}

impl From<GameId> for String {
    fn from(id: GameId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for GameId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GameId::parse(&value).ok_or_else(|| format!("invalid game id: '{}'", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_engine() {
        let id = GameId::parse("scumm:monkey").unwrap();
        assert_eq!(id.engine.as_deref(), Some("scumm"));
        assert_eq!(id.short(), "monkey");
        assert_eq!(id.to_string(), "scumm:monkey");
    }

    #[test]
    fn test_parse_splits_at_last_colon() {
        let id = GameId::parse("ags:sub:thing").unwrap();
        assert_eq!(id.engine.as_deref(), Some("ags:sub"));
        assert_eq!(id.short(), "thing");
    }

    #[test]
    fn test_parse_without_engine() {
        let id = GameId::parse(" monkey ").unwrap();
        assert_eq!(id.engine.as_deref(), None);
        assert_eq!(id.to_string(), "monkey");
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(GameId::parse("").is_none());
        assert!(GameId::parse("   ").is_none());
        assert!(GameId::parse("scumm:").is_none());
    }
}

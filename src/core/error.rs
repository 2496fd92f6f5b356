use thiserror::Error;

use crate::core::types::PlayerIndex;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("No viable castle site found for player {player} after {tries} tries")]
    NoCastleSite { player: PlayerIndex, tries: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Thread error: {0}")]
    ThreadError(String),
}

pub type Result<T> = std::result::Result<T, AiError>;

//! Process configuration.
//!
//! Resolved once at startup: which signature backend the halt authority
//! uses, the economics constitution table, and the log level. Nothing in
//! this module is consulted again at call sites — the backend choice in
//! particular is fixed here, never per call.
//!
//! # Configuration sources
//!
//! - Environment variables prefixed with `CERTRAIL_`
//! - A constitution JSON file
//! - Programmatic defaults

use crate::constitution::EconomicsConstitution;
use crate::sign::{SchemeKind, SignatureScheme};
use crate::{CertrailError, Result};
use serde::{Deserialize, Serialize};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete certrail configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CertrailConfig {
    /// Signature backend for seals.
    pub scheme: SchemeKind,

    /// The immutable economics bound table.
    pub constitution: EconomicsConstitution,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for CertrailConfig {
    fn default() -> Self {
        CertrailConfig {
            scheme: SchemeKind::Ed25519,
            constitution: EconomicsConstitution::baseline(),
            log_level: "info".to_string(),
        }
    }
}

impl CertrailConfig {
    /// Load configuration from environment variables.
    ///
    /// - `CERTRAIL_SCHEME` — `ed25519` or `hash`
    /// - `CERTRAIL_CONSTITUTION` — path to a constitution JSON file
    /// - `CERTRAIL_LOG_LEVEL` — trace, debug, info, warn, error
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(scheme) = std::env::var("CERTRAIL_SCHEME") {
            config.scheme = SchemeKind::parse(&scheme)?;
        }

        if let Ok(path) = std::env::var("CERTRAIL_CONSTITUTION") {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                CertrailError::Config(format!("cannot read constitution file {path:?}: {e}"))
            })?;
            config.constitution = EconomicsConstitution::from_json_str(&contents)?;
        }

        if let Ok(level) = std::env::var("CERTRAIL_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(CertrailError::Config(format!(
                "log_level must be one of {LOG_LEVELS:?}, got {:?}",
                self.log_level
            )));
        }
        self.constitution.validate()?;
        Ok(())
    }

    /// Instantiate the configured signature backend.
    pub fn signature_scheme(&self) -> Box<dyn SignatureScheme + Send + Sync> {
        self.scheme.instantiate()
    }
}

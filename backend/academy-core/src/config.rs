// src/config.rs
use serde::{Deserialize, Serialize};

use crate::error::{AcademyError, Result};
use crate::period::PeriodLength;

pub const ENV_PREFIX: &str = "ACADEMY_";
pub const DEFAULT_MIN_PERIOD_DAYS: u32 = 1;
pub const DEFAULT_MAX_PERIOD_DAYS: u32 = 365;
pub const DEFAULT_PERIOD_DAYS: u32 = 30;
pub const DEFAULT_ALLOWED_ABSENCES: u32 = 3;
pub const DEFAULT_WARNING_THRESHOLD: u32 = 2;

fn default_min_period_days() -> u32 {
    DEFAULT_MIN_PERIOD_DAYS
}
fn default_max_period_days() -> u32 {
    DEFAULT_MAX_PERIOD_DAYS
}
fn default_period_days() -> u32 {
    DEFAULT_PERIOD_DAYS
}
fn default_allowed_absences() -> u32 {
    DEFAULT_ALLOWED_ABSENCES
}
fn default_warning_threshold() -> u32 {
    DEFAULT_WARNING_THRESHOLD
}

// --- Engine Configuration ---

/// Bounds resolved once at startup and handed to the engine by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_min_period_days")]
    pub min_period_days: u32,
    #[serde(default = "default_max_period_days")]
    pub max_period_days: u32,
    #[serde(default = "default_period_days")]
    pub default_period_days: u32,
    #[serde(default = "default_allowed_absences")]
    pub allowed_absences: u32,
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_period_days: DEFAULT_MIN_PERIOD_DAYS,
            max_period_days: DEFAULT_MAX_PERIOD_DAYS,
            default_period_days: DEFAULT_PERIOD_DAYS,
            allowed_absences: DEFAULT_ALLOWED_ABSENCES,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Reads `ACADEMY_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> std::result::Result<Self, envy::Error> {
        dotenv::dotenv().ok();
        envy::prefixed(ENV_PREFIX).from_env::<EngineConfig>()
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_period_days < 1 {
            return Err(AcademyError::Validation(
                "minimum period length must be at least 1 day".to_string(),
            ));
        }
        if self.min_period_days > self.max_period_days {
            return Err(AcademyError::Validation(format!(
                "minimum period length {} exceeds maximum {}",
                self.min_period_days, self.max_period_days
            )));
        }
        if !(self.min_period_days..=self.max_period_days).contains(&self.default_period_days) {
            return Err(AcademyError::Validation(format!(
                "default period length {} is outside {}..={}",
                self.default_period_days, self.min_period_days, self.max_period_days
            )));
        }
        Ok(())
    }

    pub fn period_bounds(&self) -> PeriodBounds {
        PeriodBounds {
            min_days: self.min_period_days,
            max_days: self.max_period_days,
            default_days: self.default_period_days,
        }
    }

    pub fn absence_policy(&self) -> AbsencePolicy {
        AbsencePolicy {
            allowed_absences: self.allowed_absences,
            warning_threshold: self.warning_threshold,
        }
    }
}

// --- Resolved Bounds ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub min_days: u32,
    pub max_days: u32,
    pub default_days: u32,
}

impl PeriodBounds {
    /// Period length for a class: the requested value checked against the
    /// bounds, or the default when nothing was requested.
    pub fn resolve(&self, requested: Option<u32>) -> Result<PeriodLength> {
        let days = requested.unwrap_or(self.default_days);
        if days < self.min_days || days > self.max_days {
            return Err(AcademyError::Validation(format!(
                "period length {} must be between {} and {} days",
                days, self.min_days, self.max_days
            )));
        }
        PeriodLength::new(days)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsencePolicy {
    pub allowed_absences: u32,
    pub warning_threshold: u32,
}

impl Default for AbsencePolicy {
    fn default() -> Self {
        Self {
            allowed_absences: DEFAULT_ALLOWED_ABSENCES,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

//! Library and page-manager settings.
//!
//! Values load from any `ConfigPort` under `[library]` and `[pages]`.
//! Missing keys take their defaults; every value is validated before use.

use crate::domain::error::CoreError;
use crate::ports::config_port::ConfigPort;

const LIBRARY: &str = "library";
const PAGES: &str = "pages";

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryConfig {
    /// Share of session volume the value area must enclose.
    pub value_area_pct: f64,
    pub swing_strength: usize,
    pub default_ray_skip: usize,
    /// Minimum |delta| / volume for an exchange to count towards divergence.
    pub divergence_threshold: f64,
    pub imbalance_ratio: f64,
    /// Volume multiple of the recent average that counts as heavy.
    pub absorption_volume_ratio: f64,
    /// Body size in percent of the open below which price "did not move".
    pub absorption_move_pct: f64,
    pub absorption_lookback: usize,
    /// Footprint price step; 0 derives it from the bar's close.
    pub footprint_tick_size: f64,
    pub profile_bins: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            value_area_pct: 0.70,
            swing_strength: 2,
            default_ray_skip: 1,
            divergence_threshold: 0.10,
            imbalance_ratio: 3.0,
            absorption_volume_ratio: 2.0,
            absorption_move_pct: 0.10,
            absorption_lookback: 20,
            footprint_tick_size: 0.0,
            profile_bins: 24,
        }
    }
}

impl LibraryConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CoreError> {
        let d = Self::default();
        let parsed = Self {
            value_area_pct: config.get_double(LIBRARY, "value_area_pct", d.value_area_pct),
            swing_strength: get_count(config, LIBRARY, "swing_strength", d.swing_strength)?,
            default_ray_skip: get_count(config, LIBRARY, "default_ray_skip", d.default_ray_skip)?,
            divergence_threshold: config.get_double(
                LIBRARY,
                "divergence_threshold",
                d.divergence_threshold,
            ),
            imbalance_ratio: config.get_double(LIBRARY, "imbalance_ratio", d.imbalance_ratio),
            absorption_volume_ratio: config.get_double(
                LIBRARY,
                "absorption_volume_ratio",
                d.absorption_volume_ratio,
            ),
            absorption_move_pct: config.get_double(
                LIBRARY,
                "absorption_move_pct",
                d.absorption_move_pct,
            ),
            absorption_lookback: get_count(
                config,
                LIBRARY,
                "absorption_lookback",
                d.absorption_lookback,
            )?,
            footprint_tick_size: config.get_double(
                LIBRARY,
                "footprint_tick_size",
                d.footprint_tick_size,
            ),
            profile_bins: get_count(config, LIBRARY, "profile_bins", d.profile_bins)?,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_value_area_pct(self.value_area_pct)?;
        validate_at_least_one(LIBRARY, "swing_strength", self.swing_strength)?;
        validate_fraction(LIBRARY, "divergence_threshold", self.divergence_threshold)?;
        validate_ratio(LIBRARY, "imbalance_ratio", self.imbalance_ratio)?;
        validate_ratio(LIBRARY, "absorption_volume_ratio", self.absorption_volume_ratio)?;
        validate_non_negative(LIBRARY, "absorption_move_pct", self.absorption_move_pct)?;
        validate_at_least_one(LIBRARY, "absorption_lookback", self.absorption_lookback)?;
        validate_non_negative(LIBRARY, "footprint_tick_size", self.footprint_tick_size)?;
        validate_at_least_one(LIBRARY, "profile_bins", self.profile_bins)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    /// Page computations allowed to run at once.
    pub workers: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl PageConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CoreError> {
        let parsed = Self {
            workers: get_count(config, PAGES, "workers", Self::default().workers)?,
        };
        validate_at_least_one(PAGES, "workers", parsed.workers)?;
        Ok(parsed)
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> CoreError {
    CoreError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn get_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, CoreError> {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value).map_err(|_| invalid(section, key, format!("{key} must be non-negative")))
}

fn validate_value_area_pct(value: f64) -> Result<(), CoreError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(
            LIBRARY,
            "value_area_pct",
            "value_area_pct must be in (0, 1]",
        ));
    }
    Ok(())
}

fn validate_fraction(section: &str, key: &str, value: f64) -> Result<(), CoreError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(section, key, format!("{key} must be between 0 and 1")));
    }
    Ok(())
}

fn validate_ratio(section: &str, key: &str, value: f64) -> Result<(), CoreError> {
    if value.is_nan() || value < 1.0 {
        return Err(invalid(section, key, format!("{key} must be at least 1")));
    }
    Ok(())
}

fn validate_non_negative(section: &str, key: &str, value: f64) -> Result<(), CoreError> {
    if value.is_nan() || value < 0.0 {
        return Err(invalid(section, key, format!("{key} must be non-negative")));
    }
    Ok(())
}

fn validate_at_least_one(section: &str, key: &str, value: usize) -> Result<(), CoreError> {
    if value == 0 {
        return Err(invalid(section, key, format!("{key} must be at least 1")));
    }
    Ok(())
}

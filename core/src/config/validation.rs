use std::path::Path;

use serde::de::DeserializeOwned;

use crate::config::types::*;
use crate::error::{ConfigError, Result};

/// Configuration that can check itself before a metric is built from it.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl ResetPolicy {
    /// Checks the policy's own parameters, independent of the metric type.
    pub fn validate(&self) -> Result<()> {
        match *self {
            ResetPolicy::Never | ResetPolicy::OnSnapshot => Ok(()),
            ResetPolicy::Periodically { period } => {
                if period < MIN_CHUNK_DURATION {
                    return Err(ConfigError::InvalidResetPeriod {
                        period,
                        min: MIN_CHUNK_DURATION,
                    });
                }
                Ok(())
            }
            ResetPolicy::ByChunks { window, chunks, .. }
            | ResetPolicy::SmoothlyDecaying { window, chunks } => {
                if chunks == 0 || chunks > MAX_CHUNKS {
                    return Err(ConfigError::InvalidChunkCount {
                        chunks,
                        max: MAX_CHUNKS,
                    });
                }

                let chunk = window / chunks as u32;
                if chunk < MIN_CHUNK_DURATION {
                    return Err(ConfigError::ChunkTooShort {
                        chunk,
                        min: MIN_CHUNK_DURATION,
                    });
                }
                Ok(())
            }
        }
    }

    fn reject_decaying(&self, metric: &'static str) -> Result<()> {
        if let ResetPolicy::SmoothlyDecaying { .. } = self {
            return Err(ConfigError::UnsupportedPolicy {
                policy: self.name(),
                metric,
            });
        }
        Ok(())
    }
}

impl Validate for HistogramConfig {
    fn validate(&self) -> Result<()> {
        self.reset.reject_decaying("histograms")?;
        self.reset.validate()?;

        if self.significant_digits > MAX_SIGNIFICANT_DIGITS {
            return Err(ConfigError::InvalidSignificantDigits {
                digits: self.significant_digits,
                max: MAX_SIGNIFICANT_DIGITS,
            });
        }

        if let Some(lowest) = self.lowest_discernible_value {
            if lowest < 1 {
                return Err(ConfigError::InvalidLowestDiscernibleValue { value: lowest });
            }
            if self.highest_trackable_value.is_none() {
                return Err(ConfigError::MissingHighestTrackableValue { lowest });
            }
        }

        if let Some(highest) = self.highest_trackable_value {
            let lowest = self.lowest_discernible_value.unwrap_or(1);
            if highest < lowest.saturating_mul(2) {
                return Err(ConfigError::InvalidHighestTrackableValue {
                    highest,
                    lowest: lowest.saturating_mul(2),
                });
            }
        }

        if let Some(percentiles) = &self.percentiles {
            if percentiles.is_empty() {
                return Err(ConfigError::EmptyPercentiles);
            }
            if let Some(&value) = percentiles
                .iter()
                .find(|value| !(0.0..=1.0).contains(*value))
            {
                return Err(ConfigError::InvalidPercentile { value });
            }
        }

        Ok(())
    }
}

impl Validate for TopConfig {
    fn validate(&self) -> Result<()> {
        self.reset.reject_decaying("tops")?;
        self.reset.validate()?;

        if self.size == 0 || self.size > MAX_TOP_SIZE {
            return Err(ConfigError::InvalidTopSize {
                size: self.size,
                max: MAX_TOP_SIZE,
            });
        }

        if self.max_description_length < MIN_DESCRIPTION_LENGTH {
            return Err(ConfigError::DescriptionTooShort {
                length: self.max_description_length,
                min: MIN_DESCRIPTION_LENGTH,
            });
        }

        Ok(())
    }
}

impl Validate for HitRatioConfig {
    fn validate(&self) -> Result<()> {
        self.reset.validate()
    }
}

/// Parses and validates a configuration from TOML text.
pub fn from_toml_str<T: DeserializeOwned + Validate>(content: &str) -> Result<T> {
    let config: T = toml::from_str(content).map_err(|e| ConfigError::InvalidFormat {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Reads, parses and validates a configuration file.
pub fn load_from_file<T: DeserializeOwned + Validate>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn by_chunks(window_secs: u64, chunks: usize) -> ResetPolicy {
        ResetPolicy::ByChunks {
            window: Duration::from_secs(window_secs),
            chunks,
            include_current_chunk: true,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        HistogramConfig::default().validate().unwrap();
        TopConfig::default().validate().unwrap();
        HitRatioConfig::default().validate().unwrap();
    }

    #[test]
    fn test_chunk_count_bounds() {
        assert!(by_chunks(60, 1).validate().is_ok());
        assert!(by_chunks(60, MAX_CHUNKS).validate().is_ok());
        assert!(matches!(
            by_chunks(60, 0).validate(),
            Err(ConfigError::InvalidChunkCount { chunks: 0, .. })
        ));
        assert!(matches!(
            by_chunks(60, MAX_CHUNKS + 1).validate(),
            Err(ConfigError::InvalidChunkCount { chunks: 26, .. })
        ));
    }

    #[test]
    fn test_chunk_duration_floor() {
        assert!(by_chunks(3, 3).validate().is_ok());
        assert!(matches!(
            by_chunks(2, 3).validate(),
            Err(ConfigError::ChunkTooShort { .. })
        ));
    }

    #[test]
    fn test_period_floor() {
        let policy = ResetPolicy::Periodically {
            period: Duration::from_millis(999),
        };
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::InvalidResetPeriod { .. })
        ));
    }

    #[test]
    fn test_decaying_policy_only_for_hit_ratio() {
        let reset = ResetPolicy::SmoothlyDecaying {
            window: Duration::from_secs(10),
            chunks: 5,
        };

        let histogram = HistogramConfig {
            reset,
            ..Default::default()
        };
        assert!(matches!(
            histogram.validate(),
            Err(ConfigError::UnsupportedPolicy { policy: "smoothly_decaying", .. })
        ));

        let top = TopConfig {
            reset,
            ..Default::default()
        };
        assert!(top.validate().is_err());

        let ratio = HitRatioConfig {
            reset,
            ..Default::default()
        };
        assert!(ratio.validate().is_ok());
    }

    #[test]
    fn test_histogram_ranges() {
        let config = HistogramConfig {
            significant_digits: 6,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSignificantDigits { digits: 6, max: 5 })
        ));

        let config = HistogramConfig {
            lowest_discernible_value: Some(0),
            highest_trackable_value: Some(100),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLowestDiscernibleValue { value: 0 })
        ));

        let config = HistogramConfig {
            lowest_discernible_value: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingHighestTrackableValue { lowest: 10 })
        ));

        let config = HistogramConfig {
            lowest_discernible_value: Some(10),
            highest_trackable_value: Some(19),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHighestTrackableValue { highest: 19, lowest: 20 })
        ));

        let config = HistogramConfig {
            highest_trackable_value: Some(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_percentiles() {
        let config = HistogramConfig {
            percentiles: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyPercentiles)));

        let config = HistogramConfig {
            percentiles: Some(vec![0.5, 1.5]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPercentile { value }) if value == 1.5
        ));

        let config = HistogramConfig {
            percentiles: Some(vec![0.0, 0.5, 0.99, 1.0]),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_top_limits() {
        for size in [0, MAX_TOP_SIZE + 1] {
            let config = TopConfig {
                size,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidTopSize { .. })
            ));
        }

        let config = TopConfig {
            max_description_length: 9,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DescriptionTooShort { length: 9, min: 10 })
        ));
    }

    #[test]
    fn test_from_toml_str() {
        let config: TopConfig = from_toml_str(
            r#"
            size = 5
            max_description_length = 200

            [reset]
            type = "by_chunks"
            window = { secs = 60, nanos = 0 }
            chunks = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.size, 5);
        assert_eq!(config.max_description_length, 200);
        assert_eq!(config.reset, by_chunks(60, 3));
        assert_eq!(config.snapshot_caching, Duration::from_secs(1));
    }

    #[test]
    fn test_from_toml_str_validates() {
        let result: Result<TopConfig> = from_toml_str("size = 0");
        assert!(matches!(result, Err(ConfigError::InvalidTopSize { .. })));

        let result: Result<TopConfig> = from_toml_str("size = \"ten\"");
        assert!(matches!(result, Err(ConfigError::InvalidFormat { .. })));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result: Result<HitRatioConfig> = load_from_file("/nonexistent/ratio.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

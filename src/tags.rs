//! Threshold tags attached to readings at read time. Never persisted.

use crate::reading::Measurements;

pub const HIGH_TEMPERATURE: &str = "high-temperature";
pub const LOW_TEMPERATURE: &str = "low-temperature";
pub const HIGH_CO2: &str = "high-co2";

/// Above this temperature (celsius) a reading is tagged `high-temperature`.
pub const HIGH_TEMPERATURE_C: f64 = 25.0;
/// Below this temperature (celsius) a reading is tagged `low-temperature`.
pub const LOW_TEMPERATURE_C: f64 = 18.0;
/// Above this CO2 concentration (ppm) a reading is tagged `high-co2`.
pub const HIGH_CO2_PPM: f64 = 1000.0;

/// Derive the ordered tag list for an already sanitized reading.
pub fn annotate(m: &Measurements) -> Vec<String> {
    let mut tags = Vec::new();

    if m.temp > HIGH_TEMPERATURE_C {
        tags.push(HIGH_TEMPERATURE.to_string());
    } else if m.temp < LOW_TEMPERATURE_C {
        tags.push(LOW_TEMPERATURE.to_string());
    }

    if m.co2 > HIGH_CO2_PPM {
        tags.push(HIGH_CO2.to_string());
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temp: f64, co2: f64) -> Measurements {
        Measurements {
            temp,
            co2,
            ..Measurements::default()
        }
    }

    #[test]
    fn comfortable_reading_has_no_tags() {
        assert!(annotate(&reading(22.5, 600.0)).is_empty());
    }

    #[test]
    fn thresholds_are_strict() {
        assert!(annotate(&reading(25.0, 1000.0)).is_empty());
        assert!(annotate(&reading(18.0, 0.0)).is_empty());
    }

    #[test]
    fn hot_and_stuffy() {
        assert_eq!(
            annotate(&reading(30.0, 1200.0)),
            vec![HIGH_TEMPERATURE, HIGH_CO2]
        );
    }

    #[test]
    fn cold_reading() {
        assert_eq!(annotate(&reading(12.0, 400.0)), vec![LOW_TEMPERATURE]);
    }

    #[test]
    fn zeroed_reading_counts_as_cold() {
        // a sanitized NaN temperature reads as 0.0
        assert_eq!(annotate(&Measurements::default()), vec![LOW_TEMPERATURE]);
    }

    #[test]
    fn deterministic_and_never_both_temperatures() {
        for t in [-10.0, 0.0, 17.9, 18.0, 21.0, 25.0, 25.1, 40.0] {
            for c in [0.0, 1000.0, 1000.1, 5000.0] {
                let m = reading(t, c);
                let first = annotate(&m);
                assert_eq!(first, annotate(&m));
                assert!(
                    !(first.iter().any(|t| t == HIGH_TEMPERATURE)
                        && first.iter().any(|t| t == LOW_TEMPERATURE))
                );
            }
        }
    }
}

use serde::{Deserialize, Serialize};

/// Flat first-period fee followed by a linear hourly rate, uncapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeeSchedule {
    /// Charged for any stay up to and including `base_minutes`
    pub base_fee: f64,
    pub base_minutes: f64,
    /// Per hour beyond `base_minutes`, prorated
    pub hourly_rate: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base_fee: 15.0,
            base_minutes: 60.0,
            hourly_rate: 10.0,
        }
    }
}

impl FeeSchedule {
    pub fn fee_for_minutes(&self, minutes: f64) -> f64 {
        let minutes = minutes.max(0.0);
        if minutes <= self.base_minutes {
            return self.base_fee;
        }
        let extra_hours = (minutes - self.base_minutes) / 60.0;
        self.base_fee + extra_hours * self.hourly_rate
    }
}

pub fn calculate_fee(minutes: f64) -> f64 {
    FeeSchedule::default().fee_for_minutes(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_rate_covers_first_hour() {
        assert_eq!(calculate_fee(0.0), 15.0);
        assert_eq!(calculate_fee(30.0), 15.0);
        assert_eq!(calculate_fee(60.0), 15.0);
    }

    #[test]
    fn linear_after_first_hour() {
        assert_eq!(calculate_fee(90.0), 20.0);
        assert_eq!(calculate_fee(120.0), 25.0);
        assert_eq!(calculate_fee(600.0), 105.0);
    }

    #[test]
    fn boundary_is_hard() {
        let just_over = calculate_fee(60.0001);
        assert!(just_over > 15.0);
        assert!(just_over < 15.001);
    }

    #[test]
    fn negative_duration_clamps_to_flat_rate() {
        assert_eq!(calculate_fee(-5.0), 15.0);
    }

    #[test]
    fn monotonic_in_duration() {
        let mut previous = calculate_fee(0.0);
        for step in 1..=2_000 {
            let fee = calculate_fee(step as f64 * 0.75);
            assert!(fee >= previous, "fee dropped at {step}");
            previous = fee;
        }
    }

    #[test]
    fn custom_schedule() {
        let schedule = FeeSchedule {
            base_fee: 5.0,
            base_minutes: 30.0,
            hourly_rate: 4.0,
        };
        assert_eq!(schedule.fee_for_minutes(30.0), 5.0);
        assert_eq!(schedule.fee_for_minutes(60.0), 7.0);
    }
}

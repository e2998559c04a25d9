#[cfg(not(miri))] // Skip property tests under miri as they're too slow
use std::sync::Arc;

#[cfg(not(miri))]
use async_trait::async_trait;
#[cfg(not(miri))]
use proptest::prelude::*;
#[cfg(not(miri))]
use weather_station::io::{DirectionSensor, PulseCounter};
#[cfg(not(miri))]
use weather_station::{
    Anemometer, AnemometerSettings, CascadeBuilder, RingStatBuffer, Statistic,
};

#[cfg(not(miri))]
struct IdleCounter;

#[cfg(not(miri))]
#[async_trait]
impl PulseCounter for IdleCounter {
    async fn read_count(&self) -> weather_station::Result<u32> {
        Ok(0)
    }
}

#[cfg(not(miri))]
struct IdleVane;

#[cfg(not(miri))]
#[async_trait]
impl DirectionSensor for IdleVane {
    async fn read_volts(&self) -> weather_station::Result<f64> {
        Ok(4.6)
    }
}

#[cfg(not(miri))]
fn small_anemometer() -> Anemometer {
    let settings = AnemometerSettings {
        samples_per_second: 4,
        speed_window_seconds: 30,
        gust_window_seconds: 60,
        direction_window_seconds: 30,
        gust_width_seconds: 3,
        mph_per_tick: 1.429,
        gust_ceiling_mph: 120.0,
    };
    Anemometer::new(settings, Arc::new(IdleCounter), Arc::new(IdleVane))
}

#[cfg(not(miri))]
fn expected(values: &[f64]) -> (f64, f64, f64) {
    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::MAX, f64::min);
    let max = values.iter().copied().fold(0.0, f64::max);
    (sum, min, max)
}

#[cfg(not(miri))]
proptest! {
    #[test]
    fn test_full_buffer_stats_cover_last_size_values(
        size in 1usize..64,
        values in prop::collection::vec(0.0f64..1000.0, 64..200),
    ) {
        let buffer = RingStatBuffer::new(size);
        for v in &values {
            buffer.add_item(*v);
        }

        let window = &values[values.len() - size..];
        let (sum, min, max) = expected(window);
        let stats = buffer.average_min_max_sum();

        prop_assert!((stats.sum - sum).abs() < 1e-6);
        prop_assert!((stats.average - sum / size as f64).abs() < 1e-9);
        prop_assert_eq!(stats.minimum, min);
        prop_assert_eq!(stats.maximum, max);
    }

    #[test]
    fn test_windowed_stats_match_most_recent_values(
        size in 1usize..64,
        values in prop::collection::vec(0.0f64..1000.0, 64..200),
        count in 1usize..64,
    ) {
        let buffer = RingStatBuffer::new(size);
        for v in &values {
            buffer.add_item(*v);
        }

        let count = count.min(size);
        let window = &values[values.len() - count..];
        let (sum, min, max) = expected(window);
        let stats = buffer.sum_min_max_last(count);

        prop_assert!((stats.sum - sum).abs() < 1e-6);
        prop_assert_eq!(stats.minimum, min);
        prop_assert_eq!(stats.maximum, max);
        prop_assert!((buffer.average_last(count) - sum / count as f64).abs() < 1e-9);
        prop_assert_eq!(buffer.last(), values[values.len() - 1]);
    }

    #[test]
    fn test_oversized_window_is_clamped(
        size in 1usize..32,
        values in prop::collection::vec(0.0f64..100.0, 32..64),
        extra in 1usize..100,
    ) {
        let buffer = RingStatBuffer::new(size);
        for v in &values {
            buffer.add_item(*v);
        }
        let clamped = buffer.sum_min_max_last(size + extra);
        let full = buffer.average_min_max_sum();
        prop_assert!((clamped.sum - full.sum).abs() < 1e-6);
        prop_assert_eq!(clamped.minimum, full.minimum);
        prop_assert_eq!(clamped.maximum, full.maximum);
    }

    #[test]
    fn test_cascade_sum_tier_totals_each_window(
        size in 1usize..16,
        windows in 1usize..8,
        values in prop::collection::vec(0.0f64..50.0, 128),
    ) {
        let mut builder = CascadeBuilder::new();
        let root = builder.tier("root", size);
        let totals = builder.tier("totals", 8);
        builder.feed(root, Statistic::Sum, totals);
        let buffer = RingStatBuffer::from_cascade(builder.build(root).unwrap());

        let written = &values[..size * windows];
        for v in written {
            buffer.add_item(*v);
        }

        let last_window: f64 = written[written.len() - size..].iter().sum();
        let rolled = buffer.tier_last(totals).unwrap();
        prop_assert!((rolled - last_window).abs() < 1e-6);
    }

    #[test]
    fn test_gust_never_below_mean_speed(
        pulses in prop::collection::vec(0u32..=20, 1..400),
    ) {
        let wind = small_anemometer();
        for p in &pulses {
            wind.record(*p, Some(270.0));
        }
        prop_assert!(wind.gust() + 1e-9 >= wind.speed());
    }
}

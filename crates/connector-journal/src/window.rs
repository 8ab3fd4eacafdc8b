use std::time::Duration;

use connector_counter_series::{CounterSeries, CounterSeriesConfig};
use parking_lot::Mutex;

/// Per-bucket statistics tracked at each of the three granularities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestBucket {
    pub request_count: u64,
    pub failure_count: u64,
    pub total_duration_millis: u64,
    pub max_duration_millis: u64,
    pub bytes_produced: u64,
    pub saw_appliance: bool,
}

impl RequestBucket {
    fn record(&mut self, failed: bool, duration: Duration, bytes: u64, from_appliance: bool) {
        self.request_count += 1;
        if failed {
            self.failure_count += 1;
        }
        let millis = duration.as_millis() as u64;
        self.total_duration_millis += millis;
        self.max_duration_millis = self.max_duration_millis.max(millis);
        self.bytes_produced += bytes;
        self.saw_appliance |= from_appliance;
    }
}

/// One of the three fixed granularities required by the operational
/// journal: seconds, minutes, and half-hours.
pub struct RequestWindows {
    seconds: Mutex<CounterSeries<RequestBucket>>,
    minutes: Mutex<CounterSeries<RequestBucket>>,
    half_hours: Mutex<CounterSeries<RequestBucket>>,
}

pub struct WindowSizes {
    pub second_buckets: u8,
    pub minute_buckets: u8,
    pub half_hour_buckets: u8,
}

impl Default for WindowSizes {
    fn default() -> Self {
        Self {
            second_buckets: 60,
            minute_buckets: 60,
            half_hour_buckets: 48,
        }
    }
}

impl RequestWindows {
    pub fn new(sizes: WindowSizes) -> Self {
        Self {
            seconds: Mutex::new(CounterSeries::with_config(CounterSeriesConfig {
                num_buckets: sizes.second_buckets,
                bucket_size: 1,
            })),
            minutes: Mutex::new(CounterSeries::with_config(CounterSeriesConfig {
                num_buckets: sizes.minute_buckets,
                bucket_size: 60,
            })),
            half_hours: Mutex::new(CounterSeries::with_config(CounterSeriesConfig {
                num_buckets: sizes.half_hour_buckets,
                bucket_size: 30 * 60,
            })),
        }
    }

    pub fn record(&self, failed: bool, duration: Duration, bytes: u64, from_appliance: bool) {
        let update = |bucket: &mut RequestBucket| bucket.record(failed, duration, bytes, from_appliance);
        self.seconds.lock().update_current(update);
        self.minutes.lock().update_current(update);
        self.half_hours.lock().update_current(update);
    }

    pub fn sum_seconds(&self) -> RequestBucket {
        self.seconds.lock().fold(RequestBucket::default(), merge)
    }

    pub fn sum_minutes(&self) -> RequestBucket {
        self.minutes.lock().fold(RequestBucket::default(), merge)
    }

    pub fn sum_half_hours(&self) -> RequestBucket {
        self.half_hours.lock().fold(RequestBucket::default(), merge)
    }
}

fn merge(mut acc: RequestBucket, b: &RequestBucket) -> RequestBucket {
    acc.request_count += b.request_count;
    acc.failure_count += b.failure_count;
    acc.total_duration_millis += b.total_duration_millis;
    acc.max_duration_millis = acc.max_duration_millis.max(b.max_duration_millis);
    acc.bytes_produced += b.bytes_produced;
    acc.saw_appliance |= b.saw_appliance;
    acc
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn records_accumulate_within_a_bucket() {
        tokio::time::pause();
        let windows = RequestWindows::new(WindowSizes {
            second_buckets: 5,
            minute_buckets: 5,
            half_hour_buckets: 5,
        });

        windows.record(false, Duration::from_millis(10), 100, true);
        windows.record(true, Duration::from_millis(50), 200, false);

        let seconds = windows.sum_seconds();
        assert_eq!(seconds.request_count, 2);
        assert_eq!(seconds.failure_count, 1);
        assert_eq!(seconds.total_duration_millis, 60);
        assert_eq!(seconds.max_duration_millis, 50);
        assert_eq!(seconds.bytes_produced, 300);
        assert!(seconds.saw_appliance);
    }

    #[tokio::test]
    async fn idle_buckets_reset_on_rotation() {
        tokio::time::pause();
        let windows = RequestWindows::new(WindowSizes {
            second_buckets: 3,
            minute_buckets: 3,
            half_hour_buckets: 3,
        });

        windows.record(false, Duration::from_millis(1), 1, true);
        tokio::time::advance(Duration::from_secs(10)).await;
        windows.record(false, Duration::from_millis(1), 1, true);

        // every bucket but the current one should have rotated away
        let seconds = windows.sum_seconds();
        assert_eq!(seconds.request_count, 1);
    }
}

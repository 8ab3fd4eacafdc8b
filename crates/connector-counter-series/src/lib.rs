use tokio::time::{Duration, Instant};

pub struct CounterSeriesConfig {
    /// How many buckets should be maintained.
    pub num_buckets: u8,
    /// How long a time interval each bucket represents, in seconds.
    pub bucket_size: u64,
}

/// A time series stored in a fixed number of equal-duration buckets,
/// generic over the per-bucket value type.
///
/// The buckets are a ring buffer held in memory. Only the bucket
/// representing the current point in time can be mutated. As time
/// elapses, the current bucket advances and buckets for any skipped
/// interval are reset to `T::default()`. No background maintenance task
/// is required: book keeping happens lazily, fixing up the ring prior
/// to every access.
pub struct CounterSeries<T> {
    buckets: Vec<T>,
    bucket_size: u64,
    curr_bucket: u8,
    updated: Instant,
}

impl<T: Default + Clone> CounterSeries<T> {
    pub fn with_config(config: CounterSeriesConfig) -> Self {
        Self {
            buckets: vec![T::default(); config.num_buckets as usize],
            bucket_size: config.bucket_size,
            curr_bucket: 0,
            updated: Instant::now(),
        }
    }

    /// Figure out how many bucket slots to advance since the prior
    /// operation and zero them out. Clipped to the number of buckets so
    /// that an idle series doesn't pay for excess iterations.
    fn rotate_and_get_current_bucket(&mut self) -> usize {
        let num_buckets = self.buckets.len() as u64;
        let elapsed_seconds = self.updated.elapsed().as_secs();
        let elapsed_slots = elapsed_seconds / self.bucket_size;

        if elapsed_slots > 0 {
            let num_prune = elapsed_slots.min(num_buckets) as isize;
            self.curr_bucket = ((elapsed_slots + self.curr_bucket as u64) % num_buckets) as u8;
            self.updated = Instant::now();

            for prune in 0..num_prune {
                let mut idx = (self.curr_bucket as isize) - prune;
                if idx < 0 {
                    idx = num_buckets as isize + idx;
                }
                self.buckets[idx as usize] = T::default();
            }
        }

        self.curr_bucket as usize
    }

    /// Mutate the bucket for the current time window.
    pub fn update_current(&mut self, f: impl FnOnce(&mut T)) {
        let idx = self.rotate_and_get_current_bucket();
        f(&mut self.buckets[idx]);
    }

    /// Read the bucket for the current time window.
    pub fn current(&mut self) -> &T {
        let idx = self.rotate_and_get_current_bucket();
        &self.buckets[idx]
    }

    /// Fold over every bucket in the series, oldest conceptual order
    /// aside (buckets are not ordered chronologically beyond the ring),
    /// after rotating stale ones away.
    pub fn fold<A>(&mut self, init: A, mut f: impl FnMut(A, &T) -> A) -> A {
        self.rotate_and_get_current_bucket();
        self.buckets.iter().fold(init, |acc, b| f(acc, b))
    }

    /// Fold over the buckets covering the most recent `duration`,
    /// rounding up to the next whole bucket for spans smaller than the
    /// bucket size.
    pub fn fold_over<A>(&mut self, duration: Duration, init: A, mut f: impl FnMut(A, &T) -> A) -> A {
        let idx = self.rotate_and_get_current_bucket() as isize;
        let buckets_to_fold = (duration.as_secs().div_ceil(self.bucket_size))
            .min(self.buckets.len() as u64)
            .max(1) as isize;

        let mut acc = init;
        for i in 0..buckets_to_fold {
            let mut i = idx - i;
            if i < 0 {
                i = self.buckets.len() as isize + i;
            }
            acc = f(acc, &self.buckets[i as usize]);
        }
        acc
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Counter(u64);

    fn snapshot<T: Clone>(series: &CounterSeries<T>) -> (Vec<T>, u8, Duration) {
        (series.buckets.clone(), series.curr_bucket, series.updated.elapsed())
    }

    #[tokio::test]
    async fn increments_within_one_bucket() {
        let mut series = CounterSeries::with_config(CounterSeriesConfig {
            num_buckets: 5,
            bucket_size: 2,
        });

        series.update_current(|c| c.0 += 3);
        series.update_current(|c| c.0 = c.0.saturating_sub(2));
        k9::assert_equal!(series.fold(0u64, |acc, c| acc + c.0), 1);

        series.update_current(|c| c.0 = 42);
        k9::assert_equal!(series.fold(0u64, |acc, c| acc + c.0), 42);
    }

    #[tokio::test]
    async fn test_rotation() {
        tokio::time::pause();

        let mut series: CounterSeries<Counter> = CounterSeries::with_config(CounterSeriesConfig {
            num_buckets: 5,
            bucket_size: 2,
        });

        let (buckets, curr, elapsed) = snapshot(&series);
        k9::assert_equal!(buckets, vec![Counter(0); 5]);
        k9::assert_equal!(curr, 0);
        k9::assert_equal!(elapsed, Duration::ZERO);

        series.update_current(|c| c.0 += 1);
        k9::assert_equal!(series.fold(0u64, |acc, c| acc + c.0), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        series.update_current(|c| c.0 += 1);
        let (buckets, curr, _) = snapshot(&series);
        k9::assert_equal!(buckets, vec![Counter(2), Counter(0), Counter(0), Counter(0), Counter(0)]);
        k9::assert_equal!(curr, 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        series.update_current(|c| c.0 += 1);
        let (buckets, curr, _) = snapshot(&series);
        k9::assert_equal!(buckets, vec![Counter(2), Counter(1), Counter(0), Counter(0), Counter(0)]);
        k9::assert_equal!(curr, 1);

        // skip the whole ring
        tokio::time::advance(Duration::from_secs(60)).await;
        series.update_current(|c| c.0 += 9);
        k9::assert_equal!(series.fold(0u64, |acc, c| acc + c.0), 9);
    }

    #[tokio::test]
    async fn fold_over_rounds_up_to_bucket_size() {
        tokio::time::pause();
        let mut series: CounterSeries<Counter> = CounterSeries::with_config(CounterSeriesConfig {
            num_buckets: 3,
            bucket_size: 10,
        });

        series.update_current(|c| c.0 += 1);
        tokio::time::advance(Duration::from_secs(10)).await;
        series.update_current(|c| c.0 += 2);

        k9::assert_equal!(series.fold_over(Duration::ZERO, 0u64, |acc, c| acc + c.0), 2);
        k9::assert_equal!(series.fold_over(Duration::from_secs(1), 0u64, |acc, c| acc + c.0), 2);
        k9::assert_equal!(series.fold_over(Duration::from_secs(11), 0u64, |acc, c| acc + c.0), 3);
    }
}

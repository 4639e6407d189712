use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Running total of payload bytes handed to the network, shared by every
/// in-flight transfer of a run.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedSample {
    pub bytes_per_sec: u64,
    pub label: String,
}

impl SpeedSample {
    pub fn from_delta(bytes: u64, elapsed: Duration) -> Self {
        let millis = elapsed.as_millis().max(1) as u64;
        let bytes_per_sec = bytes.saturating_mul(1000) / millis;
        Self {
            bytes_per_sec,
            label: format_speed(bytes_per_sec),
        }
    }
}

pub fn format_speed(bytes_per_sec: u64) -> String {
    format!(
        "{}/s",
        humansize::format_size(bytes_per_sec, humansize::BINARY)
    )
}

/// Samples `counter` every `interval` until `stop` fires. Observational only:
/// nothing here feeds back into scheduling.
pub fn spawn_sampler<F>(
    counter: ByteCounter,
    interval: Duration,
    stop: CancellationToken,
    on_sample: F,
) -> JoinHandle<()>
where
    F: Fn(SpeedSample) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut last_total = counter.total();
        let mut last_at = Instant::now();
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let total = counter.total();
                    let now = Instant::now();
                    let sample = SpeedSample::from_delta(total - last_total, now - last_at);
                    tracing::debug!(speed = %sample.label, "upload throughput");
                    on_sample(sample);
                    last_total = total;
                    last_at = now;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn sample_scales_delta_to_per_second() {
        let sample = SpeedSample::from_delta(1024 * 800, Duration::from_millis(800));
        assert_eq!(sample.bytes_per_sec, 1024 * 1000);
        assert!(sample.label.ends_with("KiB/s"));

        let idle = SpeedSample::from_delta(0, Duration::from_millis(800));
        assert_eq!(idle.bytes_per_sec, 0);
        assert!(idle.label.ends_with(" B/s"));
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let sample = SpeedSample::from_delta(10, Duration::ZERO);
        assert_eq!(sample.bytes_per_sec, 10_000);
    }

    #[tokio::test]
    async fn sampler_reports_until_stopped() {
        let counter = ByteCounter::default();
        let stop = CancellationToken::new();
        let samples = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&samples);

        let handle = spawn_sampler(
            counter.clone(),
            Duration::from_millis(20),
            stop.clone(),
            move |sample| sink.lock().unwrap().push(sample),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        counter.add(4096);
        tokio::time::sleep(Duration::from_millis(70)).await;
        stop.cancel();
        handle.await.unwrap();

        let samples = samples.lock().unwrap();
        assert!(!samples.is_empty());
        assert!(samples.iter().any(|sample| sample.bytes_per_sec > 0));
        assert_eq!(counter.total(), 4096);
    }
}

//! Real-time pacing transform
//!
//! Producers hand over audio in bursts; listeners must receive it at
//! playback speed. The throttle slices each input chunk into sub-chunks of at
//! most `chunk_size` bytes and releases them from a token bucket refilled at
//! `bytes_per_second` that holds at most one sub-chunk. Idle time therefore
//! never turns into a later burst: over any window `T` the output stays
//! within `T * bytes_per_second` plus one sub-chunk.

use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::StreamError;
use crate::stream::ChunkSink;

/// Byte-rate limiter for the live stream
pub struct Throttle {
    bytes_per_second: u64,
    chunk_size: usize,
    bytes_emitted: u64,
    /// Everything released so far is paid for up to this instant
    paid_until: Instant,
}

impl Throttle {
    /// Pace output at `bytes_per_second`, releasing at most `chunk_size`
    /// bytes at a time. Both values are clamped to at least one.
    pub fn new(bytes_per_second: u64, chunk_size: usize) -> Self {
        let mut throttle = Self {
            bytes_per_second: bytes_per_second.max(1),
            chunk_size: chunk_size.max(1),
            bytes_emitted: 0,
            paid_until: Instant::now(),
        };
        throttle.paid_until = throttle.credit_floor(Instant::now());
        throttle
    }

    /// Sub-chunks of a tenth of a second
    pub fn with_rate(bytes_per_second: u64) -> Self {
        Self::new(bytes_per_second, (bytes_per_second / 10) as usize)
    }

    /// Forward `chunk` to `sink` at the target rate
    ///
    /// Returns once every byte of `chunk` has been written, so the caller
    /// cannot hand over the next chunk early.
    pub async fn process<S>(&mut self, mut chunk: Bytes, sink: &mut S) -> Result<(), StreamError>
    where
        S: ChunkSink + ?Sized,
    {
        while !chunk.is_empty() {
            let piece = self.next_piece(&mut chunk);

            let ready_at = self.ready_at(piece.len(), Instant::now());
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
            // Timer lateness stays credited; only idle time beyond the
            // bucket's capacity is forfeited.
            self.paid_until = ready_at;

            self.bytes_emitted += piece.len() as u64;
            sink.write(piece)?;
        }
        Ok(())
    }

    fn next_piece(&self, chunk: &mut Bytes) -> Bytes {
        let len = chunk.len().min(self.chunk_size);
        chunk.split_to(len)
    }

    /// When `len` more bytes are covered by the bucket
    fn ready_at(&mut self, len: usize, now: Instant) -> Instant {
        let floor = self.credit_floor(now);
        if self.paid_until < floor {
            self.paid_until = floor;
        }
        self.paid_until + self.time_for(len)
    }

    /// Oldest payment point that still leaves at most one sub-chunk of credit
    fn credit_floor(&self, now: Instant) -> Instant {
        now.checked_sub(self.time_for(self.chunk_size))
            .unwrap_or(now)
    }

    fn time_for(&self, bytes: usize) -> Duration {
        let nanos = bytes as u128 * 1_000_000_000 / self.bytes_per_second as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total bytes released since creation
    pub fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every sub-chunk with its release time
    struct Recorder {
        started_at: Instant,
        emitted: Vec<(Duration, Bytes)>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                started_at: Instant::now(),
                emitted: Vec::new(),
            }
        }

        fn bytes(&self) -> Vec<u8> {
            self.emitted
                .iter()
                .flat_map(|(_, chunk)| chunk.iter().copied())
                .collect()
        }
    }

    impl ChunkSink for Recorder {
        fn write(&mut self, chunk: Bytes) -> Result<(), StreamError> {
            self.emitted.push((self.started_at.elapsed(), chunk));
            Ok(())
        }
    }

    struct Closed;

    impl ChunkSink for Closed {
        fn write(&mut self, _chunk: Bytes) -> Result<(), StreamError> {
            Err(StreamError::SinkClosed)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_paced_and_complete() {
        let rate = 1_000u64;
        let chunk = 100usize;
        let mut throttle = Throttle::new(rate, chunk);
        let mut sink = Recorder::new();

        let burst: Vec<u8> = (0..5_000u32).map(|i| (i % 251) as u8).collect();
        throttle
            .process(Bytes::from(burst.clone()), &mut sink)
            .await
            .unwrap();

        assert!(sink.emitted.iter().all(|(_, piece)| piece.len() <= chunk));
        assert_rate_bound(&sink, Duration::ZERO, rate, chunk);

        // No loss, no reordering.
        assert_eq!(sink.bytes(), burst);
        assert_eq!(throttle.bytes_emitted(), 5_000);

        // The whole burst is out by B / R.
        let (last_at, _) = sink.emitted.last().unwrap();
        assert!(*last_at <= Duration::from_secs(5));
        assert!(*last_at >= Duration::from_millis(4_800));
    }

    /// Every window from the first release stays within R * T + one sub-chunk
    fn assert_rate_bound(sink: &Recorder, from: Duration, rate: u64, chunk: usize) {
        let mut total = 0u64;
        for (at, piece) in sink.emitted.iter().filter(|(at, _)| *at >= from) {
            total += piece.len() as u64;
            let allowed = (*at - from).as_secs_f64() * rate as f64 + chunk as f64;
            assert!(total as f64 <= allowed + 1e-6, "{} bytes at {:?}", total, at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_input_passes_without_waiting() {
        let mut throttle = Throttle::new(1_000, 100);
        let mut sink = Recorder::new();

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let before = Instant::now();
            throttle
                .process(Bytes::from(vec![7u8; 100]), &mut sink)
                .await
                .unwrap();
            assert_eq!(before.elapsed(), Duration::ZERO);
        }
        assert_eq!(sink.emitted.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gap_earns_no_burst() {
        let rate = 1_000u64;
        let chunk = 100usize;
        let mut throttle = Throttle::new(rate, chunk);
        let mut sink = Recorder::new();

        throttle.process(Bytes::from(vec![1u8; 100]), &mut sink).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let resumed = sink.started_at.elapsed();
        throttle
            .process(Bytes::from(vec![2u8; 5_000]), &mut sink)
            .await
            .unwrap();

        let (last_at, _) = sink.emitted.last().unwrap();
        let window = *last_at - resumed;
        assert!(window >= Duration::from_millis(4_800), "burst took {:?}", window);
        assert!(window <= Duration::from_secs(5));
        assert_rate_bound(&sink, resumed, rate, chunk);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_gaps_do_not_accumulate() {
        let rate = 1_000u64;
        let chunk = 100usize;
        let mut throttle = Throttle::new(rate, chunk);
        let mut sink = Recorder::new();

        // A series of short tracks separated by backoff pauses.
        for _ in 0..10 {
            throttle.process(Bytes::from(vec![0u8; 300]), &mut sink).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let resumed = sink.started_at.elapsed();
        throttle
            .process(Bytes::from(vec![1u8; 1_000]), &mut sink)
            .await
            .unwrap();
        assert_rate_bound(&sink, resumed, rate, chunk);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_across_calls() {
        let mut throttle = Throttle::new(10_000, 3);
        let mut sink = Recorder::new();

        throttle.process(Bytes::from("abcdefg"), &mut sink).await.unwrap();
        throttle.process(Bytes::from("hij"), &mut sink).await.unwrap();

        let pieces: Vec<_> = sink.emitted.iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(
            pieces,
            vec![
                Bytes::from("abc"),
                Bytes::from("def"),
                Bytes::from("g"),
                Bytes::from("hij"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_error_is_surfaced() {
        let mut throttle = Throttle::with_rate(1_000);
        let result = throttle.process(Bytes::from("data"), &mut Closed).await;
        assert!(matches!(result, Err(StreamError::SinkClosed)));
    }

    #[test]
    fn test_rate_clamped() {
        let throttle = Throttle::new(0, 0);
        assert_eq!(throttle.bytes_per_second(), 1);
        assert_eq!(throttle.chunk_size(), 1);
        assert_eq!(Throttle::with_rate(25_088).chunk_size(), 2_508);
    }
}

//! Gapless playback scheduling: cursor arithmetic and live-handle tracking.
//!
//! Chunks arriving from the service must render back-to-back with neither gap
//! nor overlap. Each chunk's scheduled start is
//! `max(previous chunk's end, current device time)`; an interruption discards
//! every live handle and resets the cursor so the next chunk schedules
//! relative to the device clock again.

use std::collections::HashSet;

/// Identifies one scheduled chunk until it finishes playing.
pub type PlaybackHandle = u64;

/// Start/end times (seconds on the output device clock) assigned to a chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub start: f64,
    pub end: f64,
}

/// Playback cursor plus the set of handles still live on the device.
#[derive(Debug, Default)]
pub struct PlaybackSchedule {
    /// Where the next chunk begins, unless the device clock has passed it.
    cursor: f64,
    live: HashSet<PlaybackHandle>,
    next_handle: PlaybackHandle,
}

impl PlaybackSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a start/end slot to a chunk of `duration` seconds arriving at
    /// device time `now`, and register a live handle for it.
    pub fn schedule(&mut self, now: f64, duration: f64) -> (PlaybackHandle, Scheduled) {
        let start = self.cursor.max(now);
        let end = start + duration;
        self.cursor = end;

        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle);
        (handle, Scheduled { start, end })
    }

    /// Remove a handle that finished playing naturally.
    pub fn complete(&mut self, handle: PlaybackHandle) {
        self.live.remove(&handle);
    }

    /// Interruption or teardown: discard every live handle and reset the
    /// cursor. Returns the handles that were discarded.
    pub fn flush(&mut self) -> Vec<PlaybackHandle> {
        self.cursor = 0.0;
        self.live.drain().collect()
    }

    /// Number of chunks currently scheduled or playing.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Device time at which everything scheduled so far will have finished.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn chunks_schedule_back_to_back() {
        let mut schedule = PlaybackSchedule::new();
        // Three chunks arrive while the device clock crawls forward slowly:
        // each must start exactly where the previous one ends.
        let (_, first) = schedule.schedule(0.0, 0.5);
        let (_, second) = schedule.schedule(0.1, 0.25);
        let (_, third) = schedule.schedule(0.2, 1.0);

        assert_eq!(first.start, 0.0);
        assert_eq!(second.start, first.end);
        assert_eq!(third.start, second.end);
    }

    #[test]
    fn no_gap_no_overlap_for_many_chunks() {
        let mut schedule = PlaybackSchedule::new();
        let mut previous_end = 0.0;
        for i in 0..50 {
            let now = f64::from(i) * 0.01;
            let (_, slot) = schedule.schedule(now, 0.08);
            assert!(slot.start >= previous_end, "overlap at chunk {i}");
            // Gapless while the cursor stays ahead of the clock.
            if slot.start > now {
                assert_eq!(slot.start, previous_end, "gap at chunk {i}");
            }
            previous_end = slot.end;
        }
    }

    #[test]
    fn late_chunk_schedules_at_device_time() {
        let mut schedule = PlaybackSchedule::new();
        let (_, first) = schedule.schedule(0.0, 0.1);
        assert_eq!(first.end, 0.1);
        // The stream went quiet; next chunk arrives at t=5.0 and must not be
        // scheduled in the past.
        let (_, second) = schedule.schedule(5.0, 0.1);
        assert_eq!(second.start, 5.0);
    }

    #[test]
    fn cursor_is_monotonic_until_flush() {
        let mut schedule = PlaybackSchedule::new();
        let mut last = 0.0;
        for i in 0..10 {
            schedule.schedule(f64::from(i) * 0.5, 0.1);
            assert!(schedule.cursor() >= last);
            last = schedule.cursor();
        }
        schedule.flush();
        assert_eq!(schedule.cursor(), 0.0);
    }

    #[test]
    fn flush_empties_live_handles_atomically() {
        let mut schedule = PlaybackSchedule::new();
        for _ in 0..4 {
            schedule.schedule(0.0, 0.5);
        }
        assert_eq!(schedule.live_count(), 4);

        let discarded = schedule.flush();
        assert_eq!(discarded.len(), 4);
        assert_eq!(schedule.live_count(), 0);
    }

    #[test]
    fn natural_completion_removes_only_its_handle() {
        let mut schedule = PlaybackSchedule::new();
        let (first, _) = schedule.schedule(0.0, 0.5);
        let (_second, _) = schedule.schedule(0.0, 0.5);

        schedule.complete(first);
        assert_eq!(schedule.live_count(), 1);
    }

    #[test]
    fn scheduling_resumes_from_device_time_after_flush() {
        let mut schedule = PlaybackSchedule::new();
        schedule.schedule(0.0, 10.0);
        schedule.flush();

        // After barge-in the next chunk plays immediately, not after the
        // discarded ten seconds.
        let (_, slot) = schedule.schedule(2.0, 0.5);
        assert_eq!(slot.start, 2.0);
    }
}

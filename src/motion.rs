//! Bounded, time-ordered history of the grasped object's positions.

use std::collections::VecDeque;

use crate::facts::Location;

/// One position sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub time: f64,
    pub location: Location,
}

/// Rolling window of samples bounded both by count and by covered duration,
/// whichever is tighter. Samples are kept strictly increasing in time.
#[derive(Debug, Clone)]
pub struct MotionBuffer {
    samples: VecDeque<MotionSample>,
    capacity: usize,
    max_duration: f64,
}

impl MotionBuffer {
    pub fn new(capacity: usize, max_duration: f64) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            max_duration,
        }
    }

    /// Appends a sample and evicts the oldest ones past either bound.
    /// Returns `false` (and stores nothing) if `time` does not advance past
    /// the newest sample.
    pub fn push(&mut self, time: f64, location: Location) -> bool {
        if self.newest().is_some_and(|last| time <= last.time) {
            return false;
        }
        self.samples.push_back(MotionSample { time, location });

        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        while self.span() > self.max_duration {
            self.samples.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn newest(&self) -> Option<&MotionSample> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&MotionSample> {
        self.samples.front()
    }

    /// Time covered between the oldest and the newest sample.
    pub fn span(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }

    /// Drops every sample newer than `time`.
    pub fn truncate_after(&mut self, time: f64) {
        while self.newest().is_some_and(|s| s.time > time) {
            self.samples.pop_back();
        }
    }

    /// Newest to oldest, the order backtraces walk in.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &MotionSample> {
        self.samples.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(z: f32) -> Location {
        Location::new(0.0, 0.0, z)
    }

    #[test]
    fn count_bound_evicts_oldest() {
        let mut buf = MotionBuffer::new(4, 100.0);
        for i in 0..10 {
            buf.push(i as f64, at(i as f32));
        }
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.oldest().map(|s| s.time), Some(6.0));
        assert_eq!(buf.newest().map(|s| s.time), Some(9.0));
    }

    #[test]
    fn duration_bound_is_tighter_than_count() {
        let mut buf = MotionBuffer::new(256, 3.3);
        for i in 0..200 {
            buf.push(i as f64 * 0.05, at(0.0));
            assert!(buf.len() <= 256);
            assert!(buf.span() <= 3.3);
        }
        // 3.3s at 20Hz, give or take float rounding at the window edge.
        assert!((66..=67).contains(&buf.len()));
    }

    #[test]
    fn out_of_order_samples_are_rejected() {
        let mut buf = MotionBuffer::new(8, 10.0);
        assert!(buf.push(1.0, at(0.0)));
        assert!(!buf.push(1.0, at(1.0)));
        assert!(!buf.push(0.5, at(1.0)));
        assert_eq!(buf.len(), 1);

        let times: Vec<f64> = buf.iter_newest_first().map(|s| s.time).collect();
        assert_eq!(times, vec![1.0]);
    }

    #[test]
    fn truncate_after_keeps_samples_up_to_the_cut() {
        let mut buf = MotionBuffer::new(8, 10.0);
        for i in 0..6 {
            buf.push(f64::from(i) * 0.5, at(0.0));
        }
        buf.truncate_after(1.2);
        assert_eq!(buf.newest().map(|s| s.time), Some(1.0));
        assert_eq!(buf.len(), 3);

        buf.truncate_after(-1.0);
        assert!(buf.is_empty());
    }
}

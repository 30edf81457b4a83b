//! A minimal stand-in for the real audio frame type. The actual sample format, channel
//! layout and resampling live in the codecs/DSP layers this crate doesn't own; all the
//! scheduling machinery here needs is "a block of N samples that can be sliced."

use std::time::Duration;

/// A contiguous block of interleaved PCM samples that must be produced or consumed by some
/// wall-clock deadline. Ownership of the samples stays with the caller; the pipeline only
/// ever borrows a (sub-)slice of them for the duration of one `process_frame` call.
pub struct Frame<'a> {
    samples: &'a mut [f32],
}

impl<'a> Frame<'a> {
    pub fn new(samples: &'a mut [f32]) -> Self {
        Frame { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        self.samples
    }

    /// Borrows `[start, start + len)` as its own frame, the way `process_next_subframe_`
    /// carves a sub-frame out of the frame it was given.
    pub fn sub_frame(&mut self, start: usize, len: usize) -> Frame<'_> {
        Frame {
            samples: &mut self.samples[start..start + len],
        }
    }
}

/// Converts between sample counts and durations for a fixed sample rate and channel count.
/// Needed to turn `min_frame_length_between_tasks`-style `Duration` config into a sample
/// count comparable against a frame's length, and back again for `next_frame_deadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl SampleSpec {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        SampleSpec {
            sample_rate,
            channels,
        }
    }

    fn samples_per_second(&self) -> u128 {
        self.sample_rate as u128 * self.channels.max(1) as u128
    }

    /// Total (interleaved) sample count covering `duration`. `Duration::ZERO` maps to `0`,
    /// which callers use as "unbounded" the same way the original treats a zero config field.
    pub fn duration_to_samples(&self, duration: Duration) -> usize {
        ((duration.as_nanos() * self.samples_per_second()) / 1_000_000_000) as usize
    }

    pub fn samples_to_duration(&self, samples: usize) -> Duration {
        let per_sec = self.samples_per_second();
        if per_sec == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(((samples as u128 * 1_000_000_000) / per_sec) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_frame_borrows_the_right_slice() {
        let mut data = [0.0f32; 8];
        let mut frame = Frame::new(&mut data);
        {
            let mut sub = frame.sub_frame(2, 3);
            sub.samples_mut().fill(1.0);
        }
        assert_eq!(frame.samples(), &[0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn sample_conversions_round_trip_at_a_common_rate() {
        let spec = SampleSpec::new(48_000, 2);
        let samples = spec.duration_to_samples(Duration::from_millis(5));
        assert_eq!(samples, 480);
        assert_eq!(spec.samples_to_duration(480), Duration::from_millis(5));
    }

    #[test]
    fn zero_duration_means_zero_samples() {
        let spec = SampleSpec::new(48_000, 2);
        assert_eq!(spec.duration_to_samples(Duration::ZERO), 0);
    }
}

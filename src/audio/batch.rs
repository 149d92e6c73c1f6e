use anyhow::{bail, Result};
use std::collections::VecDeque;
use tracing::debug;

use super::backend::AudioFrame;

/// Batching window for one downstream consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    /// Samples per emitted batch
    pub window_samples: usize,
    /// Samples per incoming frame
    pub frame_size: usize,
}

impl BatchWindow {
    /// Build a window, rejecting sizes that frames cannot tile exactly
    pub fn new(window_samples: usize, frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            bail!("Frame size must be positive");
        }
        if window_samples == 0 || window_samples % frame_size != 0 {
            bail!(
                "Window of {} samples is not a positive multiple of the {}-sample frame",
                window_samples,
                frame_size
            );
        }

        Ok(Self {
            window_samples,
            frame_size,
        })
    }

    /// Frames needed to fill one batch
    pub fn frames_per_batch(&self) -> usize {
        self.window_samples / self.frame_size
    }
}

/// Consecutive frames concatenated to exactly one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBatch {
    /// Concatenated samples, in capture order
    pub samples: Vec<i16>,
    /// Sequence number of the first frame in the batch
    pub first_sequence: u64,
    /// Number of frames concatenated
    pub frame_count: usize,
}

impl AudioBatch {
    /// Raw little-endian PCM bytes
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Accumulates frames and hands out full windows
///
/// Frames are never reordered or split; leftovers stay queued for the next batch.
#[derive(Debug)]
pub struct ChunkBatcher {
    window: BatchWindow,
    queue: VecDeque<AudioFrame>,
}

impl ChunkBatcher {
    pub fn new(window: BatchWindow) -> Self {
        Self {
            window,
            queue: VecDeque::with_capacity(window.frames_per_batch() * 2),
        }
    }

    /// Append a frame to the queue
    pub fn push(&mut self, frame: AudioFrame) {
        debug_assert_eq!(frame.len(), self.window.frame_size);
        self.queue.push_back(frame);
    }

    /// Take one full batch if enough frames are queued
    pub fn try_take_batch(&mut self) -> Option<AudioBatch> {
        let needed = self.window.frames_per_batch();
        if self.queue.len() < needed {
            return None;
        }

        let mut samples = Vec::with_capacity(self.window.window_samples);
        let mut first_sequence = 0;

        for (i, frame) in self.queue.drain(..needed).enumerate() {
            if i == 0 {
                first_sequence = frame.sequence;
            }
            samples.extend_from_slice(&frame.samples);
        }

        Some(AudioBatch {
            samples,
            first_sequence,
            frame_count: needed,
        })
    }

    /// Drop every queued frame, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Keep only the newest `max_frames` frames, returning how many were dropped
    pub fn retain_newest(&mut self, max_frames: usize) -> usize {
        let excess = self.queue.len().saturating_sub(max_frames);
        if excess > 0 {
            self.queue.drain(..excess);
            debug!("Trimmed {} idle frames from batcher", excess);
        }
        excess
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_samples(&self) -> usize {
        self.queue.iter().map(|f| f.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(count: usize, size: usize) -> Vec<AudioFrame> {
        (0..count)
            .map(|i| AudioFrame {
                samples: (0..size).map(|j| (i * size + j) as i16).collect(),
                sample_rate: 16000,
                sequence: i as u64,
                timestamp_ms: i as u64 * 20,
            })
            .collect()
    }

    #[test]
    fn test_kws_window_single_batch() {
        let mut batcher = ChunkBatcher::new(BatchWindow::new(1600, 320).unwrap());
        let input = frames(5, 320);
        let expected: Vec<i16> = input.iter().flat_map(|f| f.samples.clone()).collect();

        let mut input = input.into_iter();
        for frame in input.by_ref().take(4) {
            batcher.push(frame);
            assert!(batcher.try_take_batch().is_none());
        }
        for frame in input {
            batcher.push(frame);
        }

        let batch = batcher.try_take_batch().expect("batch ready after 5 frames");
        assert_eq!(batch.samples.len(), 1600);
        assert_eq!(batch.samples, expected);
        assert_eq!(batch.first_sequence, 0);
        assert_eq!(batcher.queued_frames(), 0);
        assert!(batcher.try_take_batch().is_none());
    }

    #[test]
    fn test_asr_window_leaves_remainder() {
        let mut batcher = ChunkBatcher::new(BatchWindow::new(960, 320).unwrap());
        let mut batches = Vec::new();

        for frame in frames(7, 320) {
            batcher.push(frame);
            if let Some(batch) = batcher.try_take_batch() {
                batches.push(batch);
            }
        }

        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.samples.len() == 960));
        assert_eq!(batches[1].first_sequence, 3);
        assert_eq!(batcher.queued_frames(), 1);
        assert_eq!(batcher.queued_samples(), 320);
    }

    #[test]
    fn test_batches_preserve_order_without_loss() {
        let window = BatchWindow::new(960, 320).unwrap();
        let mut batcher = ChunkBatcher::new(window);
        let input = frames(31, 320);
        let pushed: Vec<i16> = input.iter().flat_map(|f| f.samples.clone()).collect();

        let mut emitted = Vec::new();
        for frame in input {
            batcher.push(frame);
            while let Some(batch) = batcher.try_take_batch() {
                assert_eq!(batch.samples.len(), window.window_samples);
                emitted.extend(batch.samples);
            }
        }

        let buffered = batcher.queued_samples();
        assert!(buffered < window.window_samples);
        assert_eq!(emitted.len() + buffered, pushed.len());
        assert_eq!(emitted[..], pushed[..emitted.len()]);
    }

    #[test]
    fn test_clear_and_retain() {
        let mut batcher = ChunkBatcher::new(BatchWindow::new(1600, 320).unwrap());
        for frame in frames(8, 320) {
            batcher.push(frame);
        }

        assert_eq!(batcher.retain_newest(3), 5);
        assert_eq!(batcher.queued_frames(), 3);
        assert_eq!(batcher.retain_newest(10), 0);

        assert_eq!(batcher.clear(), 3);
        assert_eq!(batcher.queued_frames(), 0);
    }

    #[test]
    fn test_window_validation() {
        assert!(BatchWindow::new(1000, 320).is_err());
        assert!(BatchWindow::new(0, 320).is_err());
        assert!(BatchWindow::new(960, 0).is_err());
        assert_eq!(BatchWindow::new(960, 320).unwrap().frames_per_batch(), 3);
    }

    #[test]
    fn test_batch_le_bytes() {
        let batch = AudioBatch {
            samples: vec![1, -2],
            first_sequence: 0,
            frame_count: 1,
        };
        assert_eq!(batch.to_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
    }
}

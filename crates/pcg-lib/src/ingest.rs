/// Averages blocks of raw capture frames into waveform samples.
///
/// A stethoscope sampled at 11025 Hz is far denser than the beat detector
/// needs; every `frames_per_sample` frames become one sample. Incomplete
/// blocks are carried over to the next [`push`](Self::push).
#[derive(Debug, Clone)]
pub struct BlockAverager {
    frames_per_sample: usize,
    negate: bool,
    pending: Vec<f64>,
}

impl BlockAverager {
    pub fn new(frames_per_sample: usize, negate: bool) -> Self {
        let frames_per_sample = frames_per_sample.max(1);
        Self {
            frames_per_sample,
            negate,
            pending: Vec::with_capacity(frames_per_sample),
        }
    }

    pub fn frames_per_sample(&self) -> usize {
        self.frames_per_sample
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn push(&mut self, frames: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity((self.pending.len() + frames.len()) / self.frames_per_sample);
        for &frame in frames {
            self.pending.push(frame);
            if self.pending.len() == self.frames_per_sample {
                let mean = self.pending.iter().sum::<f64>() / self.frames_per_sample as f64;
                out.push(if self.negate { -mean } else { mean });
                self.pending.clear();
            }
        }
        out
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_whole_blocks_and_keeps_remainder() {
        let mut avg = BlockAverager::new(4, false);
        let out = avg.push(&[1.0, 2.0, 3.0, 4.0, 10.0, 10.0]);
        assert_eq!(out, vec![2.5]);
        assert_eq!(avg.pending(), 2);
        let out = avg.push(&[20.0, 20.0, 1.0]);
        assert_eq!(out, vec![15.0]);
        assert_eq!(avg.pending(), 1);
    }

    #[test]
    fn negation_flips_sign() {
        let mut avg = BlockAverager::new(2, true);
        assert_eq!(avg.push(&[1.0, 3.0, -4.0, -6.0]), vec![-2.0, 5.0]);
    }

    #[test]
    fn single_frame_blocks_pass_through() {
        let mut avg = BlockAverager::new(0, false);
        assert_eq!(avg.frames_per_sample(), 1);
        assert_eq!(avg.push(&[0.5, -0.5]), vec![0.5, -0.5]);
    }
}

//! Host-block to inference-block adapter.
//!
//! Hosts may call `process` with any number of samples up to their maximum.
//! The model needs exactly the prepared block size every time, so audio is
//! queued per channel and released one full block at a time. The output side
//! is primed with one block of silence, which is the latency the plugin
//! reports.

use ringbuf::{Consumer, Producer, RingBuffer};

struct ChannelFifo {
    input_producer: Producer<f32>,
    input_consumer: Consumer<f32>,
    output_producer: Producer<f32>,
    output_consumer: Consumer<f32>,
}

impl ChannelFifo {
    fn new(block_size: usize) -> Self {
        let cap = block_size * 2;
        let (input_producer, input_consumer) = RingBuffer::<f32>::new(cap).split();
        let (output_producer, output_consumer) = RingBuffer::<f32>::new(cap).split();
        let mut fifo = Self {
            input_producer,
            input_consumer,
            output_producer,
            output_consumer,
        };
        fifo.prime(block_size);
        fifo
    }

    fn prime(&mut self, block_size: usize) {
        while self.input_consumer.pop().is_some() {}
        while self.output_consumer.pop().is_some() {}
        for _ in 0..block_size {
            let _ = self.output_producer.push(0.0);
        }
    }
}

pub struct FrameReblocker {
    block_size: usize,
    fifos: Vec<ChannelFifo>,
    work: Vec<Vec<f32>>,
}

impl FrameReblocker {
    pub fn new(channels: usize, block_size: usize) -> Self {
        Self {
            block_size,
            fifos: (0..channels).map(|_| ChannelFifo::new(block_size)).collect(),
            work: vec![vec![0.0; block_size]; channels],
        }
    }

    /// Samples of delay between input and output.
    pub fn latency(&self) -> usize {
        self.block_size
    }

    /// Drops queued audio and re-primes the output with silence.
    pub fn reset(&mut self) {
        for fifo in &mut self.fifos {
            fifo.prime(self.block_size);
        }
    }

    /// Feeds one host buffer through, calling `process` once for every full
    /// block that becomes available. The host buffer is overwritten with the
    /// delayed output.
    ///
    /// Channels beyond those the reblocker was built for are left untouched.
    pub fn process<C, F>(&mut self, channels: &mut [C], mut process: F)
    where
        C: AsMut<[f32]>,
        F: FnMut(&mut [Vec<f32>]),
    {
        if self.block_size == 0 {
            return;
        }
        let len = channels
            .iter_mut()
            .map(|c| c.as_mut().len())
            .min()
            .unwrap_or(0);

        let mut pos = 0;
        while pos < len {
            let queued = self.fifos.first().map_or(0, |f| f.input_producer.len());
            let take = (len - pos).min(self.block_size - queued);

            for (channel, fifo) in channels.iter_mut().zip(self.fifos.iter_mut()) {
                fifo.input_producer.push_slice(&channel.as_mut()[pos..pos + take]);
            }

            if queued + take == self.block_size {
                for (fifo, work) in self.fifos.iter_mut().zip(self.work.iter_mut()) {
                    fifo.input_consumer.pop_slice(work);
                }
                process(&mut self.work);
                for (fifo, work) in self.fifos.iter_mut().zip(self.work.iter()) {
                    fifo.output_producer.push_slice(work);
                }
            }

            for (channel, fifo) in channels.iter_mut().zip(self.fifos.iter_mut()) {
                fifo.output_consumer
                    .pop_slice(&mut channel.as_mut()[pos..pos + take]);
            }
            pos += take;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, offset: usize) -> Vec<f32> {
        (0..len).map(|i| (i + offset) as f32 + 1.0).collect()
    }

    #[test]
    fn test_identity_is_pure_delay() {
        let block = 64;
        let mut reblocker = FrameReblocker::new(2, block);
        let mut calls = 0;

        let mut out_l = Vec::new();
        let mut offset = 0;
        for chunk in [17, 64, 3, 100, 40, 32] {
            let mut l = ramp(chunk, offset);
            let mut r = ramp(chunk, offset);
            {
                let mut channels = [l.as_mut_slice(), r.as_mut_slice()];
                reblocker.process(&mut channels, |work| {
                    assert_eq!(work[0].len(), block);
                    calls += 1;
                });
            }
            assert_eq!(l, r);
            out_l.extend_from_slice(&l);
            offset += chunk;
        }

        // First block is priming silence, then the input reappears unchanged
        assert!(out_l[..block].iter().all(|v| *v == 0.0));
        for (i, v) in out_l[block..].iter().enumerate() {
            assert_eq!(*v, i as f32 + 1.0);
        }
        assert_eq!(calls, offset / block);
    }

    #[test]
    fn test_process_sees_full_blocks() {
        let block = 8;
        let mut reblocker = FrameReblocker::new(1, block);
        let mut seen = Vec::new();

        let mut data = ramp(20, 0);
        reblocker.process(&mut [data.as_mut_slice()], |work| {
            seen.push(work[0].clone());
        });

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ramp(8, 0));
        assert_eq!(seen[1], ramp(8, 8));
    }

    #[test]
    fn test_processing_is_applied() {
        let block = 4;
        let mut reblocker = FrameReblocker::new(1, block);

        let mut first = vec![1.0; block];
        reblocker.process(&mut [first.as_mut_slice()], |work| {
            for v in work[0].iter_mut() {
                *v *= 0.5;
            }
        });
        let mut second = vec![0.0; block];
        reblocker.process(&mut [second.as_mut_slice()], |_| {});

        assert_eq!(first, vec![0.0; block]);
        assert_eq!(second, vec![0.5; block]);
    }

    #[test]
    fn test_reset_drops_pending_audio() {
        let block = 4;
        let mut reblocker = FrameReblocker::new(1, block);

        let mut data = vec![1.0; 6];
        reblocker.process(&mut [data.as_mut_slice()], |_| {});
        reblocker.reset();

        let mut after = vec![0.0; block];
        reblocker.process(&mut [after.as_mut_slice()], |_| {});
        assert_eq!(after, vec![0.0; block]);
        assert_eq!(reblocker.latency(), block);
    }
}

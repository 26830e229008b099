//! Lock-free engine status shared between the audio thread and everything else.
//!
//! The audio thread never logs. Whatever goes wrong there is counted here and
//! read back from the host, editor or offline tool.

use crate::neural::ComputeDevice;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

#[derive(Default)]
pub struct EngineStatus {
    inference_failures: AtomicU32,
    state_reallocations: AtomicU32,
    contract_violations: AtomicU32,
    host_sample_rate: AtomicU32,
    sample_rate_mismatch: AtomicBool,
    accelerator_active: AtomicU8,
}

impl EngineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_reallocation(&self) {
        self.state_reallocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_contract_violation(&self) {
        self.contract_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Stores the host rate and flags whether it differs from the rate the
    /// model was trained at. Processing is unaffected either way.
    pub fn set_sample_rate(&self, host_rate: f32, model_rate: f32) {
        self.host_sample_rate
            .store(host_rate.to_bits(), Ordering::Relaxed);
        self.sample_rate_mismatch
            .store((host_rate - model_rate).abs() > 0.5, Ordering::Relaxed);
    }

    pub fn set_device(&self, device: ComputeDevice) {
        let v = match device {
            ComputeDevice::Cpu => 0,
            ComputeDevice::Accelerator => 1,
        };
        self.accelerator_active.store(v, Ordering::Relaxed);
    }

    pub fn inference_failures(&self) -> u32 {
        self.inference_failures.load(Ordering::Relaxed)
    }

    pub fn state_reallocations(&self) -> u32 {
        self.state_reallocations.load(Ordering::Relaxed)
    }

    pub fn contract_violations(&self) -> u32 {
        self.contract_violations.load(Ordering::Relaxed)
    }

    pub fn host_sample_rate(&self) -> f32 {
        f32::from_bits(self.host_sample_rate.load(Ordering::Relaxed))
    }

    pub fn sample_rate_mismatch(&self) -> bool {
        self.sample_rate_mismatch.load(Ordering::Relaxed)
    }

    pub fn device(&self) -> ComputeDevice {
        match self.accelerator_active.load(Ordering::Relaxed) {
            1 => ComputeDevice::Accelerator,
            _ => ComputeDevice::Cpu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let status = EngineStatus::new();
        status.record_inference_failure();
        status.record_inference_failure();
        status.record_state_reallocation();

        assert_eq!(status.inference_failures(), 2);
        assert_eq!(status.state_reallocations(), 1);
        assert_eq!(status.contract_violations(), 0);
    }

    #[test]
    fn test_sample_rate_mismatch_flag() {
        let status = EngineStatus::new();

        status.set_sample_rate(48000.0, 48000.0);
        assert!(!status.sample_rate_mismatch());

        status.set_sample_rate(44100.0, 48000.0);
        assert!(status.sample_rate_mismatch());
        assert!((status.host_sample_rate() - 44100.0).abs() < 1e-3);
    }

    #[test]
    fn test_device_round_trip() {
        let status = EngineStatus::new();
        assert_eq!(status.device(), ComputeDevice::Cpu);
        status.set_device(ComputeDevice::Accelerator);
        assert_eq!(status.device(), ComputeDevice::Accelerator);
    }
}

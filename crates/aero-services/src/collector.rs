//! Biometric sample collection
//!
//! `SampleCollector` subscribes to the sensor topics and appends decoded
//! samples to a window shared with the authentication service.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use core::cell::RefCell;

use aero_ipc::{topic, EegSample, HrvSample};
use aero_kernel_core::{DeliveryError, Subscriber};

/// Samples kept per sensor before the oldest is dropped
pub const DEFAULT_WINDOW_CAPACITY: usize = 32;

/// Rolling window of recent samples
#[derive(Clone, Debug)]
pub struct SampleWindow {
    hrv: VecDeque<HrvSample>,
    eeg: VecDeque<EegSample>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            hrv: VecDeque::with_capacity(capacity),
            eeg: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push_hrv(&mut self, sample: HrvSample) {
        if self.hrv.len() == self.capacity {
            self.hrv.pop_front();
        }
        self.hrv.push_back(sample);
    }

    pub fn push_eeg(&mut self, sample: EegSample) {
        if self.eeg.len() == self.capacity {
            self.eeg.pop_front();
        }
        self.eeg.push_back(sample);
    }

    pub fn hrv(&self) -> impl ExactSizeIterator<Item = &HrvSample> + '_ {
        self.hrv.iter()
    }

    pub fn eeg(&self) -> impl ExactSizeIterator<Item = &EegSample> + '_ {
        self.eeg.iter()
    }

    /// Mean heart rate and HRV score, if any HRV sample is held
    pub fn hrv_means(&self) -> Option<(f32, f32)> {
        if self.hrv.is_empty() {
            return None;
        }
        let n = self.hrv.len() as f32;
        let (hr, score) = self
            .hrv
            .iter()
            .fold((0.0f32, 0.0f32), |(hr, s), x| (hr + x.heart_rate, s + x.hrv_score));
        Some((hr / n, score / n))
    }

    pub fn clear(&mut self) {
        self.hrv.clear();
        self.eeg.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.hrv.is_empty() && self.eeg.is_empty()
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

/// Window shared between the collector and its service
pub type SharedWindow = Rc<RefCell<SampleWindow>>;

/// Subscriber feeding sensor topics into a `SampleWindow`
pub struct SampleCollector {
    window: SharedWindow,
}

impl SampleCollector {
    pub fn new(window: SharedWindow) -> Self {
        Self { window }
    }
}

impl Subscriber for SampleCollector {
    fn deliver(&mut self, name: &str, payload: &[u8]) -> Result<(), DeliveryError> {
        let mut window = self
            .window
            .try_borrow_mut()
            .map_err(|_| DeliveryError::Full)?;
        match name {
            topic::HEART_RATE => {
                let sample = HrvSample::decode(payload).map_err(|_| DeliveryError::Malformed)?;
                window.push_hrv(sample);
            }
            topic::EEG_DATA => {
                let sample = EegSample::decode(payload).map_err(|_| DeliveryError::Malformed)?;
                window.push_eeg(sample);
            }
            _ => return Err(DeliveryError::Malformed),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hrv(hr: f32, score: f32) -> HrvSample {
        HrvSample {
            timestamp: 0,
            heart_rate: hr,
            hrv_score: score,
            stress_level: 0.3,
        }
    }

    #[test]
    fn test_collector_routes_by_topic() {
        let window: SharedWindow = Rc::new(RefCell::new(SampleWindow::default()));
        let mut collector = SampleCollector::new(window.clone());
        collector
            .deliver(topic::HEART_RATE, &hrv(72.0, 0.8).encode())
            .unwrap();
        collector
            .deliver(topic::EEG_DATA, &EegSample::default().encode())
            .unwrap();
        assert_eq!(window.borrow().hrv().len(), 1);
        assert_eq!(window.borrow().eeg().len(), 1);
    }

    #[test]
    fn test_collector_rejects_malformed() {
        let window: SharedWindow = Rc::new(RefCell::new(SampleWindow::default()));
        let mut collector = SampleCollector::new(window.clone());
        assert_eq!(
            collector.deliver(topic::HEART_RATE, &[1, 2, 3]),
            Err(DeliveryError::Malformed)
        );
        assert_eq!(
            collector.deliver("other", &hrv(1.0, 1.0).encode()),
            Err(DeliveryError::Malformed)
        );
        assert!(window.borrow().is_empty());
    }

    #[test]
    fn test_window_drops_oldest() {
        let mut window = SampleWindow::new(2);
        window.push_hrv(hrv(60.0, 0.5));
        window.push_hrv(hrv(70.0, 0.7));
        window.push_hrv(hrv(80.0, 0.9));
        assert_eq!(window.hrv().len(), 2);
        let (hr, score) = window.hrv_means().unwrap();
        assert!((hr - 75.0).abs() < 1e-4);
        assert!((score - 0.8).abs() < 1e-4);
    }
}

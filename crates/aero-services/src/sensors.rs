//! Biometric sensor publishers
//!
//! Each publisher sleeps `period_ticks` (a bounded receive that is expected
//! to time out), takes a sample from its [`SampleSource`] and publishes it
//! on the sensor topic. Nobody listening is not an error: `UnknownTopic`
//! is ignored. A source that runs dry ends the process with status 0.
//!
//! | Publisher | Topic | Payload |
//! |-----------|-------|---------|
//! | `HrvPublisher` | `heart_rate` | `HrvSample` (16 bytes) |
//! | `EegPublisher` | `eeg_data` | `EegSample` (28 bytes) |

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::marker::PhantomData;

use aero_ipc::{topic, EegSample, HrvSample};
use aero_kernel::{Program, Resume, Syscalls};
use aero_kernel_core::{KernelError, Source};
use log::{trace, warn};

/// A sample type that has a home topic.
pub trait SensorSample: Copy {
    const TOPIC: &'static str;

    fn to_payload(&self) -> Vec<u8>;
}

impl SensorSample for HrvSample {
    const TOPIC: &'static str = topic::HEART_RATE;

    fn to_payload(&self) -> Vec<u8> {
        self.encode().to_vec()
    }
}

impl SensorSample for EegSample {
    const TOPIC: &'static str = topic::EEG_DATA;

    fn to_payload(&self) -> Vec<u8> {
        self.encode().to_vec()
    }
}

/// Where samples come from: a driver, a replay, a fixed reading.
pub trait SampleSource<T> {
    /// Next sample stamped with `timestamp`, or `None` when exhausted
    fn sample(&mut self, timestamp: u32) -> Option<T>;
}

/// Steady resting-state readings
#[derive(Clone, Copy, Debug, Default)]
pub struct Resting;

impl SampleSource<HrvSample> for Resting {
    fn sample(&mut self, timestamp: u32) -> Option<HrvSample> {
        Some(HrvSample {
            timestamp,
            heart_rate: 72.0,
            hrv_score: 0.8,
            stress_level: 0.3,
        })
    }
}

impl SampleSource<EegSample> for Resting {
    fn sample(&mut self, timestamp: u32) -> Option<EegSample> {
        Some(EegSample {
            timestamp,
            alpha: 0.6,
            beta: 0.4,
            theta: 0.2,
            delta: 0.1,
            focus_level: 0.7,
            relaxation_level: 0.8,
        })
    }
}

/// Replays a fixed list of samples, restamped on the way out.
#[derive(Clone, Debug)]
pub struct ScriptedSource<T> {
    samples: VecDeque<T>,
}

impl<T> ScriptedSource<T> {
    pub fn new(samples: impl IntoIterator<Item = T>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }
}

impl SampleSource<HrvSample> for ScriptedSource<HrvSample> {
    fn sample(&mut self, timestamp: u32) -> Option<HrvSample> {
        self.samples
            .pop_front()
            .map(|s| HrvSample { timestamp, ..s })
    }
}

impl SampleSource<EegSample> for ScriptedSource<EegSample> {
    fn sample(&mut self, timestamp: u32) -> Option<EegSample> {
        self.samples
            .pop_front()
            .map(|s| EegSample { timestamp, ..s })
    }
}

/// Periodic publisher program
pub struct SensorPublisher<T, S> {
    source: S,
    period_ticks: u64,
    published: u64,
    _sample: PhantomData<T>,
}

/// Heart-rate variability publisher
pub type HrvPublisher<S> = SensorPublisher<HrvSample, S>;
/// EEG publisher
pub type EegPublisher<S> = SensorPublisher<EegSample, S>;

impl<T: SensorSample, S: SampleSource<T>> SensorPublisher<T, S> {
    pub fn new(source: S, period_ticks: u64) -> Self {
        Self {
            source,
            period_ticks: period_ticks.max(1),
            published: 0,
            _sample: PhantomData,
        }
    }

    /// Samples handed to the bus so far
    pub fn published(&self) -> u64 {
        self.published
    }

    fn publish_next(&mut self, sys: &mut Syscalls<'_>) -> Resume {
        let Some(sample) = self.source.sample(sys.now() as u32) else {
            trace!(target: "sensor", "{} source exhausted", T::TOPIC);
            return Resume::Exit(0);
        };
        match sys.publish(T::TOPIC, &sample.to_payload()) {
            Ok(report) => {
                self.published += 1;
                trace!(
                    target: "sensor",
                    "{}: delivered {} failed {}",
                    T::TOPIC, report.delivered, report.failed
                );
            }
            Err(KernelError::UnknownTopic) => {
                self.published += 1;
            }
            Err(e) => warn!(target: "sensor", "publish on '{}' failed: {}", T::TOPIC, e),
        }
        Resume::Yield
    }
}

impl<T: SensorSample, S: SampleSource<T>> Program for SensorPublisher<T, S> {
    fn resume(&mut self, sys: &mut Syscalls<'_>) -> Resume {
        match sys.receive_with_timeout(Source::Any, self.period_ticks) {
            Ok(None) => Resume::Block,
            // Stray message; sleep again next slice
            Ok(Some(msg)) => {
                trace!(target: "sensor", "dropping tag 0x{:04x} from pid {}", msg.tag, msg.sender);
                Resume::Yield
            }
            Err(KernelError::Timeout) => self.publish_next(sys),
            Err(e) => {
                warn!(target: "sensor", "{} sleep failed: {}", T::TOPIC, e);
                Resume::Exit(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resting_hrv_values() {
        let s = SampleSource::<HrvSample>::sample(&mut Resting, 7).unwrap();
        assert_eq!(s.timestamp, 7);
        assert_eq!(s.heart_rate, 72.0);
        assert_eq!(s.hrv_score, 0.8);
        assert_eq!(s.stress_level, 0.3);
    }

    #[test]
    fn test_resting_eeg_values() {
        let s = SampleSource::<EegSample>::sample(&mut Resting, 3).unwrap();
        assert_eq!((s.alpha, s.beta, s.theta, s.delta), (0.6, 0.4, 0.2, 0.1));
        assert_eq!((s.focus_level, s.relaxation_level), (0.7, 0.8));
    }

    #[test]
    fn test_scripted_source_restamps_and_drains() {
        let mut src = ScriptedSource::new([HrvSample::default(), HrvSample::default()]);
        assert_eq!(src.sample(5).map(|s| s.timestamp), Some(5));
        assert_eq!(src.sample(9).map(|s| s.timestamp), Some(9));
        assert!(src.sample(10).is_none());
    }

    #[test]
    fn test_sample_topics() {
        assert_eq!(<HrvSample as SensorSample>::TOPIC, "heart_rate");
        assert_eq!(<EegSample as SensorSample>::TOPIC, "eeg_data");
        assert_eq!(HrvSample::default().to_payload().len(), aero_ipc::HRV_SAMPLE_SIZE);
    }
}

//! Biometric sample records published on the sensor topics.

use crate::wire::{read_f32, read_u32, require_exact, WireError};

/// Encoded size of an HRV sample.
pub const HRV_SAMPLE_SIZE: usize = 16;

/// Encoded size of an EEG sample.
pub const EEG_SAMPLE_SIZE: usize = 28;

/// Heart-rate-variability sample (topic `heart_rate`)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HrvSample {
    /// Tick count at capture
    pub timestamp: u32,
    /// Beats per minute
    pub heart_rate: f32,
    /// HRV score (RMSSD, ms)
    pub hrv_score: f32,
    /// Derived stress level, 0.0 to 1.0
    pub stress_level: f32,
}

impl HrvSample {
    /// Encode to the 16-byte wire record
    pub fn encode(&self) -> [u8; HRV_SAMPLE_SIZE] {
        let mut out = [0u8; HRV_SAMPLE_SIZE];
        out[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        out[4..8].copy_from_slice(&self.heart_rate.to_le_bytes());
        out[8..12].copy_from_slice(&self.hrv_score.to_le_bytes());
        out[12..16].copy_from_slice(&self.stress_level.to_le_bytes());
        out
    }

    /// Decode from the 16-byte wire record
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        require_exact(data, HRV_SAMPLE_SIZE)?;
        Ok(Self {
            timestamp: read_u32(data, 0),
            heart_rate: read_f32(data, 4),
            hrv_score: read_f32(data, 8),
            stress_level: read_f32(data, 12),
        })
    }
}

/// EEG band-power sample (topic `eeg_data`)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EegSample {
    /// Tick count at capture
    pub timestamp: u32,
    pub alpha: f32,
    pub beta: f32,
    pub theta: f32,
    pub delta: f32,
    /// Derived focus level, 0.0 to 1.0
    pub focus_level: f32,
    /// Derived relaxation level, 0.0 to 1.0
    pub relaxation_level: f32,
}

impl EegSample {
    /// Encode to the 28-byte wire record
    pub fn encode(&self) -> [u8; EEG_SAMPLE_SIZE] {
        let mut out = [0u8; EEG_SAMPLE_SIZE];
        out[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        let bands = [
            self.alpha,
            self.beta,
            self.theta,
            self.delta,
            self.focus_level,
            self.relaxation_level,
        ];
        for (i, v) in bands.iter().enumerate() {
            let at = 4 + i * 4;
            out[at..at + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Decode from the 28-byte wire record
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        require_exact(data, EEG_SAMPLE_SIZE)?;
        Ok(Self {
            timestamp: read_u32(data, 0),
            alpha: read_f32(data, 4),
            beta: read_f32(data, 8),
            theta: read_f32(data, 12),
            delta: read_f32(data, 16),
            focus_level: read_f32(data, 20),
            relaxation_level: read_f32(data, 24),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hrv_layout() {
        let sample = HrvSample {
            timestamp: 42,
            heart_rate: 72.0,
            hrv_score: 55.5,
            stress_level: 0.25,
        };
        let bytes = sample.encode();
        assert_eq!(&bytes[0..4], &42u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &72.0f32.to_le_bytes());
        assert_eq!(HrvSample::decode(&bytes).unwrap(), sample);
    }

    #[test]
    fn test_eeg_field_order() {
        let sample = EegSample {
            timestamp: 1,
            alpha: 1.0,
            beta: 2.0,
            theta: 3.0,
            delta: 4.0,
            focus_level: 0.5,
            relaxation_level: 0.75,
        };
        let bytes = sample.encode();
        assert_eq!(&bytes[16..20], &4.0f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &0.75f32.to_le_bytes());
        assert_eq!(EegSample::decode(&bytes).unwrap(), sample);
    }

    #[test]
    fn test_sample_size_checked() {
        assert!(matches!(
            HrvSample::decode(&[0u8; 12]),
            Err(WireError::TooShort { .. })
        ));
        assert!(matches!(
            EegSample::decode(&[0u8; 32]),
            Err(WireError::LengthMismatch { .. })
        ));
    }
}

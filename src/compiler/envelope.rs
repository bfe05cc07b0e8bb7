//! Volume envelope synthesis from ADSR parameters

use crate::error::{Error, Result};

/// Loudest level of the 2A03 volume register
pub const MAX_VOLUME: i32 = 15;

/// Longest attack, decay or release, in steps
pub const MAX_ADSR_STEPS: u32 = 255;

/// Split `total` into `steps` integer parts
///
/// Every part is `floor(total / steps)`; the last `total mod steps` parts get one
/// more so the parts sum to `total` exactly.
pub fn distribute(total: i32, steps: u32) -> Vec<i32> {
    let n = match i32::try_from(steps) {
        Ok(n) if n > 0 => n,
        _ => return Vec::new(),
    };
    let per_step = total.div_euclid(n);
    let remainder = total.rem_euclid(n);
    let increase_at = n - remainder;

    (0..n)
        .map(|i| if i < increase_at { per_step } else { per_step + 1 })
        .collect()
}

/// Attack/decay/sustain/release description of a volume envelope
///
/// Attack, decay and release are step counts; sustain is a volume level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adsr {
    pub attack: u32,
    pub decay: u32,
    pub sustain: i32,
    pub release: u32,
}

impl Adsr {
    /// Parse `attack decay sustain release`, separated by spaces or commas
    pub fn parse(value: &str) -> Result<Self> {
        let err = |message: &str| Error::Adsr {
            value: value.to_string(),
            message: message.to_string(),
        };

        let parts: Vec<&str> = value
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.len() != 4 {
            return Err(err("expected attack, decay, sustain and release"));
        }

        let mut nums = [0u32; 4];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| err("values must be non-negative integers"))?;
        }

        if nums[2] > MAX_VOLUME as u32 {
            return Err(err("sustain must be between 0 and 15"));
        }

        if [nums[0], nums[1], nums[3]].iter().any(|&n| n > MAX_ADSR_STEPS) {
            return Err(err("attack, decay and release must be at most 255"));
        }

        Ok(Self {
            attack: nums[0],
            decay: nums[1],
            sustain: nums[2] as i32,
            release: nums[3],
        })
    }

    /// Highest level reached at the end of the attack
    pub fn peak(&self) -> i32 {
        if self.decay == 0 {
            self.sustain
        } else {
            MAX_VOLUME
        }
    }

    pub fn levels(&self) -> Vec<i32> {
        let peak = self.peak();
        let mut levels = Vec::new();

        // attack: 0 up to peak, both ends included
        if self.attack <= 1 {
            levels.push(peak);
        } else {
            let mut level = 0;
            levels.push(level);
            for step in distribute(peak, self.attack - 1) {
                level += step;
                levels.push(level);
            }
        }

        let mut level = peak;
        for step in distribute(peak - self.sustain, self.decay) {
            level -= step;
            levels.push(level);
        }

        for step in distribute(self.sustain, self.release) {
            level -= step;
            levels.push(level);
        }

        levels
    }

    /// Volume macro body
    pub fn to_volume(&self) -> String {
        self.levels()
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribute_even() {
        assert_eq!(distribute(12, 4), vec![3, 3, 3, 3]);
    }

    #[test]
    fn test_distribute_remainder_goes_last() {
        assert_eq!(distribute(10, 4), vec![2, 2, 3, 3]);
        assert_eq!(distribute(10, 3), vec![3, 3, 4]);
    }

    #[test]
    fn test_distribute_negative() {
        let steps = distribute(-10, 4);
        assert_eq!(steps, vec![-3, -3, -2, -2]);
        assert_eq!(steps.iter().sum::<i32>(), -10);
    }

    #[test]
    fn test_distribute_zero_steps() {
        assert!(distribute(5, 0).is_empty());
        assert!(distribute(5, 3_000_000_000).is_empty());
    }

    #[test]
    fn test_adsr_without_decay() {
        let adsr = Adsr::parse("4 0 10 4").unwrap();
        assert_eq!(adsr.peak(), 10);
        let levels = adsr.levels();
        assert_eq!(&levels[..4], &[0, 3, 6, 10]);
        assert_eq!(&levels[4..], &[8, 6, 3, 0]);
        assert_eq!(adsr.to_volume(), "0 3 6 10 8 6 3 0");
    }

    #[test]
    fn test_adsr_with_decay() {
        let adsr = Adsr::parse("2, 4, 8, 2").unwrap();
        assert_eq!(adsr.peak(), MAX_VOLUME);
        assert_eq!(adsr.to_volume(), "0 15 14 12 10 8 4 0");
    }

    #[test]
    fn test_adsr_no_attack_starts_at_peak() {
        let adsr = Adsr::parse("0 0 12 3").unwrap();
        assert_eq!(adsr.levels(), vec![12, 8, 4, 0]);
    }

    #[test]
    fn test_adsr_invalid() {
        assert!(matches!(Adsr::parse("1 2 3"), Err(Error::Adsr { .. })));
        assert!(matches!(Adsr::parse("1 2 x 4"), Err(Error::Adsr { .. })));
        assert!(matches!(Adsr::parse("1 2 16 4"), Err(Error::Adsr { .. })));
        assert!(matches!(Adsr::parse("-1 2 3 4"), Err(Error::Adsr { .. })));
    }

    #[test]
    fn test_adsr_step_counts_are_bounded() {
        assert_eq!(Adsr::parse("255 255 8 255").unwrap().levels().len(), 255 + 255 + 255);
        assert!(matches!(Adsr::parse("256 0 8 4"), Err(Error::Adsr { .. })));
        assert!(matches!(Adsr::parse("4 0 8 3000000000"), Err(Error::Adsr { .. })));
        assert!(matches!(Adsr::parse("2000000000 0 8 4"), Err(Error::Adsr { .. })));
    }
}

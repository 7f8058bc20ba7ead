//! Heartbeat devices.

use super::{backdate, to_json, Device, DeviceMessage};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::Serialize;
use streamgen_core::Event;
use tracing::debug;

const DOWN_PROBABILITY: f64 = 0.1;
const LONG_DOWN_PROBABILITY: f64 = 0.01;
const DEGRADED_PROBABILITY: f64 = 0.6;
const LATE_PROBABILITY: f64 = 0.01;
const LATE_UP_PROBABILITY: f64 = 0.005;
const LONG_DOWN_SECS: i64 = 20 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Up,
    Down,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatMessage {
    #[serde(flatten)]
    pub device: DeviceMessage,
    pub status: Status,
}

impl Event for HeartbeatMessage {
    fn partition_key(&self) -> String {
        self.device.device_id.to_string()
    }

    fn to_bytes(&self) -> streamgen_core::Result<Vec<u8>> {
        to_json(self)
    }
}

/// Device reporting its status every cycle.
///
/// Low-quality devices go down more often. A device in a long outage stays
/// silent for 20 minutes after its last heartbeat.
#[derive(Debug)]
pub struct HeartbeatDevice {
    id: u32,
    quality: f64,
    down_probability: f64,
    long_down_probability: f64,
    last_up: Option<i64>,
    long_down: bool,
    debug: bool,
}

impl HeartbeatDevice {
    pub fn new(id: u32, quality: f64, std_dev: f64, debug: bool) -> Self {
        // ~14% of devices cross 1.5σ, ~0.3% cross 3σ
        let down_probability = if quality >= 1.5 * std_dev {
            DEGRADED_PROBABILITY
        } else {
            DOWN_PROBABILITY
        };
        let long_down_probability = if quality >= 3.0 * std_dev {
            DEGRADED_PROBABILITY
        } else {
            LONG_DOWN_PROBABILITY
        };

        Self {
            id,
            quality,
            down_probability,
            long_down_probability,
            last_up: None,
            long_down: false,
            debug,
        }
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn down_probability(&self) -> f64 {
        self.down_probability
    }

    pub fn long_down_probability(&self) -> f64 {
        self.long_down_probability
    }

    fn message(&self, time: i64, status: Status) -> Option<Box<dyn Event>> {
        Some(Box::new(HeartbeatMessage {
            device: DeviceMessage {
                device_id: self.id,
                time,
            },
            status,
        }))
    }
}

impl Device for HeartbeatDevice {
    fn generate(&mut self, now: i64, rng: &mut StdRng) -> Option<Box<dyn Event>> {
        let Some(last_up) = self.last_up else {
            if self.debug {
                debug!(device = self.id, "First heartbeat");
            }
            self.last_up = Some(now);
            return self.message(now, Status::Up);
        };

        if self.long_down {
            if now - last_up <= LONG_DOWN_SECS {
                if self.debug {
                    debug!(device = self.id, "Long down");
                }
                return None;
            }
            if self.debug {
                debug!(device = self.id, "Back from long down");
            }
            self.long_down = false;
            self.last_up = Some(now);
            return self.message(now, Status::Up);
        }

        self.last_up = Some(now);

        let chance: f64 = rng.gen();
        if chance < LATE_PROBABILITY {
            let status = if chance < LATE_UP_PROBABILITY {
                Status::Up
            } else {
                Status::Down
            };
            let time = backdate(now, rng);
            if self.debug {
                debug!(device = self.id, time, ?status, "Late heartbeat");
            }
            return self.message(time, status);
        }

        if rng.gen::<f64>() < self.down_probability {
            if self.debug {
                debug!(device = self.id, "Short down");
            }
            return self.message(now, Status::Down);
        }

        if rng.gen::<f64>() < self.long_down_probability {
            if self.debug {
                debug!(device = self.id, "Going long down");
            }
            self.long_down = true;
            return None;
        }

        self.message(now, Status::Up)
    }
}

/// Builds `count` heartbeat devices with half-normal quality scores.
pub fn build(count: usize, std_dev: f64, debug: bool, rng: &mut StdRng) -> Vec<HeartbeatDevice> {
    (0..count)
        .map(|i| {
            let z: f64 = rng.sample(StandardNormal);
            let device = HeartbeatDevice::new(i as u32, z.abs() * std_dev, std_dev, debug);
            if debug {
                debug!(device = i, quality = device.quality, "Created heartbeat device");
            }
            device
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn status_of(event: &dyn Event) -> serde_json::Value {
        serde_json::from_slice(&event.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_first_event_is_up() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut device = HeartbeatDevice::new(7, 0.0, 1.0, false);

        let event = device.generate(1000, &mut rng).unwrap();
        let json = status_of(event.as_ref());

        assert_eq!(json["device_id"], 7);
        assert_eq!(json["time"], 1000);
        assert_eq!(json["status"], "UP");
        assert_eq!(event.partition_key(), "7");
    }

    #[test]
    fn test_long_down_silent_for_twenty_minutes() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut device = HeartbeatDevice::new(1, 0.0, 1.0, false);
        device.last_up = Some(1000);
        device.long_down = true;

        assert!(device.generate(1000 + 600, &mut rng).is_none());
        assert!(device.generate(1000 + LONG_DOWN_SECS, &mut rng).is_none());

        let event = device.generate(1000 + LONG_DOWN_SECS + 1, &mut rng).unwrap();
        assert_eq!(status_of(event.as_ref())["status"], "UP");
        assert!(!device.long_down);
    }

    #[test]
    fn test_quality_thresholds() {
        let healthy = HeartbeatDevice::new(0, 0.5, 1.0, false);
        assert_eq!(healthy.down_probability(), DOWN_PROBABILITY);
        assert_eq!(healthy.long_down_probability(), LONG_DOWN_PROBABILITY);

        let flaky = HeartbeatDevice::new(0, 1.5, 1.0, false);
        assert_eq!(flaky.down_probability(), DEGRADED_PROBABILITY);
        assert_eq!(flaky.long_down_probability(), LONG_DOWN_PROBABILITY);

        let broken = HeartbeatDevice::new(0, 3.2, 1.0, false);
        assert_eq!(broken.long_down_probability(), DEGRADED_PROBABILITY);
    }

    #[test]
    fn test_status_mix() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut device = HeartbeatDevice::new(0, 0.0, 1.0, false);
        let mut up = 0;
        let mut down = 0;
        let mut now = 0;

        for _ in 0..10_000 {
            now += 60;
            match device.generate(now, &mut rng) {
                Some(event) => match status_of(event.as_ref())["status"].as_str() {
                    Some("UP") => up += 1,
                    _ => down += 1,
                },
                None => {}
            }
        }

        // roughly 10% short downs
        let ratio = down as f64 / (up + down) as f64;
        assert!(ratio > 0.05 && ratio < 0.2, "down ratio {}", ratio);
    }

    #[test]
    fn test_build_quality_is_non_negative() {
        let mut rng = StdRng::seed_from_u64(9);
        let devices = build(1000, 1.0, false, &mut rng);
        assert_eq!(devices.len(), 1000);
        assert!(devices.iter().all(|d| d.quality() >= 0.0));
        let degraded = devices
            .iter()
            .filter(|d| d.down_probability() == DEGRADED_PROBABILITY)
            .count();
        assert!(degraded > 50 && degraded < 250, "degraded {}", degraded);
    }
}

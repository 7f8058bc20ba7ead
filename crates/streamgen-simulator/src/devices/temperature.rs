//! Temperature sensors, healthy and flaky.

use super::{backdate, lorem, to_json, Device, DeviceMessage};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::sync::Arc;
use streamgen_core::Event;
use tracing::debug;

const SPIKE_PROBABILITY: f32 = 0.03;
const LONG_SPIKE_PROBABILITY: f32 = 0.1;
const LATE_PROBABILITY: f32 = 0.01;
const READING_STD_DEV: f64 = 0.5;
const BREAK_PROBABILITY: f32 = 0.138;
const BROKEN_SECS: i64 = 6 * 60;

#[derive(Debug, Serialize)]
pub struct TemperatureMessage {
    #[serde(flatten)]
    pub device: DeviceMessage,
    pub device_name: String,
    pub temp: i64,
}

impl Event for TemperatureMessage {
    fn partition_key(&self) -> String {
        self.device.device_id.to_string()
    }

    fn to_bytes(&self) -> streamgen_core::Result<Vec<u8>> {
        to_json(self)
    }
}

/// Sensor reading close to its running mean, with occasional spikes.
///
/// A short spike jumps 6 to 10 degrees away from the mean for one reading.
/// A long spike drifts one degree further away on each of 5 to 9 readings.
#[derive(Debug)]
pub struct SpikeDevice {
    org_id: Arc<str>,
    id: u32,
    name: String,
    last: i64,
    sum: i64,
    count: u32,
    long_spike_steps: u32,
    debug: bool,
}

impl SpikeDevice {
    pub fn new(org_id: Arc<str>, id: u32, name: String, initial: i64, debug: bool) -> Self {
        Self {
            org_id,
            id,
            name,
            last: initial,
            sum: initial,
            count: 1,
            long_spike_steps: 0,
            debug,
        }
    }

    pub fn mean(&self) -> f64 {
        self.sum as f64 / self.count as f64
    }

    pub fn last(&self) -> i64 {
        self.last
    }

    pub fn in_long_spike(&self) -> bool {
        self.long_spike_steps > 0
    }

    fn next_reading(&mut self, rng: &mut StdRng) {
        let mean = self.mean();

        if self.long_spike_steps > 0 {
            if self.last as f64 > mean {
                self.last += 1;
            } else {
                self.last -= 1;
            }
            self.long_spike_steps -= 1;
            if self.debug {
                debug!(org = %self.org_id, device = self.id, mean, temp = self.last, steps_left = self.long_spike_steps, "Long spike");
            }
            return;
        }

        if rng.gen::<f32>() < SPIKE_PROBABILITY {
            let direction = if rng.gen::<f32>() >= 0.5 { -1 } else { 1 };
            if rng.gen::<f32>() < LONG_SPIKE_PROBABILITY {
                self.long_spike_steps = rng.gen_range(5..10);
                self.last += direction;
                if self.debug {
                    debug!(org = %self.org_id, device = self.id, direction, steps = self.long_spike_steps, "Entering long spike");
                }
            } else {
                self.last = mean as i64 + direction * rng.gen_range(6..11);
                if self.debug {
                    debug!(org = %self.org_id, device = self.id, mean, temp = self.last, "Short spike");
                }
            }
            return;
        }

        // sigma is a valid constant, so construction cannot fail
        let reading = Normal::new(mean, READING_STD_DEV)
            .map(|normal| normal.sample(rng))
            .unwrap_or(mean);
        self.last = reading.round() as i64;
        if self.debug {
            debug!(org = %self.org_id, device = self.id, mean, temp = self.last, "Normal reading");
        }
    }
}

impl Device for SpikeDevice {
    fn generate(&mut self, now: i64, rng: &mut StdRng) -> Option<Box<dyn Event>> {
        self.next_reading(rng);

        let time = if rng.gen::<f32>() < LATE_PROBABILITY {
            let time = backdate(now, rng);
            if self.debug {
                debug!(org = %self.org_id, device = self.id, time, "Late reading");
            }
            time
        } else {
            now
        };

        self.sum += self.last;
        self.count += 1;

        Some(Box::new(TemperatureMessage {
            device: DeviceMessage {
                device_id: self.id,
                time,
            },
            device_name: self.name.clone(),
            temp: self.last,
        }))
    }
}

/// A [`SpikeDevice`] that sometimes stops reporting for six minutes.
#[derive(Debug)]
pub struct BrokenDevice {
    inner: SpikeDevice,
    broken: bool,
    last_up: i64,
}

impl BrokenDevice {
    pub fn new(inner: SpikeDevice, now: i64) -> Self {
        Self {
            inner,
            broken: false,
            last_up: now,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl Device for BrokenDevice {
    fn generate(&mut self, now: i64, rng: &mut StdRng) -> Option<Box<dyn Event>> {
        let debug = self.inner.debug;

        if self.broken {
            if now - self.last_up < BROKEN_SECS {
                if debug {
                    debug!(org = %self.inner.org_id, device = self.inner.id, "Broken");
                }
                return None;
            }
            if debug {
                debug!(org = %self.inner.org_id, device = self.inner.id, "Restored");
            }
            self.broken = false;
            self.last_up = now;
            return self.inner.generate(now, rng);
        }

        if rng.gen::<f32>() < BREAK_PROBABILITY {
            if debug {
                debug!(org = %self.inner.org_id, device = self.inner.id, "Breaking");
            }
            self.broken = true;
            return None;
        }

        self.last_up = now;
        self.inner.generate(now, rng)
    }
}

fn spike_devices(org_id: &str, count: usize, debug: bool, rng: &mut StdRng) -> Vec<SpikeDevice> {
    let org_id: Arc<str> = Arc::from(org_id);
    (0..count)
        .map(|i| {
            let initial = rng.gen_range(-10..=110);
            let name = format!("device_{}_{}", lorem::word(rng), i);
            if debug {
                debug!(org = %org_id, device = i, %name, initial, "Created temperature device");
            }
            SpikeDevice::new(Arc::clone(&org_id), i as u32, name, initial, debug)
        })
        .collect()
}

pub fn build(org_id: &str, count: usize, debug: bool, rng: &mut StdRng) -> Vec<SpikeDevice> {
    spike_devices(org_id, count, debug, rng)
}

pub fn build_broken(
    org_id: &str,
    count: usize,
    debug: bool,
    now: i64,
    rng: &mut StdRng,
) -> Vec<BrokenDevice> {
    spike_devices(org_id, count, debug, rng)
        .into_iter()
        .map(|inner| BrokenDevice::new(inner, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn device(initial: i64) -> SpikeDevice {
        SpikeDevice::new(Arc::from("1"), 4, "device_lorem_4".to_string(), initial, false)
    }

    fn reading(event: &dyn Event) -> serde_json::Value {
        serde_json::from_slice(&event.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_readings_stay_near_mean() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut device = device(20);

        for step in 0..500 {
            let event = device.generate(step * 60, &mut rng).unwrap();
            let json = reading(event.as_ref());
            let temp = json["temp"].as_i64().unwrap();
            assert!((temp - 20).abs() <= 25, "temp {}", temp);
            assert_eq!(json["device_name"], "device_lorem_4");
        }
        assert!((device.mean() - 20.0).abs() < 3.0);
    }

    #[test]
    fn test_long_spike_moves_away_from_mean() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut device = device(50);
        device.last = 52;
        device.long_spike_steps = 3;

        device.next_reading(&mut rng);
        assert_eq!(device.last(), 53);
        device.next_reading(&mut rng);
        device.next_reading(&mut rng);
        assert_eq!(device.last(), 55);
        assert!(!device.in_long_spike());
    }

    #[test]
    fn test_broken_device_silent_for_six_minutes() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut device = BrokenDevice::new(device(10), 0);
        device.broken = true;

        assert!(device.generate(60, &mut rng).is_none());
        assert!(device.generate(BROKEN_SECS - 1, &mut rng).is_none());
        assert!(device.generate(BROKEN_SECS, &mut rng).is_some());
        assert!(!device.is_broken());
    }

    #[test]
    fn test_broken_devices_break_at_expected_rate() {
        let mut rng = StdRng::seed_from_u64(14);
        let mut devices = build_broken("2", 1000, false, 0, &mut rng);
        let silent = devices
            .iter_mut()
            .map(|d| d.generate(60, &mut rng))
            .filter(|r| r.is_none())
            .count();
        assert!(silent > 90 && silent < 190, "silent {}", silent);
    }

    #[test]
    fn test_initial_temperatures_in_range() {
        let mut rng = StdRng::seed_from_u64(15);
        let devices = build("3", 500, false, &mut rng);
        assert!(devices.iter().all(|d| (-10..=110).contains(&d.last())));
        assert!(devices.iter().all(|d| d.name.starts_with("device_")));
    }
}

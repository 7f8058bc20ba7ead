//! Workload models.
//!
//! A device is a small state machine that is asked once per cycle whether it
//! has something to say. Each [`CaseId`] maps to one device type:
//! - `heartbeat_message`: UP/DOWN heartbeats with late and long-down devices
//! - `structured_error_message`: bursts of large error payloads
//! - `temperature_reading`: readings around a running mean with spikes
//! - `broken_temperature_reading`: temperature devices that go silent
//! - `data_change`: customer contact records changing over time

pub mod contacts;
pub mod heartbeat;
pub mod lorem;
pub mod noisy_errors;
pub mod temperature;

use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use streamgen_core::{CaseId, Event};

pub use contacts::{Contact, ContactChange};
pub use heartbeat::{HeartbeatDevice, HeartbeatMessage, Status};
pub use noisy_errors::{ErrorKind, ErrorMessage, NoisyErrorDevice};
pub use temperature::{BrokenDevice, SpikeDevice, TemperatureMessage};

/// A simulated event source.
pub trait Device: Send + fmt::Debug {
    /// Advances the device to `now` (Unix seconds), maybe emitting an event.
    fn generate(&mut self, now: i64, rng: &mut StdRng) -> Option<Box<dyn Event>>;
}

/// Fields shared by all device messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceMessage {
    pub device_id: u32,
    pub time: i64,
}

/// Builds the device set for one organization.
pub fn build_devices(
    case: CaseId,
    org_id: &str,
    count: usize,
    debug: bool,
    now: i64,
    rng: &mut StdRng,
) -> Vec<Box<dyn Device>> {
    match case {
        CaseId::HeartbeatMessage => boxed(heartbeat::build(count, 1.0, debug, rng)),
        CaseId::StructuredErrorMessage => boxed(noisy_errors::build(org_id, count, debug, rng)),
        CaseId::TemperatureReading => boxed(temperature::build(org_id, count, debug, rng)),
        CaseId::BrokenTemperatureReading => {
            boxed(temperature::build_broken(org_id, count, debug, now, rng))
        }
        CaseId::DataChange => boxed(contacts::build(count, debug, now, rng)),
    }
}

fn boxed<D: Device + 'static>(devices: Vec<D>) -> Vec<Box<dyn Device>> {
    devices
        .into_iter()
        .map(|d| Box::new(d) as Box<dyn Device>)
        .collect()
}

pub(crate) fn to_json<T: Serialize>(message: &T) -> streamgen_core::Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Moves a timestamp 10 to 19 minutes into the past.
pub(crate) fn backdate(now: i64, rng: &mut StdRng) -> i64 {
    now - rng.gen_range(10..20) * 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_build_devices_per_case() {
        let mut rng = StdRng::seed_from_u64(1);
        for case in CaseId::all() {
            let devices = build_devices(*case, "1", 10, false, 1_000_000, &mut rng);
            let expected = match case {
                CaseId::DataChange => 277,
                _ => 10,
            };
            assert_eq!(devices.len(), expected, "case {}", case);
        }
    }

    #[test]
    fn test_backdate_range() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..1000 {
            let delta = 10_000 - backdate(10_000, &mut rng);
            assert!((600..1200).contains(&delta));
            assert_eq!(delta % 60, 0);
        }
    }
}

//! Devices emitting structured error messages.

use super::{lorem, to_json, Device, DeviceMessage};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use streamgen_core::Event;
use tracing::debug;

const NEW_ERROR_PROBABILITY: f64 = 0.1;
const LONG_ERROR_PROBABILITY: f64 = 0.03;
const LONG_ERROR_SECS: i64 = 7 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorKind {
    Continue,
    Success,
    Redirect,
    User,
    System,
}

impl ErrorKind {
    pub fn all() -> &'static [ErrorKind] {
        &[
            ErrorKind::Continue,
            ErrorKind::Success,
            ErrorKind::Redirect,
            ErrorKind::User,
            ErrorKind::System,
        ]
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    #[serde(flatten)]
    pub device: DeviceMessage,
    pub error_type: ErrorKind,
    pub error_message: String,
}

impl Event for ErrorMessage {
    fn partition_key(&self) -> String {
        self.device.device_id.to_string()
    }

    fn to_bytes(&self) -> streamgen_core::Result<Vec<u8>> {
        to_json(self)
    }
}

/// Device that stays quiet until its error state changes.
///
/// A device in a long error repeats it every cycle for 7 minutes.
#[derive(Debug)]
pub struct NoisyErrorDevice {
    org_id: Arc<str>,
    id: u32,
    last_error: ErrorKind,
    last_change: Option<i64>,
    long_error: bool,
    debug: bool,
}

impl NoisyErrorDevice {
    pub fn new(org_id: Arc<str>, id: u32, initial: ErrorKind, debug: bool) -> Self {
        Self {
            org_id,
            id,
            last_error: initial,
            last_change: None,
            long_error: false,
            debug,
        }
    }

    pub fn last_error(&self) -> ErrorKind {
        self.last_error
    }

    fn message(&self, now: i64, rng: &mut StdRng) -> Option<Box<dyn Event>> {
        Some(Box::new(ErrorMessage {
            device: DeviceMessage {
                device_id: self.id,
                time: now,
            },
            error_type: self.last_error,
            error_message: error_text(rng),
        }))
    }
}

impl Device for NoisyErrorDevice {
    fn generate(&mut self, now: i64, rng: &mut StdRng) -> Option<Box<dyn Event>> {
        let in_long_error = self.long_error
            && self
                .last_change
                .is_some_and(|changed| now - changed <= LONG_ERROR_SECS);
        if in_long_error {
            if self.debug {
                debug!(org = %self.org_id, device = self.id, error = ?self.last_error, "In long error");
            }
            return self.message(now, rng);
        }

        if rng.gen::<f64>() < NEW_ERROR_PROBABILITY {
            let candidates: Vec<ErrorKind> = ErrorKind::all()
                .iter()
                .copied()
                .filter(|kind| *kind != self.last_error)
                .collect();
            if let Some(next) = candidates.choose(rng) {
                self.last_error = *next;
            }
            self.last_change = Some(now);
            self.long_error = rng.gen::<f64>() < LONG_ERROR_PROBABILITY;
            if self.debug {
                debug!(
                    org = %self.org_id,
                    device = self.id,
                    error = ?self.last_error,
                    long = self.long_error,
                    "New error"
                );
            }
            return self.message(now, rng);
        }

        if self.debug {
            debug!(org = %self.org_id, device = self.id, "No change");
        }
        None
    }
}

/// 80% a 2 KiB message, 5% a 5 KiB message, otherwise a short run of words.
fn error_text(rng: &mut StdRng) -> String {
    let draw: f64 = rng.gen();
    if draw < 0.8 {
        lorem::short_text().to_string()
    } else if draw < 0.85 {
        lorem::text().to_string()
    } else {
        let words = lorem::words();
        let count = rng.gen_range(0..words.len() / 5);
        words[..count].join(" ")
    }
}

pub fn build(org_id: &str, count: usize, debug: bool, rng: &mut StdRng) -> Vec<NoisyErrorDevice> {
    let org_id: Arc<str> = Arc::from(org_id);
    (0..count)
        .map(|i| {
            let initial = ErrorKind::all()[rng.gen_range(0..ErrorKind::all().len())];
            NoisyErrorDevice::new(Arc::clone(&org_id), i as u32, initial, debug)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_long_error_repeats() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut device = NoisyErrorDevice::new(Arc::from("1"), 3, ErrorKind::User, false);
        device.long_error = true;
        device.last_change = Some(100);

        for now in [160, 300, 100 + LONG_ERROR_SECS] {
            let event = device.generate(now, &mut rng).unwrap();
            let json: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
            assert_eq!(json["error_type"], "USER");
            assert_eq!(json["device_id"], 3);
            assert_eq!(json["time"], now);
        }
    }

    #[test]
    fn test_new_error_differs_from_previous() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut device = NoisyErrorDevice::new(Arc::from("1"), 0, ErrorKind::System, false);
        let mut now = 0;

        loop {
            now += 60;
            let previous = device.last_error();
            if let Some(event) = device.generate(now, &mut rng) {
                if device.last_change == Some(now) {
                    assert_ne!(device.last_error(), previous);
                    assert!(!event.to_bytes().unwrap().is_empty());
                    break;
                }
            }
        }
    }

    #[test]
    fn test_emission_rate() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut devices = build("9", 1000, false, &mut rng);
        let emitted = devices
            .iter_mut()
            .filter_map(|d| d.generate(60, &mut rng))
            .count();
        assert!(emitted > 50 && emitted < 160, "emitted {}", emitted);
    }

    #[test]
    fn test_error_text_sizes() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut short = 0;
        for _ in 0..1000 {
            let text = error_text(&mut rng);
            assert!(text.len() <= lorem::TEXT_LEN);
            if text.len() == lorem::SHORT_TEXT_LEN {
                short += 1;
            }
        }
        assert!(short > 700, "short {}", short);
    }
}

//! Simulated organizations.

use crate::devices::{build_devices, Device};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use streamgen_core::{Event, OrgLabels};
use tracing::debug;

/// One organization and its devices.
///
/// Generation takes `&self` so overlapping cycles can share an `Arc<Org>`;
/// the device set and its random source are serialized behind one lock.
pub struct Org {
    labels: OrgLabels,
    device_count: usize,
    state: Mutex<OrgState>,
}

struct OrgState {
    devices: Vec<Box<dyn Device>>,
    rng: StdRng,
}

impl Org {
    /// Builds the org's devices. Large orgs take a while; call this from a
    /// blocking context.
    pub fn new(labels: OrgLabels, debug_events: bool, seed: u64, now: i64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let devices = build_devices(
            labels.case,
            &labels.org_id,
            labels.size.device_count(),
            debug_events,
            now,
            &mut rng,
        );
        debug!(org = %labels, devices = devices.len(), "Built organization");

        Self {
            labels,
            device_count: devices.len(),
            state: Mutex::new(OrgState { devices, rng }),
        }
    }

    pub fn labels(&self) -> &OrgLabels {
        &self.labels
    }

    pub fn device_count(&self) -> usize {
        self.device_count
    }

    /// Asks every device for an event at the current wall-clock time.
    pub fn generate_events(&self) -> Vec<Box<dyn Event>> {
        self.generate_events_at(chrono::Utc::now().timestamp())
    }

    /// Asks every device for an event at `now` (Unix seconds).
    pub fn generate_events_at(&self, now: i64) -> Vec<Box<dyn Event>> {
        let mut state = self.state.lock();
        let OrgState { devices, rng } = &mut *state;
        devices
            .iter_mut()
            .filter_map(|device| device.generate(now, rng))
            .collect()
    }
}

impl std::fmt::Debug for Org {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Org")
            .field("labels", &self.labels)
            .field("device_count", &self.device_count)
            .finish()
    }
}

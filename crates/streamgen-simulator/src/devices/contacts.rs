//! Customer contact records that change over time.

use super::{lorem, to_json, Device};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::Serialize;
use streamgen_core::Event;
use tracing::debug;

const CHANGE_PROBABILITY: f64 = 0.036;
const PRESENT_PROBABILITY: f64 = 0.77;
const MAX_BACKDATE_SECS: i64 = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct ContactChange {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub change_date: i64,
    pub customer_rating: f32,
}

impl Event for ContactChange {
    fn partition_key(&self) -> String {
        self.id.clone()
    }

    fn to_bytes(&self) -> streamgen_core::Result<Vec<u8>> {
        to_json(self)
    }
}

/// A contact whose rating drifts.
///
/// Most updates are current and move the contact's state forward. The rest
/// replay a change from before the last one without touching state.
#[derive(Debug)]
pub struct Contact {
    id: String,
    first_name: String,
    last_name: String,
    last_change: i64,
    rating: f64,
    debug: bool,
}

impl Contact {
    pub fn new(
        id: String,
        first_name: String,
        last_name: String,
        rating: f64,
        now: i64,
        debug: bool,
    ) -> Self {
        Self {
            id,
            first_name,
            last_name,
            last_change: now,
            rating,
            debug,
        }
    }

    pub fn rating(&self) -> f64 {
        self.rating
    }

    pub fn last_change(&self) -> i64 {
        self.last_change
    }
}

impl Device for Contact {
    fn generate(&mut self, now: i64, rng: &mut StdRng) -> Option<Box<dyn Event>> {
        if rng.gen::<f64>() >= CHANGE_PROBABILITY {
            if self.debug {
                debug!(contact = %self.id, "No update");
            }
            return None;
        }

        let delta: f64 = rng.sample(StandardNormal);
        let rating = self.rating + delta;

        let change_date = if rng.gen::<f64>() < PRESENT_PROBABILITY {
            self.last_change = now;
            self.rating = rating;
            if self.debug {
                debug!(contact = %self.id, rating, "Update from present");
            }
            now
        } else {
            let past = self.last_change - rng.gen_range(0..MAX_BACKDATE_SECS);
            if self.debug {
                debug!(contact = %self.id, change_date = past, "Update from past");
            }
            past
        };

        Some(Box::new(ContactChange {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            change_date,
            customer_rating: rating as f32,
        }))
    }
}

/// Builds enough contacts for `count` of them to change per cycle on average.
pub fn build(count: usize, debug: bool, now: i64, rng: &mut StdRng) -> Vec<Contact> {
    let total = (count as f64 / CHANGE_PROBABILITY) as usize;
    (0..total)
        .map(|i| {
            let first_name = lorem::name(rng);
            let last_name = lorem::name(rng);
            let rating = rng.gen_range(0..10) as f64;
            Contact::new(i.to_string(), first_name, last_name, rating, now, debug)
        })
        .collect()
}

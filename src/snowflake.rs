//! Monotonic sortable submission IDs.
//!
//! Layout of the 63 usable bits: 41 bits of milliseconds since a
//! configured epoch, 10 bits of machine id, 12 bits of per-millisecond
//! sequence. IDs minted by one generator are strictly increasing.

use std::sync::Mutex;
use std::time::SystemTime;

use crate::error::{Error, Result};

const MACHINE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_MACHINE_ID: u16 = (1 << MACHINE_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// How long `next_id` will spin waiting for the clock to advance once the
/// sequence space for the current millisecond is exhausted.
const FROZEN_CLOCK_SPINS: u32 = 2_000;

pub struct IdGenerator {
    machine_id: u16,
    epoch: SystemTime,
    state: Mutex<State>,
}

struct State {
    last_ms: u64,
    sequence: u64,
}

impl IdGenerator {
    pub fn new(machine_id: u16, epoch: SystemTime) -> Result<Self> {
        if machine_id > MAX_MACHINE_ID {
            return Err(Error::InvalidConfig(format!(
                "machine id {} does not fit in {} bits",
                machine_id, MACHINE_BITS
            )));
        }
        if epoch > SystemTime::now() {
            return Err(Error::InvalidConfig(
                "snowflake epoch lies in the future".into(),
            ));
        }
        Ok(Self {
            machine_id,
            epoch,
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        })
    }

    pub fn next_id(&self) -> Result<i64> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut now = self.millis_since_epoch()?;
        if now < state.last_ms {
            // Clock went backwards; refuse to mint non-monotonic ids.
            return Err(Error::SandboxInternal(format!(
                "system clock moved backwards by {} ms",
                state.last_ms - now
            )));
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence space for this millisecond is exhausted; wait
                // for the clock to tick over.
                let mut spins = 0;
                while now <= state.last_ms {
                    spins += 1;
                    if spins > FROZEN_CLOCK_SPINS {
                        return Err(Error::SandboxInternal(
                            "id sequence exhausted and clock is frozen".into(),
                        ));
                    }
                    std::thread::yield_now();
                    now = self.millis_since_epoch()?;
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        let id = (now << (MACHINE_BITS + SEQUENCE_BITS))
            | ((self.machine_id as u64) << SEQUENCE_BITS)
            | state.sequence;
        Ok((id & (i64::MAX as u64)) as i64)
    }

    fn millis_since_epoch(&self) -> Result<u64> {
        let elapsed = SystemTime::now()
            .duration_since(self.epoch)
            .map_err(|_| Error::SandboxInternal("system clock moved before the id epoch".into()))?;
        Ok(elapsed.as_millis() as u64)
    }
}

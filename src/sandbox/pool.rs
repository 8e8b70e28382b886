//! Fixed pool of sandbox box ids.
//!
//! isolate names its instances with small integers; the pool hands them
//! out and takes them back. Acquisition and release are serialized by the
//! mutex; a lease returns its id on drop, so a panicking or cancelled
//! case evaluation can never leak a slot.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct BoxPool {
    free: Arc<Mutex<Vec<u32>>>,
}

pub struct BoxLease {
    id: u32,
    free: Arc<Mutex<Vec<u32>>>,
}

impl BoxPool {
    pub fn new(size: usize) -> Self {
        // Reversed so the lowest ids are handed out first.
        let free: Vec<u32> = (0..size as u32).rev().collect();
        Self {
            free: Arc::new(Mutex::new(free)),
        }
    }

    pub fn acquire(&self) -> Result<BoxLease> {
        let mut free = self
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match free.pop() {
            Some(id) => Ok(BoxLease {
                id,
                free: Arc::clone(&self.free),
            }),
            None => Err(Error::SandboxInternal("sandbox box pool exhausted".into())),
        }
    }

    pub fn available(&self) -> usize {
        self.free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl BoxLease {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for BoxLease {
    fn drop(&mut self) {
        self.free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(self.id);
    }
}

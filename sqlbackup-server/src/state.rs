use sqlbackup_core::remote::Connector;
use sqlbackup_core::Config;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AppState {
    pub config: Config,
    pub connector: Arc<dyn Connector>,
    /// Name of the dump or rotation pass currently touching the backup root.
    active_operation: Arc<Mutex<Option<String>>>,
}

impl AppState {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            active_operation: Arc::new(Mutex::new(None)),
        }
    }

    pub fn active_operation(&self) -> Option<String> {
        lock_slot(&self.active_operation).clone()
    }

    /// Claim the slot for `operation`, or return the name of the operation
    /// holding it. The slot is released when the guard drops.
    pub fn try_begin(&self, operation: &str) -> Result<OperationGuard, String> {
        let mut active = lock_slot(&self.active_operation);
        if let Some(running) = active.as_deref() {
            return Err(running.to_string());
        }
        *active = Some(operation.to_string());
        Ok(OperationGuard {
            slot: self.active_operation.clone(),
        })
    }
}

pub struct OperationGuard {
    slot: Arc<Mutex<Option<String>>>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        *lock_slot(&self.slot) = None;
    }
}

// The slot holds plain data, so a poisoned lock is still usable.
fn lock_slot(slot: &Mutex<Option<String>>) -> MutexGuard<'_, Option<String>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

use crate::core::errors::{RegistryError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Registry configuration.
///
/// Passed by reference into each component at construction; there is no
/// ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    // Slot pool
    /// First assignable slot number.
    pub first_number: u16,
    /// Last assignable slot number, inclusive.
    pub last_number: u16,

    // Store access
    /// Retry policy applied to every store operation.
    pub retry: RetryPolicy,

    // Change notification
    /// Buffer capacity of the change-event channel.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            first_number: 1,
            last_number: 500,
            retry: RetryPolicy::default(),
            event_capacity: 64,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.first_number == 0 {
            return Err(RegistryError::configuration("first_number must be at least 1"));
        }
        if self.first_number > self.last_number {
            return Err(RegistryError::configuration(format!(
                "empty slot pool: first_number {} exceeds last_number {}",
                self.first_number, self.last_number
            )));
        }
        if self.event_capacity == 0 {
            return Err(RegistryError::configuration("event_capacity cannot be zero"));
        }
        Ok(())
    }

    /// Whether `number` falls inside the slot pool.
    pub fn contains(&self, number: u16) -> bool {
        (self.first_number..=self.last_number).contains(&number)
    }

    /// Total number of slots in the pool.
    pub fn pool_size(&self) -> usize {
        (self.last_number - self.first_number) as usize + 1
    }
}

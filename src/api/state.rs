//! API shared state containing actor handles

use crate::actors::store::StoreHandle;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Handle to the store actor owning devices, sensors and alert history
    pub store: StoreHandle,

    /// Sensor ids accepted in alert reports are `1..=channels`
    pub channels: u8,
}

impl ApiState {
    pub fn new(store: StoreHandle, channels: u8) -> Self {
        Self { store, channels }
    }
}

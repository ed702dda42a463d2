//! Device-side sensing: raw readings, calibration and the debounce state machine

pub mod debounce;
pub mod sensors;

pub mod capture;
pub(crate) mod core;
pub mod factory;
pub mod playback;
pub(crate) mod realtime;

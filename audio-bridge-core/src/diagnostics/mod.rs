pub mod backend_log;
pub mod capture;
pub mod error_state;
pub mod spin_lock;

pub mod capture;
pub mod quota;
pub mod sync_queue;
pub mod transaction;

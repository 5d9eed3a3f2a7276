pub mod error;
pub mod lock;
pub mod memo;

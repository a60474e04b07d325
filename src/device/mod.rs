pub mod btle;
pub mod codec;
pub mod constants;
pub mod dispatch;
pub mod host;
pub mod registry;
pub mod session;
pub mod types;

pub mod handler;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod rest;
pub mod session;
pub mod store_async;

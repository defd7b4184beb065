pub mod console_gateway;
pub mod fake_source;
pub mod http_source;
pub mod memory_store;
pub mod sqlite_store;
pub mod telegram_gateway;

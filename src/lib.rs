pub mod config;
pub mod enrich;
pub mod fetch;
pub mod process;
pub mod secure;

// Library exports for the server binary, the init-language CLI and integration tests
pub mod config;
pub mod contribute;
pub mod dashboard;
pub mod error;
pub mod fork;
pub mod github;
pub mod init;
pub mod markdown;
pub mod metadata;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod sanitize;
pub mod security;
pub mod server;
pub mod translation;

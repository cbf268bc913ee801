pub mod demo;
pub mod init_config;
pub mod pricing;
pub mod serve;

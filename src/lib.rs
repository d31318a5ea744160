pub mod cli;
pub mod database;
pub mod http_err;
pub mod periods;
pub mod server;
pub mod trends;

// Library root: the HTTP API, the realtime feed and their supporting modules,
// exposed so integration tests can build the app without the binary.

pub mod ard;
pub mod config;
pub mod function;
pub mod http;
pub mod protocol;
pub mod quiz;
pub mod ws_server;

//! The two cheap acquisition layers: a plain HTTP GET and the lightweight
//! rendering engine.

pub mod http_client;
pub mod light_engine;

pub mod carousel;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod http;
pub mod mpv;
pub mod orchestrator;
pub mod speaker;
pub mod status;
pub mod surface;
pub mod synchronizer;
pub mod workers;

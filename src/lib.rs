pub mod constants;
pub mod engine;
pub mod leaderboard;
pub mod publisher;
pub mod rng;
pub mod server_protocol;
pub mod session;
pub mod types;
pub mod words;

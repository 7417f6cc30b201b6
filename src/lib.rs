pub mod cli;
pub mod config;
pub mod db;
pub mod embedder;
pub mod error;
pub mod hash;
pub mod ingest;
pub mod output;
pub mod preprocess;
pub mod searcher;
pub mod session;
pub mod shutdown;
pub mod utils;

pub use config::{Config, Opts};
pub use session::SearchSession;

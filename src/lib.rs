pub mod cli;
pub mod config;
pub mod engine;
pub mod metadata;
pub mod pipeline;
pub mod postprocess;
pub mod preview;
pub mod report;
pub mod results;
pub mod util;
pub mod workspace;

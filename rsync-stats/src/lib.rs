pub mod anonymize;
pub mod config;
pub mod correlate;
pub mod enrich;
pub mod metrics_consts;
pub mod parse;
pub mod pipeline;
pub mod source;
pub mod types;
pub mod writer;

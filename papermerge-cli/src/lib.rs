pub mod cli;
pub mod config;
pub mod download;
pub mod import;
pub mod lister;
pub mod output;
pub mod remote;
pub mod retry;
pub mod tags;

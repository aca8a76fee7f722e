pub mod config;
pub mod db;
pub mod http;
pub mod id;
pub mod import;
pub mod jobs;
pub mod pieces;
pub mod schema;

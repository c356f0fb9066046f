pub mod api;
pub mod catalog;
pub mod data_collector;
pub mod explorer;
pub mod export;
pub mod merge;
pub mod models;
pub mod utils;

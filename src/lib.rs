//! Append-only partitioned property graph fragments.

pub mod appender;
pub mod comm;
pub mod error;
pub mod fragment;
pub mod id_parser;
pub mod memory_manager;
pub mod partitioner;
pub mod store;
pub mod table;
pub mod types;
pub mod vertex_map;
pub mod worker;

pub(crate) mod tools;

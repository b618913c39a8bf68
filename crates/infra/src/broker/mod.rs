//! Transactional topic broker carrying staged-batch references

pub mod sqlite_broker;

pub use sqlite_broker::{SqliteBroker, SqliteBrokerTransaction, SqliteTopicConsumer};

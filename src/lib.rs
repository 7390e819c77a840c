pub mod actor;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod model;
pub mod ops;
pub mod output;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod trigger;
pub mod validate;
pub mod watch;

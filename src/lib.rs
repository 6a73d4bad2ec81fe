pub mod app;
pub mod availability;
pub mod batch;
pub mod comtrade;
pub mod config;
pub mod domain;
pub mod error;
pub mod failure_log;
pub mod fetch;
pub mod matrix;
pub mod output;
pub mod reconcile;
pub mod reference;
pub mod writer;

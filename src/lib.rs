pub mod admin;
pub mod booking;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod feed;
pub mod limits;
pub mod members;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;

pub mod aws;
pub mod cloud;
pub mod config;
pub mod datastore;
pub mod manager;
pub mod resource;
pub mod storage;
pub mod tracker;
pub mod waiter;

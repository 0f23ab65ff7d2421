pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod friends;
pub mod list;
pub mod messages;
pub mod model;
pub mod recommend;
pub mod users;

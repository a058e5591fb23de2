pub mod auth;
pub mod catalog;
pub mod inventory;
pub mod items;
pub mod notifications;
pub mod requests;
pub mod stocks;

pub mod api;
pub mod downloads;
pub mod files;
pub mod web;

pub mod archive;
pub mod coercion;
pub mod config;
pub mod database;
pub mod errors;
pub mod field_transforms;
pub mod registry;
pub mod services;
pub mod storage;

pub mod app_context;
pub use app_context::AppContext;

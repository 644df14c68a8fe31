pub mod categories;
pub mod currencies;
pub mod fields;
pub mod files;
pub mod progress;
pub mod projects;
pub mod settings;
pub mod transactions;
pub mod users;

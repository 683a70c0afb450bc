pub mod calculations;
pub mod models;
pub mod products;
pub mod services;
pub mod views;

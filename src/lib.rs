pub mod common;
pub mod config;
pub mod routes;

pub mod expenses;
pub mod fields;
pub mod harvests;
pub mod machines;
pub mod product_types;
pub mod products;
pub mod treatments;

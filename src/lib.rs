pub mod app;
pub mod authz;
pub mod config;
pub mod docs;
pub mod errors;
pub mod model;
pub mod path;
pub mod routes;

// Re-export commonly used items for tests
pub use app::create_app;

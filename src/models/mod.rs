pub mod connections;
pub mod metadata;
pub mod schema;

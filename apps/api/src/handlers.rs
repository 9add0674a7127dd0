pub mod health;
pub mod limit_cache;
pub mod limits;
pub mod passthrough;
pub mod subjects;

pub mod fact;
pub mod hashing;
pub mod model;

pub mod calc;
pub mod core;
pub mod courses;
pub mod scenario;
pub mod session;
pub mod shadow;

pub mod middleware;
pub mod pin;
pub mod session;

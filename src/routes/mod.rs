//! Routing segregation: public endpoints (no middleware), authenticated
//! endpoints (session guard + anti-forgery check), and admin endpoints
//! (same guards; role checks happen inside the handlers).

pub mod admin;
pub mod authenticated;
pub mod public;

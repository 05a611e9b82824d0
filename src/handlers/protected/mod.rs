// handlers/protected/mod.rs - Protected handlers (JWT + active profile required)
//
// Security Level: any authenticated, active profile
// Route Prefix: /api/*
// Middleware: jwt_auth_middleware → validate_user_middleware
//
// Ownership and per-role visibility are decided by the services, not here.
pub mod notifications;
pub mod profile;
pub mod properties;
pub mod property_requests;
pub mod saved_properties;
pub mod scheduled_viewings;


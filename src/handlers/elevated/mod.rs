// handlers/elevated/mod.rs - Elevated handlers
//
// Security Level: JWT + active profile + role tier
// Route Prefix: /api/sales-ops/* (sales_ops or admin), /api/admin/* (admin)
// Middleware: protected stack, then require_staff / require_admin
pub mod admin;
pub mod sales_ops;

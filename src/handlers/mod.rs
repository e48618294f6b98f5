// handlers/mod.rs - HTTP handlers
//
// system - service description and health (public)
// auth   - token issuance (public)
// model  - generic entity CRUD; access is decided per record by the gateway

pub mod auth;
pub mod model;
pub mod system;

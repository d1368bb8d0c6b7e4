//! CampusGate — an MCP gateway for SJTU campus services.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod state;

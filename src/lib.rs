pub mod config;
pub mod db;
pub mod drivers;
pub mod ipam;
pub mod monitoring;
pub mod notifications;
pub mod orchestrator;
pub mod radius;
pub mod router;
pub mod routeros;

#[cfg(test)]
mod testing;

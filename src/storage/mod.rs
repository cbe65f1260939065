// Storage - Couche de persistance (RocksDB + store en mémoire)
// Principe: append-only, commit atomique, historique par objet

pub mod db;
pub mod memory;
pub mod state;

pub use db::*;
pub use memory::*;
pub use state::*;

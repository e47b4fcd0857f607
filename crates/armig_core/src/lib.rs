pub mod cluster;
pub mod db;
pub mod domain;
pub mod error;
pub mod export;
pub mod purge;
pub mod rename;
pub mod repo;
pub mod resync;

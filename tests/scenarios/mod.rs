//! Scenario tests for the configuration engine
//!
//! # Test Organization
//!
//! - `hotplug.rs` - Plugging and unplugging outputs, stored layouts per output set
//! - `persistence.rs` - Saving to and loading from monitors.xml
//! - `tiled.rs` - Multi-connector tiled monitors

mod hotplug;
mod persistence;
mod tiled;

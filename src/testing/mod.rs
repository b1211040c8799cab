//! Testing infrastructure
//!
//! This module provides test fixtures for exercising the configuration engine
//! without a display server.
//!
//! # Architecture
//!
//! 1. **HeadlessBackend**: In-memory virtual outputs, CRTCs and modes. It
//!    enumerates them into a fresh `Hardware` arena and reflects applied
//!    assignments back into the virtual outputs.
//!
//! 2. **Fixture**: The test harness. It describes virtual hardware with
//!    chained builder calls and produces either a `Hardware` value or a
//!    `MonitorManager` over the headless backend.
//!
//! # Example
//!
//! ```ignore
//! use gf_display::testing::Fixture;
//!
//! #[test]
//! fn test_laptop_and_external() {
//!     let mut fixture = Fixture::new();
//!     fixture.output("eDP-1").preferred_mode(1920, 1080, 60.0);
//!     fixture.output("DP-1").preferred_mode(2560, 1440, 60.0);
//!
//!     let mut manager = fixture.manager();
//!     manager.on_hotplug().unwrap();
//!     assert_eq!(manager.logical_monitors().len(), 2);
//! }
//! ```

mod fixture;

pub use fixture::Fixture;

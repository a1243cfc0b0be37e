//! # Event Bus Module
//!
//! Publish/subscribe of device events for one connection.
//!
//! ## Overview
//!
//! - The poller publishes the events of each cycle in emission order
//! - Sessions subscribe with a filter and a synchronous handler
//! - Async consumers take a broadcast receiver instead
//!
//! ## Usage
//!
//! ```rust
//! use possim_core::event_bus::{DeviceEvent, EventBus, EventCategory, EventFilter};
//!
//! let bus = EventBus::new();
//! let subscription = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Drawer]),
//!     |event| {
//!         if let DeviceEvent::Drawer { open } = event {
//!             println!("drawer open: {}", open);
//!         }
//!     },
//! );
//!
//! bus.publish(DeviceEvent::Drawer { open: true });
//! bus.unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;

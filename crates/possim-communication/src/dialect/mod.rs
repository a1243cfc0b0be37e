//! Device dialects
//!
//! - [`printer`]: status-byte polling of a receipt printer with cash drawer
//! - [`subsystem`]: pushed ETX frames from bump bars and order displays
//! - [`udp`]: batched `NAME:Function` requests to drawer, belt and cash box

pub mod printer;
pub mod subsystem;
pub mod udp;

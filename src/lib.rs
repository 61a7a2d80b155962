//! Proxima library: portable presence detection engine.
//!
//! Turns raw 802.11 frames captured in promiscuous mode into a live table of
//! nearby devices, each annotated with signal strength, traffic totals and a
//! proximity classification: which devices are near, how near, and whether
//! they are arriving, departing or idle.
//!
//! This crate contains all parsing, tracking, filtering and protocol logic
//! with no platform dependencies, testable on any host with `cargo test`.
//! Firmware binaries (Embassy `no_std` and ESP-IDF `std`) are thin consumers
//! that provide radio access and output sinks.
//!
//! Data flow: driver callback → [`sniffer::PacketSniffer`] (parse, queue) →
//! [`engine::Proxima::poll`] (device table, ARP table, filter chain, state
//! machine) → user [`device::DeviceHandler`]s. `no_std`, no allocator.

#![cfg_attr(not(test), no_std)]

pub mod arp;
pub mod board;
pub mod comm;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod filter;
pub mod mac;
pub mod packet;
pub mod protocol;
pub mod sniffer;
pub mod wifi;

pub use device::{Device, DeviceEvent, DeviceHandler, ProximityState};
pub use engine::Proxima;
pub use error::Error;
pub use filter::{Direction, Filter, FilterTarget};
pub use mac::{MacAddr, Oui};
pub use packet::{Packet, PacketCategory};
pub use sniffer::PacketSniffer;

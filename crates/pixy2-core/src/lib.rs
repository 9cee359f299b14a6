//! # Pixy2 Core Library
//!
//! Host-side driver for the Pixy2 camera.

#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The Pixy2 packet protocol (sync detection, checksummed and plain framing)
//! - A session engine over any byte [`Link`](protocol::Link) (UART included)
//! - Color connected components (blocks)
//! - Line tracking (vectors, intersections, barcodes)
//! - Video RGB sampling
//! - A simulated sensor for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use pixy2_core::prelude::*;
//!
//! let mut pixy = Pixy2::new(UartLink::new(SerialConfig::with_port("/dev/ttyACM0")));
//! pixy.init()?;
//! println!("{}", pixy.version_info()?);
//!
//! for block in pixy.get_blocks(true, SIG_ALL, 255)? {
//!     println!("{}", block);
//! }
//! ```

pub mod ccc;
pub mod demo;
pub mod line;
pub mod protocol;
pub mod version;
pub mod video;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ccc::{Block, SIG_ALL};
    pub use crate::demo::{DemoConfig, SimulatedPixy};
    pub use crate::line::{Barcode, FeatureSelector, FeatureSet, Intersection, LineFeatures, Vector};
    pub use crate::protocol::{
        ConnectionState, Link, Pixy2, ProtocolError, SerialConfig, SessionConfig, UartLink,
    };
    pub use crate::version::{Resolution, Version};
    pub use crate::video::Rgb;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

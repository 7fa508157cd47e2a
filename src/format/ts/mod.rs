//! # MPEG transport stream demuxing
//!
//! - [`TSPacketParser`]: packet headers, adaptation fields, PSI sections
//!   (PAT/PMT with CRC checks) and PES headers
//! - [`TsDemuxer`]: program discovery and PES reassembly behind the
//!   [`Demuxer`](crate::format::Demuxer) trait
//!
//! Both 188-byte packets and 192-byte M2TS packets are accepted.
//!
//! ```rust
//! use avpipe::format::ts::{TSPacketParser, PID_PAT};
//!
//! let parser = TSPacketParser::new();
//! let header = parser.parse_header(&[0x47, 0x40, 0x00, 0x10]).unwrap();
//! assert_eq!(header.pid, PID_PAT);
//! assert!(header.payload_unit_start);
//! ```

mod demuxer;
mod parser;
mod types;


pub use demuxer::{TsDemuxer, TsFactory};
pub use parser::TSPacketParser;
pub use types::*;

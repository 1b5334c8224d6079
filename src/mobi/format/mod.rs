//! File format parsing layer: PalmDB framing and the record-0 headers.
//!
//! Everything here parses plain structs out of byte slices with
//! explicit big-endian reads; the underlying buffers are never
//! mutated.

pub mod exth;
pub mod header;
pub mod pdb;
pub mod trailer;

//! Conversion runtime: turns source records into target resources.
//!
//! A [`MetaMapper`] owns a compiled mapping and converts records one at a time.
//! [`ConversionContext`] is the per-record state templates are rendered against.

pub mod context;
pub mod meta_mapper;

pub use context::ConversionContext;
pub use meta_mapper::MetaMapper;

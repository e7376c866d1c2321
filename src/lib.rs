//! doccam library crate.
//!
//! A camera capture session driven through delegate callbacks, plus a manual
//! rotation editor for the captured stills.

pub mod camera;
pub mod config;
pub mod editor;

//! Core engine: the fetch → decide → actuate loop and the surface the
//! web layer calls into.

pub mod cycle;
pub mod decision;
pub mod service;

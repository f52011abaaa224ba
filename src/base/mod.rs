//! Base types and error handling.
//!
//! Foundational types shared by every policy area:
//! - [`PolicyError`]: enforcement-edge errors (vetoes, aborts)
//! - [`RequestStatus`]: completion codes from the network layer
//!
//! [`PolicyError`]: error::PolicyError
//! [`RequestStatus`]: status::RequestStatus

pub mod error;
pub mod status;

#[cfg(test)]
mod tests;

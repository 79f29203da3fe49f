//! Pure domain logic: tickets, coordinate spaces, the virtual desktop layout,
//! and validation of peer-declared data.  Nothing in here touches a socket or
//! the operating system.

pub mod geometry;
pub mod layout;
pub mod ticket;
pub mod validation;

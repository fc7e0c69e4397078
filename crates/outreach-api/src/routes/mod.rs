//! Route modules organized by bounded context.

pub mod campaigns;
pub mod channels;
pub mod contact_lists;
pub mod health;

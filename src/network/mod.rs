pub mod poll;
pub mod socket;

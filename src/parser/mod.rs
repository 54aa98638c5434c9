pub mod unverified;

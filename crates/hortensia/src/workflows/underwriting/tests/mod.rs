mod common;
mod offers;
mod policy;

pub mod admin;
pub mod redirect;

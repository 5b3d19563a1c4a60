pub mod check_in;
pub mod photo;
pub mod plant;
pub mod user;

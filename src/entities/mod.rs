pub mod category;
pub mod comment;
pub mod like;
pub mod location;
pub mod post;
pub mod user;

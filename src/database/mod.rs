pub mod categories;
pub mod comments;
pub mod conn;
pub mod likes;
pub mod locations;
pub mod posts;
pub mod schema;
pub mod sessions;
pub mod users;

pub mod cookies;
pub mod macros;
pub mod pagination;
pub mod perms;
pub mod response;
pub mod security;
pub mod snowflake;
pub mod state;
pub mod storage;
pub mod validate;

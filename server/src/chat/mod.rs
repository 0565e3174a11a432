pub mod conversations;
pub mod messages;
pub mod presence;
pub mod store;
pub mod users;

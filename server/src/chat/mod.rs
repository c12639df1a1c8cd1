pub mod broadcast;
pub mod conversation;
pub mod history;
pub mod pipeline;
pub mod presence;
pub mod room;

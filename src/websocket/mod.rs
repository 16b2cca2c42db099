pub mod handler;
pub mod msg_edit_handler;
pub mod msg_exec_handler;
pub mod msg_join_handler;
pub mod msg_ping_handler;

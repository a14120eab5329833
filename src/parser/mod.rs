pub mod loop_packet;
pub mod template;
pub mod tessw;

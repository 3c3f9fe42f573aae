mod socket_listener;
mod tcp_listener;

pub use socket_listener::*;
pub use tcp_listener::*;

pub type ISocketListener = Box<dyn SocketListener>;

mod exposed_port;
mod session;

pub use exposed_port::*;
pub use session::*;

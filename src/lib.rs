pub mod severity;
pub mod record;
pub mod encoder;
pub mod sink;
pub mod writer_sink;
pub mod memory_sink;
pub mod backend;
pub mod layer;

pub mod init;
pub mod env;
pub mod emitter;
pub mod shutdown;

pub mod charset;
pub mod compiler;
pub mod opcode;
pub mod program;

pub mod capture;
pub mod check;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod object;
pub mod primitives;
pub mod runtime;
pub mod special;

use std::io::Write;

use bytecode::Image;

pub use capture::{run_and_capture, Captured, SharedBuffer};
pub use config::VmConfig;
pub use error::{RuntimeError, VmResult};
pub use object::{Method, ObjId};
pub use runtime::Runtime;

/// Execute `image` on a fresh runtime, writing program output to `out` and
/// `err`.
pub fn run(image: &Image, out: impl Write, err: impl Write) -> VmResult<()> {
    run_with_config(image, out, err, &VmConfig::default())
}

pub fn run_with_config(
    image: &Image,
    out: impl Write,
    err: impl Write,
    config: &VmConfig,
) -> VmResult<()> {
    let mut rt = Runtime::with_config(out, err, config.clone());
    rt.execute(image)?;
    rt.flush()
}

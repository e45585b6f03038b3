pub mod args;
pub mod compress;

pub use compress::compress;

const PROGRESS_CHARS: &str = "##-";

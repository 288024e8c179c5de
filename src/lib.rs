pub mod cache;
pub mod config;
pub mod dfs;
pub mod encoding;
pub mod error;
pub mod flock;
pub mod session;
pub mod sheet;

pub use config::SheetDbConfig;
pub use error::{Error, Result};
pub use session::{Authenticator, SheetSession, User};
pub use sheet::{MemSheet, SharedSheet, SheetStore};

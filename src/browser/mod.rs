mod discovery;
mod interaction;
mod launcher;
mod session;

pub use discovery::{locate_browser, BrowserInfo, BrowserKind};
pub use interaction::{ActionKind, InteractionConfig, PlannedStep};
pub use launcher::BrowserLauncher;
pub use session::{SessionOptions, SessionRunner, SessionState};

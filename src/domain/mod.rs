mod account;
mod integrity;
mod journal;
mod ledger;
mod lesson;
mod money;
mod package;
mod status;

pub use account::*;
pub use integrity::*;
pub use journal::*;
pub use ledger::*;
pub use lesson::*;
pub use money::*;
pub use package::*;
pub use status::*;

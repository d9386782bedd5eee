pub mod sync;

pub use sync::run as sync_run;
